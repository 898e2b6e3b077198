// ── SQLite persistence ──
//
// Printer registrations, last-known printer state and user preferences.
// Every call takes the connection lock for its whole duration; callers on
// the async runtime go through `spawn_blocking`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::debug;

use crate::error::CoreError;
use crate::model::{FilamentInfo, PrintJob, Printer, PrinterConfig, PrinterStatus};

/// Schema steps, applied in order. `PRAGMA user_version` records how many
/// have run.
const MIGRATIONS: &[&str] = &[r"
    CREATE TABLE printers (
        id          TEXT PRIMARY KEY NOT NULL,
        name        TEXT NOT NULL,
        model       TEXT NOT NULL,
        ip          TEXT NOT NULL,
        access_code TEXT NOT NULL,
        serial      TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE TABLE printer_states (
        printer_id     TEXT PRIMARY KEY NOT NULL
                       REFERENCES printers(id) ON DELETE CASCADE,
        status         TEXT NOT NULL,
        nozzle_temp    REAL NOT NULL DEFAULT 0,
        bed_temp       REAL NOT NULL DEFAULT 0,
        chamber_temp   REAL NOT NULL DEFAULT 0,
        print_progress REAL,
        print_filename TEXT,
        layer_current  INTEGER,
        layer_total    INTEGER,
        time_remaining INTEGER,
        filament_type  TEXT,
        filament_color TEXT,
        error_message  TEXT,
        error_code     INTEGER,
        last_seen      TEXT NOT NULL,
        updated_at     TEXT NOT NULL
    );

    CREATE TABLE user_preferences (
        id         TEXT PRIMARY KEY NOT NULL,
        key        TEXT NOT NULL UNIQUE,
        value      TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
"];

// ── Row types ────────────────────────────────────────────────────────

/// Last-known state row for one printer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredState {
    pub printer_id: String,
    pub status: String,
    pub nozzle_temp: f64,
    pub bed_temp: f64,
    pub chamber_temp: f64,
    pub print_progress: Option<f64>,
    pub print_filename: Option<String>,
    pub layer_current: Option<i32>,
    pub layer_total: Option<i32>,
    pub time_remaining: Option<i64>,
    pub filament_type: Option<String>,
    pub filament_color: Option<String>,
    pub error_message: Option<String>,
    pub error_code: Option<i32>,
    pub last_seen: String,
    pub updated_at: String,
}

impl StoredState {
    fn from_printer(printer: &Printer, now: &str) -> Self {
        let job = printer.print.as_ref();
        let filament = printer.filament.as_ref();
        let fault = printer.error.as_ref();

        Self {
            printer_id: printer.id.clone(),
            status: printer.status.to_string(),
            nozzle_temp: f64::from(printer.temperatures.nozzle),
            bed_temp: f64::from(printer.temperatures.bed),
            chamber_temp: f64::from(printer.temperatures.chamber),
            print_progress: job.map(|j| j.progress),
            print_filename: job.map(|j| j.file_name.clone()),
            layer_current: job.map(|j| j.layer_current),
            layer_total: job.map(|j| j.layer_total),
            time_remaining: job.map(|j| j.time_remaining),
            filament_type: filament.map(|f| f.kind.clone()),
            filament_color: filament.map(|f| f.color.clone()),
            error_message: fault.map(|f| f.message.clone()),
            error_code: fault.map(|f| f.error_code),
            last_seen: printer.last_update.to_rfc3339(),
            updated_at: now.to_owned(),
        }
    }

    /// The status that was last persisted, if it is still a known value.
    pub fn stored_status(&self) -> Option<PrinterStatus> {
        self.status.parse().ok()
    }

    /// Restore last-known telemetry into a record built from config.
    ///
    /// The record comes back Offline with no fault: a stored fault says
    /// nothing about the printer now, and the link decides the real
    /// status once it reports.
    #[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
    pub fn apply_to(&self, printer: &mut Printer) {
        printer.status = PrinterStatus::Offline;
        printer.online = false;
        printer.error = None;

        printer.temperatures.nozzle = self.nozzle_temp.round() as i32;
        printer.temperatures.bed = self.bed_temp.round() as i32;
        printer.temperatures.chamber = self.chamber_temp.round() as i32;

        printer.print = self.print_filename.as_ref().map(|file_name| PrintJob {
            progress: self.print_progress.unwrap_or(0.0).clamp(0.0, 100.0),
            time_remaining: self.time_remaining.unwrap_or(0),
            estimated_total_time: None,
            file_name: file_name.clone(),
            print_type: None,
            layer_current: self.layer_current.unwrap_or(0),
            layer_total: self.layer_total.unwrap_or(0),
            speed_level: None,
            fan_speed: None,
            stage: None,
            lifecycle: None,
        });

        printer.filament = self.filament_type.as_ref().map(|kind| FilamentInfo {
            kind: kind.clone(),
            color: self
                .filament_color
                .clone()
                .unwrap_or_else(|| "#000000".to_owned()),
            remaining: 0.0,
        });

        if let Ok(seen) = DateTime::parse_from_rfc3339(&self.last_seen) {
            printer.last_update = seen.with_timezone(&Utc);
        }
    }
}

/// One row of the preferences table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preference {
    pub id: String,
    pub key: String,
    pub value: String,
    pub created_at: String,
    pub updated_at: String,
}

// ── Database ─────────────────────────────────────────────────────────

/// Handle to the printpulse SQLite database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Open or create the database at `path` and bring the schema up to date.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CoreError::Database {
                message: format!("cannot create {}: {e}", parent.display()),
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        debug!(path = %path.display(), "opened database");
        Self::init(conn)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, CoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, CoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::Internal("database lock poisoned".into()))
    }

    /// Number of migrations applied.
    pub fn schema_version(&self) -> Result<usize, CoreError> {
        let conn = self.lock()?;
        user_version(&conn)
    }

    // ── Printers ─────────────────────────────────────────────────────

    /// Insert or update a registration. `created_at` survives updates.
    pub fn upsert_printer(&self, config: &PrinterConfig) -> Result<(), CoreError> {
        let now = timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO printers (id, name, model, ip, access_code, serial, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                model = excluded.model,
                ip = excluded.ip,
                access_code = excluded.access_code,
                serial = excluded.serial,
                updated_at = excluded.updated_at",
            params![
                config.id,
                config.name,
                config.model,
                config.ip,
                config.access_code.expose_secret(),
                config.serial,
                now,
            ],
        )?;
        Ok(())
    }

    /// Delete a registration and, through the cascade, its state row.
    /// Returns whether a row existed.
    pub fn delete_printer(&self, id: &str) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM printers WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// All registrations, oldest first.
    pub fn list_printers(&self) -> Result<Vec<PrinterConfig>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, model, ip, access_code, serial
             FROM printers ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PrinterConfig {
                id: row.get(0)?,
                name: row.get(1)?,
                model: row.get(2)?,
                ip: row.get(3)?,
                access_code: SecretString::from(row.get::<_, String>(4)?),
                serial: row.get(5)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Printer state ────────────────────────────────────────────────

    /// Persist the record's last-known state. The printer must be registered.
    pub fn save_state(&self, printer: &Printer) -> Result<(), CoreError> {
        let state = StoredState::from_printer(printer, &timestamp());
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO printer_states (
                printer_id, status, nozzle_temp, bed_temp, chamber_temp,
                print_progress, print_filename, layer_current, layer_total, time_remaining,
                filament_type, filament_color, error_message, error_code, last_seen, updated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                state.printer_id,
                state.status,
                state.nozzle_temp,
                state.bed_temp,
                state.chamber_temp,
                state.print_progress,
                state.print_filename,
                state.layer_current,
                state.layer_total,
                state.time_remaining,
                state.filament_type,
                state.filament_color,
                state.error_message,
                state.error_code,
                state.last_seen,
                state.updated_at,
            ],
        )?;
        Ok(())
    }

    pub fn load_states(&self) -> Result<Vec<StoredState>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT printer_id, status, nozzle_temp, bed_temp, chamber_temp,
                    print_progress, print_filename, layer_current, layer_total, time_remaining,
                    filament_type, filament_color, error_message, error_code, last_seen, updated_at
             FROM printer_states ORDER BY printer_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredState {
                printer_id: row.get(0)?,
                status: row.get(1)?,
                nozzle_temp: row.get(2)?,
                bed_temp: row.get(3)?,
                chamber_temp: row.get(4)?,
                print_progress: row.get(5)?,
                print_filename: row.get(6)?,
                layer_current: row.get(7)?,
                layer_total: row.get(8)?,
                time_remaining: row.get(9)?,
                filament_type: row.get(10)?,
                filament_color: row.get(11)?,
                error_message: row.get(12)?,
                error_code: row.get(13)?,
                last_seen: row.get(14)?,
                updated_at: row.get(15)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Preferences ──────────────────────────────────────────────────

    pub fn get_preference(&self, key: &str) -> Result<Option<String>, CoreError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT value FROM user_preferences WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn set_preference(&self, key: &str, value: &str) -> Result<(), CoreError> {
        if key.trim().is_empty() {
            return Err(CoreError::ValidationFailed {
                message: "preference key must not be empty".into(),
            });
        }

        let now = timestamp();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO user_preferences (id, key, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![format!("pref_{key}"), key, value, now],
        )?;
        Ok(())
    }

    /// Returns whether the key existed.
    pub fn delete_preference(&self, key: &str) -> Result<bool, CoreError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM user_preferences WHERE key = ?1", params![key])?;
        Ok(deleted > 0)
    }

    pub fn list_preferences(&self) -> Result<Vec<Preference>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, key, value, created_at, updated_at FROM user_preferences ORDER BY key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Preference {
                id: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn timestamp() -> String {
    Utc::now().to_rfc3339()
}

fn user_version(conn: &Connection) -> Result<usize, CoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    usize::try_from(version).map_err(|_| CoreError::Database {
        message: format!("invalid schema version {version}"),
    })
}

fn migrate(conn: &Connection) -> Result<(), CoreError> {
    let current = user_version(conn)?;
    if current > MIGRATIONS.len() {
        return Err(CoreError::Database {
            message: format!(
                "database schema version {current} is newer than this build supports ({})",
                MIGRATIONS.len()
            ),
        });
    }

    for (index, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let version = index + 1;
        conn.execute_batch(&format!("BEGIN; {sql} PRAGMA user_version = {version}; COMMIT;"))?;
        debug!(version, "applied database migration");
    }
    Ok(())
}
