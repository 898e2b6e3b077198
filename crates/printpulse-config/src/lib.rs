//! Shared configuration for printpulse.
//!
//! TOML config file, `PRINTPULSE_` environment overrides, access-code
//! resolution (env + keyring + plaintext), and translation to
//! `printpulse_core::MonitorConfig`. The CLI adds flag-aware wrappers on
//! top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use printpulse_core::{Backend, MonitorConfig, PrinterConfig, ReconnectConfig, TlsMode};

/// Keyring service name; entries are keyed `<printer id>/access-code`.
pub const KEYRING_SERVICE: &str = "printpulse";

/// Environment variable that overrides the config file location.
pub const CONFIG_PATH_ENV: &str = "PRINTPULSE_CONFIG";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no access code configured for printer '{printer}'")]
    NoCredentials { printer: String },

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl From<keyring::Error> for ConfigError {
    fn from(err: keyring::Error) -> Self {
        Self::Keyring(err.to_string())
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// CLI presentation defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// How the monitor connects and where it stores state.
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Printers registered from the config file, keyed by id.
    #[serde(default)]
    pub printers: BTreeMap<String, PrinterEntry>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    /// Seconds one-shot commands wait for printers to report.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            timeout: default_timeout(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    15
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MonitorSettings {
    /// "live" talks to printers, "demo" runs the simulator.
    #[serde(default = "default_mode")]
    pub mode: String,

    /// SQLite database path. Defaults to the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,

    /// Accept any printer certificate.
    #[serde(default = "default_insecure")]
    pub insecure: bool,

    /// PEM bundle to verify printer certificates against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    #[serde(default = "default_reconnect_initial")]
    pub reconnect_initial_secs: u64,

    #[serde(default = "default_reconnect_max")]
    pub reconnect_max_secs: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            database: None,
            insecure: default_insecure(),
            ca_cert: None,
            keep_alive_secs: default_keep_alive(),
            reconnect_initial_secs: default_reconnect_initial(),
            reconnect_max_secs: default_reconnect_max(),
        }
    }
}

fn default_mode() -> String {
    "live".into()
}
fn default_insecure() -> bool {
    true
}
fn default_keep_alive() -> u64 {
    60
}
fn default_reconnect_initial() -> u64 {
    1
}
fn default_reconnect_max() -> u64 {
    30
}

/// A printer declared in the config file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PrinterEntry {
    /// Display name. Defaults to the id.
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub model: String,

    pub ip: String,

    pub serial: String,

    /// Access code (plaintext; prefer the keyring or an env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_code: Option<String>,

    /// Environment variable name containing the access code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_code_env: Option<String>,
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "printpulse", "printpulse")
}

/// Resolve the config file path: `PRINTPULSE_CONFIG`, then XDG / platform
/// conventions.
pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
        return PathBuf::from(path);
    }
    project_dirs().map_or_else(
        || home_fallback(".config").join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default SQLite database location.
pub fn default_database_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(".local/share").join("printpulse.db"),
        |dirs| dirs.data_dir().join("printpulse.db"),
    )
}

fn home_fallback(base: &str) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(base);
    p.push("printpulse");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load config from `path` + environment. A missing file yields defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PRINTPULSE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if it cannot be read.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Access-code resolution ──────────────────────────────────────────

fn keyring_user(printer_id: &str) -> String {
    format!("{printer_id}/access-code")
}

fn keyring_lookup(printer_id: &str) -> Option<String> {
    keyring::Entry::new(KEYRING_SERVICE, &keyring_user(printer_id))
        .ok()?
        .get_password()
        .ok()
}

/// Resolve a printer's access code: env var, then keyring, then plaintext.
pub fn resolve_access_code(
    entry: &PrinterEntry,
    printer_id: &str,
) -> Result<SecretString, ConfigError> {
    resolve_access_code_with(entry, printer_id, keyring_lookup)
}

fn resolve_access_code_with(
    entry: &PrinterEntry,
    printer_id: &str,
    keyring: impl Fn(&str) -> Option<String>,
) -> Result<SecretString, ConfigError> {
    // 1. Entry's access_code_env → env var lookup
    if let Some(ref env_name) = entry.access_code_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Some(secret) = keyring(printer_id) {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(ref code) = entry.access_code {
        return Ok(SecretString::from(code.clone()));
    }

    Err(ConfigError::NoCredentials {
        printer: printer_id.into(),
    })
}

/// Store an access code in the system keyring.
pub fn store_access_code(printer_id: &str, code: &SecretString) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(printer_id))?;
    entry.set_password(code.expose_secret())?;
    Ok(())
}

/// Remove a stored access code. Missing entries are not an error.
pub fn delete_access_code(printer_id: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, &keyring_user(printer_id))?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Translation to core config ──────────────────────────────────────

/// Build the core registration for a config-file printer.
pub fn printer_config(id: &str, entry: &PrinterEntry) -> Result<PrinterConfig, ConfigError> {
    let access_code = resolve_access_code(entry, id)?;
    Ok(entry_to_printer(id, entry, access_code))
}

fn entry_to_printer(id: &str, entry: &PrinterEntry, access_code: SecretString) -> PrinterConfig {
    PrinterConfig {
        id: id.to_owned(),
        name: if entry.name.is_empty() {
            id.to_owned()
        } else {
            entry.name.clone()
        },
        model: entry.model.clone(),
        ip: entry.ip.clone(),
        access_code,
        serial: entry.serial.clone(),
    }
}

/// TLS mode implied by the monitor settings.
pub fn tls_mode(settings: &MonitorSettings) -> Result<TlsMode, ConfigError> {
    match (&settings.ca_cert, settings.insecure) {
        (Some(path), _) => Ok(TlsMode::CustomCa(path.clone())),
        (None, true) => Ok(TlsMode::DangerAcceptInvalid),
        (None, false) => Err(ConfigError::Validation {
            field: "monitor.insecure".into(),
            reason: "printers use self-signed certificates; set ca_cert to verify them".into(),
        }),
    }
}

/// Whether the config selects the simulator.
pub fn is_demo(cfg: &Config) -> Result<bool, ConfigError> {
    match cfg.monitor.mode.as_str() {
        "live" => Ok(false),
        "demo" => Ok(true),
        other => Err(ConfigError::Validation {
            field: "monitor.mode".into(),
            reason: format!("expected 'live' or 'demo', got '{other}'"),
        }),
    }
}

/// Build a `MonitorConfig` from the file config alone, without CLI flag overrides.
///
/// Demo mode ignores the printer table and the database: the simulated
/// fleet lives in memory only.
pub fn monitor_config(cfg: &Config, demo: bool) -> Result<MonitorConfig, ConfigError> {
    if demo || is_demo(cfg)? {
        return Ok(MonitorConfig::demo());
    }

    let settings = &cfg.monitor;
    let printers = cfg
        .printers
        .iter()
        .map(|(id, entry)| printer_config(id, entry))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(MonitorConfig {
        backend: Backend::Mqtt,
        database: Some(
            settings
                .database
                .clone()
                .unwrap_or_else(default_database_path),
        ),
        tls: tls_mode(settings)?,
        keep_alive: Duration::from_secs(settings.keep_alive_secs),
        reconnect: ReconnectConfig {
            initial_delay: Duration::from_secs(settings.reconnect_initial_secs),
            max_delay: Duration::from_secs(settings.reconnect_max_secs),
            max_retries: None,
        },
        client_id_prefix: "cli".into(),
        printers,
    })
}
