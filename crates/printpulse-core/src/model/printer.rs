// ── Printer domain types ──

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

use super::status::{ConnectionState, PrinterStatus};
use crate::error::CoreError;

/// Registration data for one printer.
///
/// The access code is the LAN-mode MQTT password. It serializes as
/// `"****"`; only the database layer reads it in clear.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrinterConfig {
    pub id: String,
    pub name: String,
    pub model: String,
    pub ip: String,
    #[serde(serialize_with = "redacted")]
    pub access_code: SecretString,
    pub serial: String,
}

fn redacted<S: Serializer>(_: &SecretString, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str("****")
}

impl PrinterConfig {
    /// Reject configs that can never connect.
    pub fn validate(&self) -> Result<(), CoreError> {
        let missing: Vec<&str> = [
            ("id", self.id.trim().is_empty()),
            ("ip", self.ip.trim().is_empty()),
            ("serial", self.serial.trim().is_empty()),
            ("access_code", self.access_code.expose_secret().is_empty()),
        ]
        .into_iter()
        .filter_map(|(field, empty)| empty.then_some(field))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::ValidationFailed {
                message: format!("printer config is missing {}", missing.join(", ")),
            })
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Temperatures in whole degrees Celsius.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Temperatures {
    pub nozzle: i32,
    pub bed: i32,
    pub chamber: i32,
    pub nozzle_target: Option<i32>,
    pub bed_target: Option<i32>,
}

/// The job currently loaded on a printer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrintJob {
    /// Percent complete, `0.0..=100.0`.
    pub progress: f64,
    /// Seconds.
    pub time_remaining: i64,
    /// Seconds, when it can be estimated.
    pub estimated_total_time: Option<i64>,
    pub file_name: String,
    pub print_type: Option<String>,
    pub layer_current: i32,
    pub layer_total: i32,
    pub speed_level: Option<i32>,
    pub fan_speed: Option<i32>,
    pub stage: Option<i32>,
    pub lifecycle: Option<String>,
}

/// The spool currently feeding the extruder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentInfo {
    #[serde(rename = "type")]
    pub kind: String,
    /// `#RRGGBB`.
    pub color: String,
    /// Percent left, `0.0..=100.0`.
    pub remaining: f64,
}

/// Fault reported by the printer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterFault {
    pub print_error: i32,
    pub error_code: i32,
    pub stage: i32,
    pub lifecycle: String,
    pub gcode_state: String,
    pub message: String,
}

/// The printer record: everything known about one printer right now.
///
/// `status == Error` exactly when `error` is set. `print` is only set
/// while a job is loaded or job telemetry is still present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Printer {
    pub id: String,
    pub name: String,
    pub model: String,
    pub ip: String,
    pub serial: String,
    pub status: PrinterStatus,
    pub online: bool,
    pub connection_state: ConnectionState,
    pub temperatures: Temperatures,
    pub print: Option<PrintJob>,
    pub filament: Option<FilamentInfo>,
    pub error: Option<PrinterFault>,
    pub last_update: DateTime<Utc>,
}

impl Printer {
    /// Fresh record for a printer whose session is about to start.
    pub fn from_config(config: &PrinterConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.display_name().to_owned(),
            model: config.model.clone(),
            ip: config.ip.clone(),
            serial: config.serial.clone(),
            status: PrinterStatus::Connecting,
            online: false,
            connection_state: ConnectionState::Connecting,
            temperatures: Temperatures::default(),
            print: None,
            filament: None,
            error: None,
            last_update: Utc::now(),
        }
    }

    /// Session established. Telemetry decides the real status next.
    pub fn mark_connected(&mut self) {
        self.online = true;
        self.status = PrinterStatus::Idle;
        self.connection_state = ConnectionState::Connected;
        self.error = None;
        self.last_update = Utc::now();
    }

    /// Session lost. Last-known job and filament stay visible.
    pub fn mark_offline(&mut self) {
        self.online = false;
        self.status = PrinterStatus::Offline;
        self.connection_state = ConnectionState::Failed;
        self.error = None;
        self.last_update = Utc::now();
    }

    /// Commands can reach the printer.
    pub fn is_commandable(&self) -> bool {
        self.online && self.status.is_reachable()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> PrinterConfig {
        PrinterConfig {
            id: "p1s-garage".into(),
            name: "Garage P1S".into(),
            model: "P1S".into(),
            ip: "192.168.1.50".into(),
            access_code: SecretString::from("12345678".to_string()),
            serial: "01P00A000000001".into(),
        }
    }

    #[test]
    fn new_record_is_connecting() {
        let printer = Printer::from_config(&config());
        assert_eq!(printer.status, PrinterStatus::Connecting);
        assert_eq!(printer.connection_state, ConnectionState::Connecting);
        assert!(!printer.online);
        assert!(printer.print.is_none());
        assert!(printer.error.is_none());
    }

    #[test]
    fn access_code_never_serializes_in_clear() {
        let json = serde_json::to_value(config()).unwrap();
        assert_eq!(json["access_code"], "****");
    }

    #[test]
    fn validate_lists_missing_fields() {
        let mut cfg = config();
        cfg.ip = String::new();
        cfg.serial = "  ".into();
        let err = cfg.validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: printer config is missing ip, serial"
        );
    }

    #[test]
    fn empty_name_falls_back_to_id() {
        let mut cfg = config();
        cfg.name = String::new();
        assert_eq!(Printer::from_config(&cfg).name, "p1s-garage");
    }

    #[test]
    fn offline_clears_fault_but_keeps_job() {
        let mut printer = Printer::from_config(&config());
        printer.mark_connected();
        printer.status = PrinterStatus::Error;
        printer.print = Some(PrintJob {
            progress: 40.0,
            time_remaining: 600,
            estimated_total_time: None,
            file_name: "benchy.3mf".into(),
            print_type: None,
            layer_current: 10,
            layer_total: 100,
            speed_level: None,
            fan_speed: None,
            stage: None,
            lifecycle: None,
        });
        printer.error = Some(PrinterFault {
            print_error: 1,
            error_code: 0,
            stage: 0,
            lifecycle: "Unknown".into(),
            gcode_state: "FAILED".into(),
            message: "Print error occurred".into(),
        });

        printer.mark_offline();
        assert_eq!(printer.status, PrinterStatus::Offline);
        assert!(printer.error.is_none());
        assert!(printer.print.is_some());
        assert!(!printer.is_commandable());
    }
}
