// ── Runtime monitor configuration ──
//
// Describes how the monitor reaches printers and where it keeps state.
// Never touches config files; the CLI builds a `MonitorConfig` and hands
// it in.

use std::path::PathBuf;
use std::time::Duration;

use printpulse_api::{ReconnectConfig, TlsMode};

use crate::model::PrinterConfig;
use crate::simulator::{SimConfig, demo_printers};

/// Where printer telemetry comes from.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Backend {
    /// Real printers over MQTT/TLS.
    #[default]
    Mqtt,
    /// Random-walk simulator speaking the same link contract.
    Simulated(SimConfig),
}

/// Configuration for a [`Monitor`](crate::Monitor).
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub backend: Backend,
    /// SQLite file for registrations and last-known state. `None` keeps
    /// everything in memory for the lifetime of the monitor.
    pub database: Option<PathBuf>,
    pub tls: TlsMode,
    pub keep_alive: Duration,
    pub reconnect: ReconnectConfig,
    /// Folded into MQTT client ids.
    pub client_id_prefix: String,
    /// Printers registered at startup in addition to persisted ones.
    /// Entries already in the database are refreshed from here.
    pub printers: Vec<PrinterConfig>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            database: None,
            tls: TlsMode::default(),
            keep_alive: Duration::from_secs(60),
            reconnect: ReconnectConfig::default(),
            client_id_prefix: "desktop".into(),
            printers: Vec::new(),
        }
    }
}

impl MonitorConfig {
    /// Demo configuration: simulated backend over the demo fleet, no
    /// persistence.
    pub fn demo() -> Self {
        Self {
            backend: Backend::Simulated(SimConfig::default()),
            printers: demo_printers(),
            ..Self::default()
        }
    }

    pub fn is_simulated(&self) -> bool {
        matches!(self.backend, Backend::Simulated(_))
    }
}
