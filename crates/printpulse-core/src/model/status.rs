// ── Printer and connection status ──

use serde::{Deserialize, Serialize};

/// Operational status shown for a printer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PrinterStatus {
    Idle,
    Printing,
    Paused,
    Error,
    Offline,
    Connecting,
}

impl PrinterStatus {
    /// A job is loaded (running or paused).
    pub fn has_job(self) -> bool {
        matches!(self, Self::Printing | Self::Paused)
    }

    /// The printer is talking to us.
    pub fn is_reachable(self) -> bool {
        !matches!(self, Self::Offline | Self::Connecting)
    }
}

/// State of the transport session to a printer.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Connected,
    Failed,
    Disconnected,
}
