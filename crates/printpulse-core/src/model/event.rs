// ── Printer events ──

use std::sync::Arc;

use serde::Serialize;

use super::Printer;

/// Change notification broadcast by the monitor.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PrinterEvent {
    /// The record changed; carries the full new record.
    Updated(Arc<Printer>),
    /// The printer was unregistered.
    Removed { id: String },
}

impl PrinterEvent {
    pub fn printer_id(&self) -> &str {
        match self {
            Self::Updated(printer) => &printer.id,
            Self::Removed { id } => id,
        }
    }
}
