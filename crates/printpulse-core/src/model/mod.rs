// ── Domain model ──
//
// Canonical printer types shared by the store, telemetry, persistence
// and every consumer. Wire field names never leak past `telemetry`.

mod event;
mod printer;
mod status;

pub use event::PrinterEvent;
pub use printer::{
    FilamentInfo, PrintJob, Printer, PrinterConfig, PrinterFault, Temperatures,
};
pub use status::{ConnectionState, PrinterStatus};
