//! Printer monitoring engine between `printpulse-api` and consumers.
//!
//! - **[`Monitor`]**: central facade. [`start()`](Monitor::start) opens the
//!   database, restores registered printers and spawns one link session per
//!   printer; [`Monitor::oneshot()`](Monitor::oneshot) wraps a single CLI
//!   invocation.
//!
//! - **[`PrinterStore`]**: reactive storage built on `DashMap` and
//!   `tokio::sync::watch`, holding printer records and the raw report
//!   document accumulated per printer.
//!
//! - **[`telemetry`]**: pure functions that merge partial reports and turn
//!   them into status, job, filament and fault views.
//!
//! - **[`Command`]**: typed printer operations, validated against the
//!   current record before they reach the wire.
//!
//! - **[`Database`]**: SQLite persistence for registrations, last-known
//!   state and user preferences.
//!
//! - **[`Simulator`]**: demo backend producing realistic reports through
//!   the same link contract as real printers.

pub mod command;
pub mod config;
pub mod database;
pub mod error;
pub mod model;
pub mod monitor;
pub mod simulator;
pub mod store;
pub mod stream;
pub mod telemetry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::Command;
pub use config::{Backend, MonitorConfig};
pub use database::{Database, Preference, StoredState};
pub use error::CoreError;
pub use monitor::Monitor;
pub use simulator::{SimConfig, Simulator, TransitionOdds, demo_printers};
pub use store::PrinterStore;
pub use stream::{EntityStream, PrinterStream};

pub use model::{
    ConnectionState, FilamentInfo, PrintJob, Printer, PrinterConfig, PrinterEvent, PrinterFault,
    PrinterStatus, Temperatures,
};

// Wire-level types consumers need without a direct api dependency.
pub use printpulse_api::{LinkEvent, LinkHandle, ReconnectConfig, SpeedLevel, TlsMode};
