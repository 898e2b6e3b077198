//! Wire layer for Bambu Lab printers in LAN mode.
//!
//! - **[`mqtt`]**: MQTT-over-TLS session per printer with reconnect and
//!   backoff, exposed through the backend-neutral [`link`] contract.
//! - **[`request`]**: JSON payloads for everything the printer accepts.
//! - **[`tls`]**: rustls configuration for self-signed printer certificates.
//!
//! Interpreting reports is left to `printpulse-core`; this crate only moves
//! JSON documents in both directions.

pub mod error;
pub mod link;
pub mod mqtt;
pub mod request;
pub mod tls;

pub use error::{Error, Result};
pub use link::{
    LinkEndpoint, LinkEvent, LinkHandle, ReconnectConfig, RequestEnvelope, RequestSender,
    calculate_backoff, link_channel,
};
pub use mqtt::{ConnectionConfig, DEFAULT_PORT, MqttLink};
pub use request::{PrinterRequest, SpeedLevel, report_topic, request_topic};
pub use tls::TlsMode;
