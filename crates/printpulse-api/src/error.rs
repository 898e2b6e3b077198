use thiserror::Error;

/// Top-level error type for the `printpulse-api` crate.
///
/// Covers every failure mode of the printer wire layer: MQTT client
/// plumbing, TLS setup, request encoding, and report decoding.
/// `printpulse-core` maps these into user-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The MQTT client refused a request (request channel closed or full).
    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// The broker connection failed (DNS, refused, handshake, bad credentials).
    #[error("Connection failed: {0}")]
    Connection(String),

    /// TLS configuration or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A request was issued while the printer link is down.
    #[error("Printer is not connected")]
    NotConnected,

    /// The link task has exited and can no longer accept requests.
    #[error("Printer link closed")]
    ChannelClosed,

    // ── Protocol ────────────────────────────────────────────────────
    /// The requested action has no wire encoding.
    #[error("Unsupported command: {0}")]
    UnsupportedCommand(String),

    /// A report payload could not be decoded.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String },

    // ── IO ──────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Deserialization {
            message: err.to_string(),
        }
    }
}

impl Error {
    /// Returns `true` if retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::NotConnected | Self::Mqtt(_))
    }
}

/// Result alias for the wire layer.
pub type Result<T> = std::result::Result<T, Error>;
