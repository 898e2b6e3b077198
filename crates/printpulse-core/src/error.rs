// ── Core error types ──
//
// User-facing errors from printpulse-core. Consumers never see MQTT
// client errors or SQLite result codes directly; the `From` impls below
// translate them into domain variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to printer: {reason}")]
    ConnectionFailed { reason: String },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Printer not found: {id}")]
    PrinterNotFound { id: String },

    #[error("Printer {id} is offline")]
    PrinterOffline { id: String },

    #[error("Printer already registered: {id}")]
    AlreadyExists { id: String },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Cannot {action} printer {id} while it is {status}")]
    InvalidState {
        id: String,
        action: String,
        status: String,
    },

    #[error("Operation not supported: {operation}")]
    Unsupported { operation: String },

    // ── Storage errors ───────────────────────────────────────────────
    #[error("Database error: {message}")]
    Database { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from lower-layer errors ───────────────────────────────

impl From<printpulse_api::Error> for CoreError {
    fn from(err: printpulse_api::Error) -> Self {
        use printpulse_api::Error as Api;

        match err {
            Api::Mqtt(e) => CoreError::ConnectionFailed {
                reason: format!("MQTT client: {e}"),
            },
            Api::Connection(reason) => CoreError::ConnectionFailed { reason },
            Api::Tls(msg) => CoreError::Config {
                message: format!("TLS: {msg}"),
            },
            Api::NotConnected | Api::ChannelClosed => CoreError::ConnectionFailed {
                reason: "printer link is down".into(),
            },
            Api::UnsupportedCommand(operation) => CoreError::Unsupported { operation },
            Api::Deserialization { message } => {
                CoreError::Internal(format!("Deserialization error: {message}"))
            }
            Api::Io(e) => CoreError::Internal(format!("IO error: {e}")),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_down_maps_to_connection_failed() {
        let err = CoreError::from(printpulse_api::Error::NotConnected);
        assert!(matches!(err, CoreError::ConnectionFailed { .. }));
    }

    #[test]
    fn unsupported_command_keeps_operation_name() {
        let err = CoreError::from(printpulse_api::Error::UnsupportedCommand("explode".into()));
        assert_eq!(err.to_string(), "Operation not supported: explode");
    }

    #[test]
    fn invalid_state_message_names_action_and_status() {
        let err = CoreError::InvalidState {
            id: "x1".into(),
            action: "resume".into(),
            status: "printing".into(),
        };
        assert_eq!(err.to_string(), "Cannot resume printer x1 while it is printing");
    }
}
