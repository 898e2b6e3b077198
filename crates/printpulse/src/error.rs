//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use printpulse_config::ConfigError;
use printpulse_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to printer: {reason}")]
    #[diagnostic(
        code(printpulse::connection_failed),
        help(
            "Check that the printer is powered on, in LAN mode, and reachable.\n\
             Try: printpulse printers list"
        )
    )]
    ConnectionFailed { reason: String },

    #[error("Printer '{id}' is offline")]
    #[diagnostic(
        code(printpulse::offline),
        help("Commands need a live connection. Check: printpulse printers get {id}")
    )]
    PrinterOffline { id: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("No access code configured for printer '{printer}'")]
    #[diagnostic(
        code(printpulse::no_credentials),
        help(
            "Store one with: printpulse config set-access-code {printer}\n\
             Or set access_code_env in the [printers.{printer}] section."
        )
    )]
    NoCredentials { printer: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("Printer '{id}' not found")]
    #[diagnostic(
        code(printpulse::not_found),
        help("Run: printpulse printers list to see registered printers")
    )]
    NotFound { id: String },

    #[error("Printer '{id}' is already registered")]
    #[diagnostic(code(printpulse::conflict))]
    Conflict { id: String },

    #[error("{message}")]
    #[diagnostic(code(printpulse::invalid_state))]
    InvalidState { message: String },

    #[error("Operation '{operation}' is not supported")]
    #[diagnostic(code(printpulse::unsupported))]
    Unsupported { operation: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(printpulse::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists")]
    #[diagnostic(
        code(printpulse::config_exists),
        help("Edit {path} directly, or rerun with --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(printpulse::config),
        help("Check the config file printed by: printpulse config path")
    )]
    Config { message: String },

    // ── Storage ──────────────────────────────────────────────────────
    #[error("Database error: {message}")]
    #[diagnostic(code(printpulse::database))]
    Database { message: String },

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Operation '{action}' requires confirmation")]
    #[diagnostic(
        code(printpulse::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Printers did not report within {seconds}s")]
    #[diagnostic(
        code(printpulse::timeout),
        help("Increase the wait with --timeout, or check the printers' network.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Internal ─────────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::PrinterOffline { .. } => exit_code::CONNECTION,
            Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::InvalidState { .. } | Self::ConfigExists { .. } => {
                exit_code::CONFLICT
            }
            Self::Unsupported { .. } => exit_code::PERMISSION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            Self::Config { .. } | Self::Database { .. } | Self::Io(_) | Self::Internal(_) => {
                exit_code::GENERAL
            }
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { reason } => CliError::ConnectionFailed { reason },
            CoreError::PrinterNotFound { id } => CliError::NotFound { id },
            CoreError::PrinterOffline { id } => CliError::PrinterOffline { id },
            CoreError::AlreadyExists { id } => CliError::Conflict { id },
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            err @ CoreError::InvalidState { .. } => CliError::InvalidState {
                message: err.to_string(),
            },
            CoreError::Unsupported { operation } => CliError::Unsupported { operation },
            CoreError::Database { message } => CliError::Database { message },
            CoreError::Config { message } => CliError::Config { message },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { printer } => CliError::NoCredentials { printer },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}
