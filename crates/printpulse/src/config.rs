//! CLI configuration: a thin wrapper around `printpulse_config`.
//!
//! Re-exports the shared types and adds the resolution steps that respect
//! `GlobalOpts` flag overrides (--demo, --output, --timeout).

use std::path::PathBuf;

use clap::ValueEnum;

use printpulse_core::MonitorConfig;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use printpulse_config::{
    Config, PrinterEntry, config_path, default_database_path, load_config, save_config,
};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Fill flags the user did not pass from the config file's `[defaults]`.
///
/// Unparseable config values are ignored; the built-in default applies.
pub fn apply_defaults(global: &mut GlobalOpts, cfg: &Config) {
    if global.output.is_none() {
        global.output = OutputFormat::from_str(&cfg.defaults.output, true).ok();
    }
    if global.color.is_none() {
        global.color = ColorMode::from_str(&cfg.defaults.color, true).ok();
    }
    if global.timeout.is_none() {
        global.timeout = Some(cfg.defaults.timeout);
    }
}

/// Translate the config file + global flags into a `MonitorConfig`.
pub fn monitor_config(cfg: &Config, global: &GlobalOpts) -> Result<MonitorConfig, CliError> {
    Ok(printpulse_config::monitor_config(cfg, global.demo)?)
}

/// Whether the simulated fleet is selected, by flag or config file.
///
/// Unlike [`monitor_config`], this never resolves access codes.
pub fn is_demo(cfg: &Config, global: &GlobalOpts) -> Result<bool, CliError> {
    Ok(global.demo || printpulse_config::is_demo(cfg)?)
}

/// SQLite file used for preferences and cached state.
pub fn database_path(cfg: &Config) -> PathBuf {
    cfg.monitor
        .database
        .clone()
        .unwrap_or_else(default_database_path)
}
