//! Clap derive structures for the `printpulse` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. This
//! file is also compiled by `build.rs`, so it may only depend on clap.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// printpulse -- watch and control Bambu Lab printers on your LAN
#[derive(Debug, Parser)]
#[command(
    name = "printpulse",
    version,
    about = "Monitor and control Bambu Lab 3D printers from the command line",
    long_about = "Monitor and control Bambu Lab 3D printers over LAN-mode MQTT.\n\n\
        Printer registrations and last-known state live in a local SQLite\n\
        database. Use --demo to explore with a simulated fleet.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "PRINTPULSE_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: from config, else auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,

    /// Use the simulated demo fleet instead of real printers
    #[arg(long, env = "PRINTPULSE_DEMO", global = true)]
    pub demo: bool,

    /// Seconds to wait for printers to report
    #[arg(long, env = "PRINTPULSE_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

impl GlobalOpts {
    pub fn output_format(&self) -> OutputFormat {
        self.output.clone().unwrap_or(OutputFormat::Table)
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color.clone().unwrap_or(ColorMode::Auto)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout.unwrap_or(15)
    }
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage registered printers
    #[command(alias = "p")]
    Printers(PrintersArgs),

    /// Pause the running job
    Pause(PrinterArg),

    /// Resume a paused job
    Resume(PrinterArg),

    /// Stop (cancel) the current job
    Stop(PrinterArg),

    /// Switch the chamber light
    Light {
        /// Printer ID
        printer: String,

        /// Desired light state
        state: LightState,
    },

    /// Change the print speed profile
    Speed {
        /// Printer ID
        printer: String,

        /// Speed profile
        level: SpeedArg,
    },

    /// Send a single line of G-code
    Gcode {
        /// Printer ID
        printer: String,

        /// G-code line, e.g. "M104 S200"
        line: String,
    },

    /// Stream live printer updates until interrupted
    #[command(alias = "w")]
    Watch {
        /// Only show updates for this printer
        printer: Option<String>,
    },

    /// Manage stored user preferences
    Prefs(PrefsArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct PrinterArg {
    /// Printer ID
    pub printer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LightState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpeedArg {
    /// 50%
    Silent,
    /// 100%
    Standard,
    /// 124%
    Sport,
    /// 166%
    Ludicrous,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PRINTERS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PrintersArgs {
    #[command(subcommand)]
    pub command: PrintersCommand,
}

#[derive(Debug, Subcommand)]
pub enum PrintersCommand {
    /// List printers with live status
    #[command(alias = "ls")]
    List {
        /// Show last-known state from the database without connecting
        #[arg(long)]
        cached: bool,
    },

    /// Show one printer in detail
    Get {
        /// Printer ID
        printer: String,
    },

    /// Register a printer (prompts for anything not given)
    Add {
        /// Unique printer ID
        #[arg(long)]
        id: Option<String>,

        /// Display name
        #[arg(long)]
        name: Option<String>,

        /// Model, e.g. X1C, P1S, A1 mini
        #[arg(long)]
        model: Option<String>,

        /// LAN IP address
        #[arg(long)]
        ip: Option<String>,

        /// Serial number
        #[arg(long)]
        serial: Option<String>,

        /// LAN-mode access code
        #[arg(long, env = "PRINTPULSE_ACCESS_CODE", hide_env_values = true)]
        access_code: Option<String>,
    },

    /// Unregister a printer and drop its stored state
    #[command(alias = "rm")]
    Remove {
        /// Printer ID
        printer: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  PREFERENCES
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct PrefsArgs {
    #[command(subcommand)]
    pub command: PrefsCommand,
}

#[derive(Debug, Subcommand)]
pub enum PrefsCommand {
    /// List all preferences
    #[command(alias = "ls")]
    List,

    /// Print one preference value
    Get {
        /// Preference key
        key: String,
    },

    /// Create or overwrite a preference
    Set {
        /// Preference key
        key: String,

        /// Value to store
        value: String,
    },

    /// Delete a preference
    Unset {
        /// Preference key
        key: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  CONFIG
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Create the config file with guided setup
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Display the resolved configuration
    Show,

    /// Print the config file location
    Path,

    /// Store a printer's access code in the system keyring
    SetAccessCode {
        /// Printer ID as used in the config file
        printer: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  COMPLETIONS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
