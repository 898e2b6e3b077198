//! Command dispatch: bridges CLI args -> monitor operations -> output formatting.

pub mod config_cmd;
pub mod control;
pub mod prefs;
pub mod printers;
pub mod util;
pub mod watch;

use printpulse_core::Command as PrinterCommand;

use crate::cli::{Command, GlobalOpts};
use crate::config::Config;
use crate::error::CliError;

/// Dispatch a parsed command to its handler.
pub async fn dispatch(cmd: Command, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::Printers(args) => printers::handle(args, cfg, global).await,
        Command::Pause(arg) => control::handle(&arg.printer, PrinterCommand::Pause, cfg, global).await,
        Command::Resume(arg) => {
            control::handle(&arg.printer, PrinterCommand::Resume, cfg, global).await
        }
        Command::Stop(arg) => control::handle(&arg.printer, PrinterCommand::Stop, cfg, global).await,
        Command::Light { printer, state } => {
            let on = state == crate::cli::LightState::On;
            control::handle(&printer, PrinterCommand::SetLight(on), cfg, global).await
        }
        Command::Speed { printer, level } => {
            let command = PrinterCommand::SetSpeed(control::speed_level(level));
            control::handle(&printer, command, cfg, global).await
        }
        Command::Gcode { printer, line } => {
            control::handle(&printer, PrinterCommand::Gcode(line), cfg, global).await
        }
        Command::Watch { printer } => watch::handle(printer.as_deref(), cfg, global).await,
        Command::Prefs(args) => prefs::handle(args, cfg, global),
        Command::Config(args) => config_cmd::handle(args, cfg, global),
        // Completions are generated before the config is loaded
        Command::Completions(_) => Ok(()),
    }
}
