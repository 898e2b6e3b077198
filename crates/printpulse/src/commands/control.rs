//! Job control and printer setting handlers (pause, resume, stop, light,
//! speed, gcode).

use printpulse_core::{Command, SpeedLevel};

use crate::cli::{GlobalOpts, SpeedArg};
use crate::config::Config;
use crate::error::CliError;

use super::util;

pub fn speed_level(arg: SpeedArg) -> SpeedLevel {
    match arg {
        SpeedArg::Silent => SpeedLevel::Silent,
        SpeedArg::Standard => SpeedLevel::Standard,
        SpeedArg::Sport => SpeedLevel::Sport,
        SpeedArg::Ludicrous => SpeedLevel::Ludicrous,
    }
}

/// Connect, wait for the printer's first report, validate and send.
pub async fn handle(
    printer: &str,
    command: Command,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    if command == Command::Stop
        && !util::confirm(
            &format!("Stop the current job on '{printer}'? It cannot be resumed."),
            "stop",
            global.yes,
        )?
    {
        return Ok(());
    }

    let name = command.name();
    util::with_monitor(cfg, global, |monitor| async move {
        util::wait_for_printers(&monitor, global, Some(printer)).await?;
        monitor.execute(printer, command).await?;
        Ok(())
    })
    .await?;

    if !global.quiet {
        eprintln!("✓ Sent {name} to '{printer}'");
    }
    Ok(())
}
