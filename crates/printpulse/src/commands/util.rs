//! Shared helpers for command handlers.

use std::future::Future;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::time::Instant;

use printpulse_core::{ConnectionState, Monitor, Printer};

use crate::cli::GlobalOpts;
use crate::config::{self, Config};
use crate::error::CliError;

/// How long the store must stay unchanged before a snapshot is shown.
const QUIET_PERIOD: Duration = Duration::from_millis(300);

/// Prompt for confirmation, auto-approving if `--yes` was passed.
///
/// Without a terminal there is nobody to ask, so the action is refused.
pub fn confirm(message: &str, action: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::NonInteractiveRequiresYes {
            action: action.into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(prompt_err)
}

/// Map a dialoguer / interactive I/O failure into CliError.
pub fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Start a monitor for the duration of one command, then shut it down.
///
/// Shutdown runs on the error path too, so pending state writes land.
pub async fn with_monitor<F, Fut, T>(cfg: &Config, global: &GlobalOpts, f: F) -> Result<T, CliError>
where
    F: FnOnce(Monitor) -> Fut,
    Fut: Future<Output = Result<T, CliError>>,
{
    let monitor = Monitor::new(config::monitor_config(cfg, global)?);
    monitor.start().await?;
    let result = f(monitor.clone()).await;
    monitor.shutdown().await;
    result
}

/// Wait for printers to connect or fail, then for the first burst of
/// reports to land.
///
/// With `only`, waits for that one printer instead of the whole fleet.
/// Shows a spinner on interactive terminals. Fails with `Timeout` when a
/// printer is still connecting after `--timeout` seconds.
pub async fn wait_for_printers(
    monitor: &Monitor,
    global: &GlobalOpts,
    only: Option<&str>,
) -> Result<(), CliError> {
    let seconds = global.timeout_secs();
    let timeout = Duration::from_secs(seconds);
    let deadline = Instant::now() + timeout;

    if let Some(id) = only {
        require_printer(monitor, id)?;
    }

    let spinner = spinner(global, "Waiting for printers...");
    let settled = match only {
        Some(id) => printer_settled(monitor, id, timeout).await,
        None => monitor.wait_until_settled(timeout).await,
    };
    if settled {
        let mut stream = monitor.printers_stream();
        loop {
            let quiet_until = (Instant::now() + QUIET_PERIOD).min(deadline);
            match tokio::time::timeout_at(quiet_until, stream.changed()).await {
                Ok(Some(_)) if Instant::now() < deadline => {}
                _ => break,
            }
        }
    }
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if settled {
        Ok(())
    } else {
        Err(CliError::Timeout { seconds })
    }
}

async fn printer_settled(monitor: &Monitor, id: &str, timeout: Duration) -> bool {
    let mut stream = monitor.printers_stream();
    let connecting = |printers: &[Arc<Printer>]| {
        printers
            .iter()
            .any(|p| p.id == id && p.connection_state == ConnectionState::Connecting)
    };

    tokio::time::timeout(timeout, async move {
        if !connecting(&stream.latest()) {
            return;
        }
        while let Some(snapshot) = stream.changed().await {
            if !connecting(&snapshot) {
                return;
            }
        }
    })
    .await
    .is_ok()
}

fn spinner(global: &GlobalOpts, message: &'static str) -> Option<ProgressBar> {
    if global.quiet || !std::io::stderr().is_terminal() {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    Some(bar)
}

/// Look up a printer, mapping absence to a NotFound error.
pub fn require_printer(monitor: &Monitor, id: &str) -> Result<Arc<Printer>, CliError> {
    monitor
        .printer(id)
        .ok_or_else(|| CliError::NotFound { id: id.into() })
}

/// `"1h 5m"` style rendering of a seconds count.
pub fn format_seconds(seconds: i64) -> String {
    let secs = u64::try_from(seconds).unwrap_or(0);
    // Minute precision is enough for remaining-time estimates
    let rounded = if secs >= 60 { secs - secs % 60 } else { secs };
    humantime::format_duration(Duration::from_secs(rounded)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_render_at_minute_precision() {
        assert_eq!(format_seconds(3_900), "1h 5m");
        assert_eq!(format_seconds(125), "2m");
        assert_eq!(format_seconds(42), "42s");
        assert_eq!(format_seconds(-5), "0s");
    }
}
