//! `watch`: stream printer updates until Ctrl-C.

use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::RecvError;

use printpulse_core::{Printer, PrinterEvent};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::config::Config;
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(
    printer: Option<&str>,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let format = global.output_format();
    let color = output::should_color(&global.color_mode());

    util::with_monitor(cfg, global, |monitor| async move {
        // Subscribe before reading the snapshot so nothing slips between
        let mut events = monitor.events();
        if let Some(id) = printer {
            util::require_printer(&monitor, id)?;
        }

        for record in monitor.printers().iter() {
            if printer.is_none_or(|id| id == record.id) {
                emit(&PrinterEvent::Updated(record.clone()), &format, color);
            }
        }

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        if printer.is_none_or(|id| id == event.printer_id()) {
                            emit(&event, &format, color);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "watch fell behind, some updates were dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        Ok(())
    })
    .await
}

fn emit(event: &PrinterEvent, format: &OutputFormat, color: bool) {
    let line = match format {
        OutputFormat::Table => summary(event, color),
        OutputFormat::Plain => match event {
            PrinterEvent::Updated(p) => format!("{} {}", p.id, p.status),
            PrinterEvent::Removed { id } => format!("{id} removed"),
        },
        // One document per line so the stream stays parseable
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json_compact(event),
        OutputFormat::Yaml => format!("---\n{}", output::render_yaml(event).trim_end()),
    };
    output::print_output(&line, false);
}

fn summary(event: &PrinterEvent, color: bool) -> String {
    match event {
        PrinterEvent::Updated(p) => {
            let time = p.last_update.format("%H:%M:%S").to_string();
            let time = if color { time.dimmed().to_string() } else { time };
            format!(
                "{time}  {:<16} {:<10} {}",
                p.id,
                output::status_label(p.status, color),
                details(p)
            )
        }
        PrinterEvent::Removed { id } => format!("{:<8}  {id:<16} removed", ""),
    }
}

fn details(p: &Printer) -> String {
    let t = &p.temperatures;
    let mut parts = vec![format!("nozzle {}°C", t.nozzle), format!("bed {}°C", t.bed)];
    if let Some(ref job) = p.print {
        parts.push(format!("{:.0}% {}", job.progress, job.file_name));
    }
    if let Some(ref fault) = p.error {
        parts.push(fault.message.clone());
    }
    parts.join("  ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn removal_lines_name_the_printer() {
        let event = PrinterEvent::Removed { id: "garage".into() };
        assert!(summary(&event, false).ends_with("garage           removed"));
    }
}
