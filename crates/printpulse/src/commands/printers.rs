//! Printer command handlers.

use std::collections::HashMap;
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use dialoguer::Input;
use secrecy::SecretString;
use tabled::Tabled;

use printpulse_core::{Database, Monitor, Printer, PrinterConfig, PrinterStatus};

use crate::cli::{GlobalOpts, PrintersArgs, PrintersCommand};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

use super::util;

/// How long `printers get` waits for a fresh report after asking for one.
const REFRESH_WAIT: Duration = Duration::from_secs(2);

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct PrinterRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Nozzle")]
    nozzle: String,
    #[tabled(rename = "Bed")]
    bed: String,
    #[tabled(rename = "Job")]
    job: String,
    #[tabled(rename = "Progress")]
    progress: String,
    #[tabled(rename = "Remaining")]
    remaining: String,
}

impl PrinterRow {
    fn new(p: &Printer, color: bool) -> Self {
        let job = p.print.as_ref();
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            model: p.model.clone(),
            status: output::status_label(p.status, color),
            nozzle: temperature(p.temperatures.nozzle, p.temperatures.nozzle_target),
            bed: temperature(p.temperatures.bed, p.temperatures.bed_target),
            job: job.map_or_else(|| "-".into(), |j| j.file_name.clone()),
            progress: job.map_or_else(|| "-".into(), |j| format!("{:.0}%", j.progress)),
            remaining: job
                .filter(|j| j.time_remaining > 0)
                .map_or_else(|| "-".into(), |j| util::format_seconds(j.time_remaining)),
        }
    }
}

fn temperature(current: i32, target: Option<i32>) -> String {
    match target {
        Some(target) if target > 0 => format!("{current}/{target}°C"),
        _ => format!("{current}°C"),
    }
}

fn detail(p: &Printer, color: bool) -> String {
    let t = &p.temperatures;
    let mut lines = vec![
        format!("ID:         {}", p.id),
        format!("Name:       {}", p.name),
        format!("Model:      {}", p.model),
        format!("IP:         {}", p.ip),
        format!("Serial:     {}", p.serial),
        format!("Status:     {}", output::status_label(p.status, color)),
        format!("Connection: {}", p.connection_state),
        format!("Nozzle:     {}", temperature(t.nozzle, t.nozzle_target)),
        format!("Bed:        {}", temperature(t.bed, t.bed_target)),
        format!("Chamber:    {}°C", t.chamber),
    ];
    if let Some(ref job) = p.print {
        lines.push(format!("Job:        {}", job.file_name));
        lines.push(format!("Progress:   {:.1}%", job.progress));
        if job.layer_total > 0 {
            lines.push(format!(
                "Layers:     {}/{}",
                job.layer_current, job.layer_total
            ));
        }
        lines.push(format!(
            "Remaining:  {}",
            util::format_seconds(job.time_remaining)
        ));
        if let Some(speed) = job.speed_level {
            lines.push(format!("Speed:      level {speed}"));
        }
    }
    if let Some(ref filament) = p.filament {
        lines.push(format!(
            "Filament:   {} {} ({:.0}% left)",
            filament.kind, filament.color, filament.remaining
        ));
    }
    if let Some(ref fault) = p.error {
        lines.push(format!("Error:      {}", fault.message));
    }
    lines.push(format!(
        "Updated:    {}",
        p.last_update.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    lines.join("\n")
}

// ── Handler ─────────────────────────────────────────────────────────

#[allow(clippy::too_many_lines)]
pub async fn handle(args: PrintersArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color_mode());

    match args.command {
        PrintersCommand::List { cached } => {
            let printers = if cached {
                cached_printers(cfg, global)?
            } else {
                util::with_monitor(cfg, global, |monitor| async move {
                    util::wait_for_printers(&monitor, global, None).await?;
                    Ok(monitor.printers().as_ref().clone())
                })
                .await?
            };

            let out = output::render_list(
                &global.output_format(),
                &printers,
                |p| PrinterRow::new(p, color),
                |p| p.id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PrintersCommand::Get { printer } => {
            let record = util::with_monitor(cfg, global, |monitor| async move {
                util::wait_for_printers(&monitor, global, Some(&printer)).await?;
                let current = util::require_printer(&monitor, &printer)?;
                if current.is_commandable() {
                    refresh(&monitor, &printer).await;
                }
                util::require_printer(&monitor, &printer)
            })
            .await?;

            let out = output::render_single(
                &global.output_format(),
                record.as_ref(),
                |p| detail(p, color),
                |p| p.id.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PrintersCommand::Add {
            id,
            name,
            model,
            ip,
            serial,
            access_code,
        } => {
            let printer = PrinterConfig {
                id: field(id, "id", "Printer ID", None)?,
                name: field(name, "name", "Display name", Some(""))?,
                model: field(model, "model", "Model", Some("P1S"))?,
                ip: field(ip, "ip", "IP address", None)?,
                serial: field(serial, "serial", "Serial number", None)?,
                access_code: read_access_code(access_code)?,
            };
            printer.validate()?;

            let monitor_config = config::monitor_config(cfg, global)?;
            if monitor_config.is_simulated() {
                eprintln!("Demo mode: the printer is simulated and forgotten on exit");
            }

            let id = printer.id.clone();
            let timeout = Duration::from_secs(global.timeout_secs());
            let record = Monitor::oneshot(monitor_config, |monitor| async move {
                monitor.add_printer(printer).await?;
                monitor.wait_until_settled(timeout).await;
                Ok(monitor.printer(&id))
            })
            .await?
            .ok_or_else(|| CliError::Internal("registered printer vanished".into()))?;

            if !global.quiet {
                eprintln!(
                    "✓ Registered '{}' ({})",
                    record.id,
                    output::status_label(record.status, color)
                );
            }
            Ok(())
        }

        PrintersCommand::Remove { printer } => {
            if !util::confirm(
                &format!("Remove printer '{printer}' and its stored state?"),
                "printers remove",
                global.yes,
            )? {
                return Ok(());
            }

            let id = printer.as_str();
            util::with_monitor(cfg, global, |monitor| async move {
                Ok(monitor.remove_printer(id).await?)
            })
            .await?;

            if !global.quiet {
                eprintln!("✓ Removed '{printer}'");
                if cfg.printers.contains_key(&printer) {
                    eprintln!(
                        "  It is still listed under [printers.{printer}] in {} \
                         and will come back on the next run.",
                        config::config_path().display()
                    );
                }
            }
            Ok(())
        }
    }
}

/// Ask for a full report and wait briefly for it to land.
async fn refresh(monitor: &Monitor, id: &str) {
    let mut stream = monitor.printers_stream();
    if let Err(e) = monitor.request_status(id).await {
        tracing::debug!(printer = %id, error = %e, "status request failed");
        return;
    }
    let _ = tokio::time::timeout(REFRESH_WAIT, stream.changed()).await;
}

/// Last-known printers straight from the database, without connecting.
fn cached_printers(cfg: &Config, global: &GlobalOpts) -> Result<Vec<Arc<Printer>>, CliError> {
    if config::is_demo(cfg, global)? {
        return Err(CliError::Validation {
            field: "cached".into(),
            reason: "demo mode keeps no state on disk".into(),
        });
    }

    let db = Database::open(&config::database_path(cfg))?;
    let mut states: HashMap<_, _> = db
        .load_states()?
        .into_iter()
        .map(|state| (state.printer_id.clone(), state))
        .collect();

    Ok(db
        .list_printers()?
        .iter()
        .map(|registration| {
            let mut record = Printer::from_config(registration);
            match states.remove(&registration.id) {
                Some(state) => state.apply_to(&mut record),
                None => record.status = PrinterStatus::Offline,
            }
            Arc::new(record)
        })
        .collect())
}

/// Take a flag value, or prompt for it on an interactive terminal.
fn field(
    value: Option<String>,
    flag: &str,
    prompt: &str,
    default: Option<&str>,
) -> Result<String, CliError> {
    if let Some(value) = value {
        return Ok(value);
    }
    if !std::io::stdin().is_terminal() {
        return match default {
            Some(default) => Ok(default.to_owned()),
            None => Err(CliError::Validation {
                field: flag.into(),
                reason: format!("--{flag} is required when not running interactively"),
            }),
        };
    }

    let mut input = Input::<String>::new().with_prompt(prompt);
    if let Some(default) = default {
        input = input.default(default.to_owned()).allow_empty(true);
    }
    input.interact_text().map_err(util::prompt_err)
}

fn read_access_code(flag: Option<String>) -> Result<SecretString, CliError> {
    let code = match flag {
        Some(code) => code,
        None if std::io::stdin().is_terminal() => {
            rpassword::prompt_password("Access code: ").map_err(util::prompt_err)?
        }
        None => {
            return Err(CliError::Validation {
                field: "access_code".into(),
                reason: "--access-code is required when not running interactively".into(),
            });
        }
    };
    Ok(SecretString::from(code))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use printpulse_core::{ConnectionState, PrintJob, Temperatures};

    use super::*;

    fn printer() -> Printer {
        Printer {
            id: "garage".into(),
            name: "Garage P1S".into(),
            model: "P1S".into(),
            ip: "192.168.1.50".into(),
            serial: "01P00A000000001".into(),
            status: PrinterStatus::Printing,
            online: true,
            connection_state: ConnectionState::Connected,
            temperatures: Temperatures {
                nozzle: 219,
                bed: 60,
                chamber: 34,
                nozzle_target: Some(220),
                bed_target: None,
            },
            print: Some(PrintJob {
                progress: 42.4,
                time_remaining: 3_900,
                estimated_total_time: None,
                file_name: "benchy.3mf".into(),
                print_type: None,
                layer_current: 80,
                layer_total: 200,
                speed_level: Some(2),
                fan_speed: None,
                stage: None,
                lifecycle: None,
            }),
            filament: None,
            error: None,
            last_update: Utc::now(),
        }
    }

    #[test]
    fn row_summarises_job() {
        let row = PrinterRow::new(&printer(), false);
        assert_eq!(row.status, "printing");
        assert_eq!(row.nozzle, "219/220°C");
        assert_eq!(row.bed, "60°C");
        assert_eq!(row.job, "benchy.3mf");
        assert_eq!(row.progress, "42%");
        assert_eq!(row.remaining, "1h 5m");
    }

    #[test]
    fn idle_row_has_placeholders() {
        let mut p = printer();
        p.status = PrinterStatus::Idle;
        p.print = None;
        let row = PrinterRow::new(&p, false);
        assert_eq!(row.job, "-");
        assert_eq!(row.remaining, "-");
    }

    #[test]
    fn detail_lists_layers_and_connection() {
        let text = detail(&printer(), false);
        assert!(text.contains("Layers:     80/200"));
        assert!(text.contains("Connection: connected"));
        assert!(!text.contains("Error:"));
    }
}
