//! Config subcommand handlers.

use std::io::IsTerminal;

use dialoguer::{Confirm, Input, Select};
use secrecy::SecretString;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config::{self, Config, PrinterEntry};
use crate::error::CliError;
use crate::output;

use super::util::prompt_err;

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => init(force, global),

        ConfigCommand::Show => {
            let view = redacted(cfg)?;
            let out = output::render_single(
                &global.output_format(),
                &view,
                |v| output::render_yaml(v).trim_end().to_owned(),
                |_| config::config_path().display().to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path().display());
            Ok(())
        }

        ConfigCommand::SetAccessCode { printer } => {
            if !cfg.printers.contains_key(&printer) {
                return Err(CliError::NotFound { id: printer });
            }
            let code = rpassword::prompt_password("Access code: ").map_err(prompt_err)?;
            if code.is_empty() {
                return Err(CliError::Validation {
                    field: "access_code".into(),
                    reason: "value cannot be empty".into(),
                });
            }
            printpulse_config::store_access_code(&printer, &SecretString::from(code))?;
            eprintln!("✓ Access code stored in system keyring for '{printer}'");
            Ok(())
        }
    }
}

/// The config as JSON with plaintext access codes masked.
fn redacted(cfg: &Config) -> Result<serde_json::Value, CliError> {
    let mut view =
        serde_json::to_value(cfg).map_err(|e| CliError::Internal(format!("config view: {e}")))?;
    if let Some(printers) = view.get_mut("printers").and_then(|p| p.as_object_mut()) {
        for entry in printers.values_mut() {
            if let Some(code) = entry.get_mut("access_code") {
                *code = serde_json::Value::from("****");
            }
        }
    }
    Ok(view)
}

// ── Init: interactive wizard ────────────────────────────────────────

fn init(force: bool, global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path();
    if path.exists() && !force {
        return Err(CliError::ConfigExists {
            path: path.display().to_string(),
        });
    }

    let mut cfg = Config::default();

    if std::io::stdin().is_terminal() {
        eprintln!("printpulse configuration wizard");
        eprintln!("   Config path: {}\n", path.display());

        let modes = &["Live printers on my network", "Simulated demo fleet"];
        let mode = Select::new()
            .with_prompt("What should printpulse monitor?")
            .items(modes)
            .default(0)
            .interact()
            .map_err(prompt_err)?;
        if mode == 1 {
            cfg.monitor.mode = "demo".into();
        } else if Confirm::new()
            .with_prompt("Add a printer now?")
            .default(true)
            .interact()
            .map_err(prompt_err)?
        {
            let (id, entry) = prompt_printer()?;
            cfg.printers.insert(id, entry);
        }
    }

    config::save_config(&cfg)?;

    if !global.quiet {
        eprintln!("✓ Configuration written to {}", path.display());
        eprintln!("  Database: {}", config::database_path(&cfg).display());
        eprintln!("\n  Try it: printpulse printers list");
    }
    Ok(())
}

fn prompt_printer() -> Result<(String, PrinterEntry), CliError> {
    let id: String = Input::new()
        .with_prompt("Printer ID")
        .default("printer".into())
        .interact_text()
        .map_err(prompt_err)?;
    let mut entry = PrinterEntry {
        name: Input::new()
            .with_prompt("Display name")
            .default(id.clone())
            .interact_text()
            .map_err(prompt_err)?,
        model: Input::new()
            .with_prompt("Model")
            .default("P1S".into())
            .interact_text()
            .map_err(prompt_err)?,
        ip: Input::new()
            .with_prompt("IP address")
            .interact_text()
            .map_err(prompt_err)?,
        serial: Input::new()
            .with_prompt("Serial number")
            .interact_text()
            .map_err(prompt_err)?,
        ..PrinterEntry::default()
    };

    let code = rpassword::prompt_password("Access code: ").map_err(prompt_err)?;
    if code.is_empty() {
        return Err(CliError::Validation {
            field: "access_code".into(),
            reason: "access code cannot be empty".into(),
        });
    }

    let store_choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let store = Select::new()
        .with_prompt("Where to store the access code?")
        .items(store_choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    if store == 0 {
        printpulse_config::store_access_code(&id, &SecretString::from(code))?;
        eprintln!("   ✓ Access code stored in system keyring");
    } else {
        entry.access_code = Some(code);
    }

    Ok((id, entry))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn show_masks_plaintext_codes() {
        let mut cfg = Config::default();
        cfg.printers.insert(
            "garage".into(),
            PrinterEntry {
                ip: "192.168.1.50".into(),
                serial: "01P00A000000001".into(),
                access_code: Some("12345678".into()),
                ..PrinterEntry::default()
            },
        );

        let view = redacted(&cfg).unwrap();
        assert_eq!(view["printers"]["garage"]["access_code"], "****");
        assert_eq!(view["printers"]["garage"]["ip"], "192.168.1.50");
        assert_eq!(view["defaults"]["output"], "table");
    }
}
