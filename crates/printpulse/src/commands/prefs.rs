//! Preference command handlers.
//!
//! Preferences live in the same SQLite file as printer state, so these
//! commands open the database directly instead of starting a monitor.

use tabled::Tabled;

use printpulse_core::{Database, Preference};

use crate::cli::{GlobalOpts, PrefsArgs, PrefsCommand};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct PreferenceRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

fn row(p: &Preference) -> PreferenceRow {
    PreferenceRow {
        key: p.key.clone(),
        value: p.value.clone(),
        updated: p.updated_at.clone(),
    }
}

pub fn handle(args: PrefsArgs, cfg: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let db = Database::open(&config::database_path(cfg))?;

    match args.command {
        PrefsCommand::List => {
            let prefs = db.list_preferences()?;
            let out = output::render_list(
                &global.output_format(),
                &prefs,
                row,
                |p| format!("{}={}", p.key, p.value),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        PrefsCommand::Get { key } => {
            let value = db.get_preference(&key)?.ok_or_else(|| CliError::Validation {
                field: "key".into(),
                reason: format!("no preference named '{key}'"),
            })?;
            output::print_output(&value, global.quiet);
            Ok(())
        }

        PrefsCommand::Set { key, value } => {
            db.set_preference(&key, &value)?;
            if !global.quiet {
                eprintln!("✓ Set {key}");
            }
            Ok(())
        }

        PrefsCommand::Unset { key } => {
            if db.delete_preference(&key)? {
                if !global.quiet {
                    eprintln!("✓ Removed {key}");
                }
            } else if !global.quiet {
                eprintln!("No preference named '{key}'");
            }
            Ok(())
        }
    }
}
