//! Integration tests for the `printpulse` CLI binary.
//!
//! These tests cover argument parsing, config and preference handling, and
//! the monitor-backed commands against the simulated demo fleet. None of
//! them need a real printer.
#![allow(clippy::unwrap_used)]

use std::path::{Path, PathBuf};

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::TempDir;

// ── Helpers ─────────────────────────────────────────────────────────

/// An isolated home: config file and database live in a temp directory.
struct Sandbox {
    dir: TempDir,
}

impl Sandbox {
    fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn config_file(&self) -> PathBuf {
        self.dir.path().join("config").join("config.toml")
    }

    fn database(&self) -> PathBuf {
        self.dir.path().join("data").join("printpulse.db")
    }

    fn home(&self) -> &Path {
        self.dir.path()
    }

    /// Build a [`Command`] for the binary with env isolation.
    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("printpulse");
        cmd.env("HOME", self.home())
            .env("XDG_CONFIG_HOME", self.home().join("xdg-config"))
            .env("XDG_DATA_HOME", self.home().join("xdg-data"))
            .env("PRINTPULSE_CONFIG", self.config_file())
            .env("PRINTPULSE_MONITOR__DATABASE", self.database())
            .env("NO_COLOR", "1")
            .env_remove("PRINTPULSE_OUTPUT")
            .env_remove("PRINTPULSE_DEMO")
            .env_remove("PRINTPULSE_TIMEOUT")
            .env_remove("PRINTPULSE_ACCESS_CODE")
            .env_remove("RUST_LOG");
        cmd
    }
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let sandbox = Sandbox::new();
    let output = sandbox.cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    Sandbox::new().cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("printers")
            .and(predicate::str::contains("watch"))
            .and(predicate::str::contains("prefs"))
            .and(predicate::str::contains("--demo")),
    );
}

#[test]
fn test_version_flag() {
    Sandbox::new()
        .cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("printpulse"));
}

#[test]
fn test_invalid_subcommand() {
    let output = Sandbox::new().cmd().arg("foobar").output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("foobar"));
}

#[test]
fn test_invalid_speed_level() {
    Sandbox::new()
        .cmd()
        .args(["speed", "x1c-studio", "warp"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("ludicrous"));
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    Sandbox::new()
        .cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    Sandbox::new()
        .cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

// ── Config ──────────────────────────────────────────────────────────

#[test]
fn test_config_path_honours_override() {
    let sandbox = Sandbox::new();
    sandbox
        .cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_init_writes_defaults_once() {
    let sandbox = Sandbox::new();
    sandbox.cmd().args(["config", "init"]).assert().success();

    let text = std::fs::read_to_string(sandbox.config_file()).unwrap();
    assert!(text.contains("[defaults]"));
    assert!(text.contains("mode = \"live\""));

    sandbox
        .cmd()
        .args(["config", "init"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("already exists"));

    sandbox
        .cmd()
        .args(["config", "init", "--force"])
        .assert()
        .success();
}

#[test]
fn test_config_show_masks_access_codes() {
    let sandbox = Sandbox::new();
    std::fs::create_dir_all(sandbox.config_file().parent().unwrap()).unwrap();
    std::fs::write(
        sandbox.config_file(),
        r#"
[defaults]
timeout = 7

[printers.garage]
ip = "192.168.1.50"
serial = "01P00A000000001"
access_code = "12345678"
"#,
    )
    .unwrap();

    sandbox
        .cmd()
        .args(["config", "show", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"timeout\": 7")
                .and(predicate::str::contains("****"))
                .and(predicate::str::contains("12345678").not()),
        );
}

#[test]
fn test_broken_config_file_is_reported() {
    let sandbox = Sandbox::new();
    std::fs::create_dir_all(sandbox.config_file().parent().unwrap()).unwrap();
    std::fs::write(sandbox.config_file(), "[defaults\noutput = ").unwrap();

    sandbox
        .cmd()
        .args(["prefs", "list"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

// ── Preferences ─────────────────────────────────────────────────────

#[test]
fn test_prefs_lifecycle() {
    let sandbox = Sandbox::new();

    sandbox
        .cmd()
        .args(["prefs", "set", "theme", "dark"])
        .assert()
        .success();
    sandbox
        .cmd()
        .args(["prefs", "set", "view", "grid"])
        .assert()
        .success();

    sandbox
        .cmd()
        .args(["prefs", "get", "theme"])
        .assert()
        .success()
        .stdout("dark\n");

    sandbox
        .cmd()
        .args(["prefs", "list", "-o", "plain"])
        .assert()
        .success()
        .stdout("theme=dark\nview=grid\n");

    sandbox
        .cmd()
        .args(["prefs", "unset", "theme"])
        .assert()
        .success();
    sandbox.cmd().args(["prefs", "get", "theme"]).assert().code(2);

    assert!(sandbox.database().exists());
}

#[test]
fn test_prefs_reject_empty_key() {
    Sandbox::new()
        .cmd()
        .args(["prefs", "set", "", "x"])
        .assert()
        .code(2);
}

// ── Printers (live mode, no printers registered) ────────────────────

#[test]
fn test_empty_fleet_lists_nothing() {
    Sandbox::new()
        .cmd()
        .args(["printers", "list", "-o", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_cached_list_reads_database_only() {
    Sandbox::new()
        .cmd()
        .args(["printers", "list", "--cached", "-o", "plain"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_cached_list_needs_no_access_codes() {
    let sandbox = Sandbox::new();
    std::fs::create_dir_all(sandbox.config_file().parent().unwrap()).unwrap();
    std::fs::write(
        sandbox.config_file(),
        r#"
[printers.garage]
ip = "192.168.1.50"
serial = "01P00A000000001"
access_code_env = "PRINTPULSE_TEST_UNSET_CODE"
"#,
    )
    .unwrap();

    sandbox
        .cmd()
        .env_remove("PRINTPULSE_TEST_UNSET_CODE")
        .args(["printers", "list", "--cached", "-o", "plain"])
        .assert()
        .success();
}

#[test]
fn test_add_requires_fields_when_not_interactive() {
    Sandbox::new()
        .cmd()
        .args(["printers", "add", "--id", "garage", "--serial", "S1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--ip"));
}

#[test]
fn test_remove_needs_confirmation_without_terminal() {
    Sandbox::new()
        .cmd()
        .args(["printers", "remove", "garage"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_remove_unknown_printer() {
    Sandbox::new()
        .cmd()
        .args(["printers", "remove", "garage", "--yes"])
        .assert()
        .code(4);
}

// ── Demo fleet ──────────────────────────────────────────────────────

#[test]
fn test_demo_fleet_listing() {
    Sandbox::new()
        .cmd()
        .args(["--demo", "printers", "list", "-o", "plain"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("x1c-studio")
                .and(predicate::str::contains("p1s-garage"))
                .and(predicate::str::contains("a1-mini-desk")),
        );
}

#[test]
fn test_demo_printer_detail_as_json() {
    Sandbox::new()
        .cmd()
        .args(["--demo", "printers", "get", "p1s-garage", "-o", "json"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("\"id\": \"p1s-garage\"")
                .and(predicate::str::contains("\"connection_state\": \"connected\"")),
        );
}

#[test]
fn test_demo_unknown_printer() {
    Sandbox::new()
        .cmd()
        .args(["--demo", "printers", "get", "nope"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_demo_cached_is_rejected() {
    Sandbox::new()
        .cmd()
        .args(["--demo", "printers", "list", "--cached"])
        .assert()
        .code(2);
}

#[test]
fn test_demo_light_command() {
    Sandbox::new()
        .cmd()
        .args(["--demo", "light", "a1-mini-desk", "on"])
        .assert()
        .success()
        .stderr(predicate::str::contains("Sent set light"));
}

#[test]
fn test_demo_multiline_gcode_is_rejected() {
    Sandbox::new()
        .cmd()
        .args(["--demo", "gcode", "x1c-studio", "G28\nM104 S200"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("single non-empty line"));
}

#[test]
fn test_demo_stop_requires_yes() {
    Sandbox::new()
        .cmd()
        .args(["--demo", "stop", "x1c-studio"])
        .assert()
        .code(2);
}

#[test]
fn test_demo_add_registers_simulated_printer() {
    Sandbox::new()
        .cmd()
        .args([
            "--demo",
            "printers",
            "add",
            "--id",
            "bench",
            "--ip",
            "10.0.0.9",
            "--serial",
            "SIM0000000009",
            "--access-code",
            "12345678",
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("Registered 'bench'"));
}

#[test]
fn test_demo_add_rejects_duplicate_id() {
    Sandbox::new()
        .cmd()
        .args([
            "--demo",
            "printers",
            "add",
            "--id",
            "x1c-studio",
            "--ip",
            "10.0.0.9",
            "--serial",
            "SIM0000000009",
            "--access-code",
            "12345678",
        ])
        .assert()
        .code(6);
}
