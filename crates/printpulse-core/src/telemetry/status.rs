// ── Status inference ──
//
// `gcode_state` alone is unreliable: P1-series firmware reports IDLE
// mid-print and omits the field from deltas. The accumulated report is
// read in a fixed priority order, falling back to physical indicators.

use tracing::debug;

use super::report::{Indicators, PrintReport};
use crate::model::PrinterStatus;

/// Infer the printer status from an accumulated report.
///
/// Priority: fault flag, `print_real`, `gcode_state`, then indicators.
pub fn infer_status(report: &PrintReport, indicators: &Indicators) -> PrinterStatus {
    if report.error_flag() > 0 {
        return PrinterStatus::Error;
    }
    if indicators.print_real {
        return PrinterStatus::Printing;
    }

    match report.gcode_state.as_deref() {
        Some("RUNNING" | "PRINTING" | "PREPARE" | "WORKING" | "SLICING" | "PRINTING_MONITOR") => {
            PrinterStatus::Printing
        }
        Some("PAUSE" | "PAUSED") => PrinterStatus::Paused,
        Some("FAILED" | "ERROR") => PrinterStatus::Error,
        Some("FINISH" | "FINISHED") => PrinterStatus::Idle,
        Some("IDLE") => {
            if indicators.active_job
                || indicators.progress
                || (indicators.high_temps && indicators.active_fan)
            {
                PrinterStatus::Printing
            } else {
                PrinterStatus::Idle
            }
        }
        Some(other) => {
            debug!(gcode_state = other, "unknown gcode_state, using indicators");
            from_indicators(report, indicators)
        }
        None => from_indicators(report, indicators),
    }
}

/// Fallback chain when `gcode_state` says nothing useful.
fn from_indicators(report: &PrintReport, ind: &Indicators) -> PrinterStatus {
    let stage = report.stage();

    if ind.active_job && (ind.progress || ind.print_stage) {
        PrinterStatus::Printing
    } else if ind.print_stage && stage == 2 {
        PrinterStatus::Paused
    } else if ind.print_stage && stage == 3 {
        PrinterStatus::Error
    } else if (ind.high_temps && ind.active_job && (ind.active_fan || ind.job_name))
        || (ind.hot_nozzle && ind.active_fan && (ind.job_name || ind.progress))
        || (ind.job_name && ind.progress)
        || (report.remaining_minutes() > 0 && report.layer() > 0)
        || (ind.high_temps && ind.active_fan)
    {
        PrinterStatus::Printing
    } else {
        PrinterStatus::Idle
    }
}

/// Hysteresis between consecutive inferred statuses.
///
/// Moves involving Error, Offline or Connecting always pass. Idle to
/// Printing needs real job evidence; Printing to Idle needs completion
/// evidence, so a sparse delta cannot flap a running print.
pub fn accept_transition(
    previous: PrinterStatus,
    next: PrinterStatus,
    indicators: &Indicators,
) -> bool {
    use PrinterStatus::{Connecting, Error, Idle, Offline, Printing};

    match (previous, next) {
        (Error | Offline | Connecting, _) | (_, Error | Offline | Connecting) => true,
        (Idle, Printing) => {
            indicators.any_job_activity() || (indicators.high_temps && indicators.active_fan)
        }
        (Printing, Idle) => {
            indicators.complete
                || (!indicators.high_temps && !indicators.active_fan && !indicators.active_job)
        }
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Temperatures;
    use serde_json::{Value, json};

    fn hot() -> Temperatures {
        Temperatures {
            nozzle: 220,
            bed: 60,
            ..Temperatures::default()
        }
    }

    fn infer(print: &Value, temps: &Temperatures) -> PrinterStatus {
        let report = PrintReport::from_print(print);
        let ind = Indicators::from_report(&report, temps);
        infer_status(&report, &ind)
    }

    #[test]
    fn fault_flag_wins_over_everything() {
        let status = infer(
            &json!({"print_error": 1, "print_real": 1, "gcode_state": "RUNNING"}),
            &hot(),
        );
        assert_eq!(status, PrinterStatus::Error);
    }

    #[test]
    fn print_real_beats_gcode_state() {
        let status = infer(&json!({"print_real": 1, "gcode_state": "FINISH"}), &hot());
        assert_eq!(status, PrinterStatus::Printing);
    }

    #[test]
    fn gcode_state_table() {
        let cool = Temperatures::default();
        for (state, expected) in [
            ("RUNNING", PrinterStatus::Printing),
            ("PREPARE", PrinterStatus::Printing),
            ("SLICING", PrinterStatus::Printing),
            ("PAUSE", PrinterStatus::Paused),
            ("PAUSED", PrinterStatus::Paused),
            ("FAILED", PrinterStatus::Error),
            ("FINISH", PrinterStatus::Idle),
            ("IDLE", PrinterStatus::Idle),
        ] {
            assert_eq!(infer(&json!({"gcode_state": state}), &cool), expected, "{state}");
        }
    }

    #[test]
    fn idle_with_live_job_is_printing() {
        let status = infer(
            &json!({"gcode_state": "IDLE", "mc_remaining_time": 20}),
            &Temperatures::default(),
        );
        assert_eq!(status, PrinterStatus::Printing);
    }

    #[test]
    fn idle_hot_with_fan_is_printing() {
        let status = infer(&json!({"gcode_state": "IDLE", "fan_gear": 8}), &hot());
        assert_eq!(status, PrinterStatus::Printing);
    }

    #[test]
    fn fallback_chain_without_gcode_state() {
        let cool = Temperatures::default();
        assert_eq!(
            infer(&json!({"mc_remaining_time": 10, "stg_cur": 1}), &cool),
            PrinterStatus::Printing
        );
        assert_eq!(infer(&json!({"stg_cur": 2}), &cool), PrinterStatus::Paused);
        assert_eq!(infer(&json!({"stg_cur": 3}), &cool), PrinterStatus::Error);
        assert_eq!(
            infer(&json!({"subtask_name": "benchy", "mc_percent": 30}), &cool),
            PrinterStatus::Printing
        );
        assert_eq!(infer(&json!({"fan_gear": 5}), &hot()), PrinterStatus::Printing);
        assert_eq!(infer(&json!({}), &cool), PrinterStatus::Idle);
    }

    #[test]
    fn unknown_gcode_state_uses_fallback() {
        let status = infer(&json!({"gcode_state": "CALIBRATING", "stg_cur": 2}), &Temperatures::default());
        assert_eq!(status, PrinterStatus::Paused);
    }

    #[test]
    fn idle_to_printing_requires_evidence() {
        let none = Indicators::default();
        assert!(!accept_transition(PrinterStatus::Idle, PrinterStatus::Printing, &none));

        let job = Indicators {
            active_job: true,
            ..Indicators::default()
        };
        assert!(accept_transition(PrinterStatus::Idle, PrinterStatus::Printing, &job));
    }

    #[test]
    fn printing_to_idle_requires_completion() {
        let running = Indicators {
            active_job: true,
            high_temps: true,
            active_fan: true,
            ..Indicators::default()
        };
        assert!(!accept_transition(PrinterStatus::Printing, PrinterStatus::Idle, &running));

        let done = Indicators {
            complete: true,
            ..running
        };
        assert!(accept_transition(PrinterStatus::Printing, PrinterStatus::Idle, &done));

        let cold = Indicators::default();
        assert!(accept_transition(PrinterStatus::Printing, PrinterStatus::Idle, &cold));
    }

    #[test]
    fn error_offline_connecting_always_pass() {
        let none = Indicators::default();
        for (from, to) in [
            (PrinterStatus::Printing, PrinterStatus::Error),
            (PrinterStatus::Error, PrinterStatus::Idle),
            (PrinterStatus::Offline, PrinterStatus::Printing),
            (PrinterStatus::Connecting, PrinterStatus::Printing),
            (PrinterStatus::Paused, PrinterStatus::Offline),
        ] {
            assert!(accept_transition(from, to, &none), "{from} -> {to}");
        }
        assert!(accept_transition(PrinterStatus::Printing, PrinterStatus::Paused, &none));
    }
}
