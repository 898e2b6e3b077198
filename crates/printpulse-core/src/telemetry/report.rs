// ── Typed view of the accumulated `print` object ──
//
// Firmware versions disagree on whether numbers arrive as JSON numbers
// or numeric strings, so every field is read leniently and a malformed
// field only loses itself.

use serde_json::Value;

use super::merge::is_real_job_name;
use crate::model::Temperatures;

/// Nozzle above this counts as heated.
const HOT_NOZZLE: i32 = 150;
/// Bed above this counts as heated.
const HOT_BED: i32 = 40;

/// One spool slot, from an AMS unit or the external holder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrayReport {
    pub id: Option<i64>,
    pub tray_type: Option<String>,
    /// `RRGGBBAA` hex as sent by the printer.
    pub tray_color: Option<String>,
    /// Percent left; negative when unknown.
    pub remain: Option<i64>,
}

/// One AMS unit with up to four trays.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmsUnitReport {
    pub id: i64,
    pub trays: Vec<TrayReport>,
}

/// The `ams` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AmsReport {
    pub units: Vec<AmsUnitReport>,
    /// Global tray index: `unit * 4 + slot`, 254 external, 255 none.
    pub tray_now: Option<i64>,
}

/// Every field the monitor reads from a report. All optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrintReport {
    pub nozzle_temper: Option<f64>,
    pub nozzle_target_temper: Option<f64>,
    pub bed_temper: Option<f64>,
    pub bed_target_temper: Option<f64>,
    pub chamber_temper: Option<f64>,
    pub gcode_state: Option<String>,
    pub print_real: Option<i64>,
    pub mc_percent: Option<f64>,
    /// Minutes.
    pub mc_remaining_time: Option<i64>,
    pub layer_num: Option<i64>,
    pub total_layer_num: Option<i64>,
    pub stg_cur: Option<i64>,
    pub print_error: Option<i64>,
    pub mc_print_error_code: Option<i64>,
    pub fan_gear: Option<i64>,
    pub spd_lvl: Option<i64>,
    pub subtask_name: Option<String>,
    pub print_type: Option<String>,
    pub lifecycle: Option<String>,
    pub ams: Option<AmsReport>,
    pub vt_tray: Option<TrayReport>,
}

impl PrintReport {
    /// Read the `print` object of an accumulated report document.
    pub fn from_document(document: &Value) -> Option<Self> {
        document
            .get("print")
            .filter(|print| print.is_object())
            .map(Self::from_print)
    }

    /// Read a `print` object directly.
    pub fn from_print(print: &Value) -> Self {
        Self {
            nozzle_temper: float(print, "nozzle_temper"),
            nozzle_target_temper: float(print, "nozzle_target_temper"),
            bed_temper: float(print, "bed_temper"),
            bed_target_temper: float(print, "bed_target_temper"),
            chamber_temper: float(print, "chamber_temper"),
            gcode_state: text(print, "gcode_state"),
            print_real: int(print, "print_real"),
            mc_percent: float(print, "mc_percent"),
            mc_remaining_time: int(print, "mc_remaining_time"),
            layer_num: int(print, "layer_num"),
            total_layer_num: int(print, "total_layer_num"),
            stg_cur: int(print, "stg_cur"),
            print_error: int(print, "print_error"),
            mc_print_error_code: int(print, "mc_print_error_code"),
            fan_gear: int(print, "fan_gear"),
            spd_lvl: int(print, "spd_lvl"),
            subtask_name: text(print, "subtask_name"),
            print_type: text(print, "print_type"),
            lifecycle: text(print, "lifecycle"),
            ams: print.get("ams").map(ams),
            vt_tray: print.get("vt_tray").map(tray),
        }
    }

    pub fn percent(&self) -> f64 {
        self.mc_percent.unwrap_or_default()
    }

    pub fn remaining_minutes(&self) -> i64 {
        self.mc_remaining_time.unwrap_or_default()
    }

    pub fn layer(&self) -> i64 {
        self.layer_num.unwrap_or_default()
    }

    pub fn total_layers(&self) -> i64 {
        self.total_layer_num.unwrap_or_default()
    }

    pub fn stage(&self) -> i64 {
        self.stg_cur.unwrap_or_default()
    }

    pub fn error_flag(&self) -> i64 {
        self.print_error.unwrap_or_default()
    }

    pub fn error_code(&self) -> i64 {
        self.mc_print_error_code.unwrap_or_default()
    }

    pub fn job_name(&self) -> &str {
        self.subtask_name.as_deref().unwrap_or_default()
    }

    /// Fold reported temperatures into `temps`, keeping absent readings.
    pub fn update_temperatures(&self, temps: &mut Temperatures) {
        if let Some(t) = self.nozzle_temper {
            temps.nozzle = round_i32(t);
        }
        if let Some(t) = self.bed_temper {
            temps.bed = round_i32(t);
        }
        if let Some(t) = self.chamber_temper {
            temps.chamber = round_i32(t);
        }
        if let Some(t) = self.nozzle_target_temper {
            temps.nozzle_target = Some(round_i32(t));
        }
        if let Some(t) = self.bed_target_temper {
            temps.bed_target = Some(round_i32(t));
        }
    }
}

// ── Indicators ───────────────────────────────────────────────────────

/// Derived evidence used by status inference and transition checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Indicators {
    /// Time left, or layers printed short of 100%.
    pub active_job: bool,
    /// Progress strictly between 0 and 100.
    pub progress: bool,
    pub job_name: bool,
    pub high_temps: bool,
    pub hot_nozzle: bool,
    pub active_fan: bool,
    /// `stg_cur` is 1, 2 or 3.
    pub print_stage: bool,
    pub print_real: bool,
    /// Evidence the job has ended.
    pub complete: bool,
}

impl Indicators {
    pub fn from_report(report: &PrintReport, temps: &Temperatures) -> Self {
        let percent = report.percent();
        let remaining = report.remaining_minutes();
        let layer = report.layer();

        Self {
            active_job: remaining > 0 || (layer > 0 && percent < 100.0),
            progress: percent > 0.0 && percent < 100.0,
            job_name: is_real_job_name(report.job_name()),
            high_temps: temps.nozzle > HOT_NOZZLE || temps.bed > HOT_BED,
            hot_nozzle: temps.nozzle > 200,
            active_fan: report.fan_gear.unwrap_or_default() > 0,
            print_stage: matches!(report.stage(), 1..=3),
            print_real: report.print_real == Some(1),
            complete: percent >= 100.0 || (remaining == 0 && layer == 0),
        }
    }

    /// Any sign that a job is loaded.
    pub fn any_job_activity(self) -> bool {
        self.active_job || self.progress || self.print_real
    }
}

// ── Lenient field readers ────────────────────────────────────────────

fn float(obj: &Value, key: &str) -> Option<f64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn int(obj: &Value, key: &str) -> Option<i64> {
    match obj.get(key)? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(obj: &Value, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(str::to_owned)
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn round_i32(value: f64) -> i32 {
    value.round() as i32
}

fn tray(value: &Value) -> TrayReport {
    TrayReport {
        id: int(value, "id"),
        tray_type: text(value, "tray_type").filter(|t| !t.is_empty()),
        tray_color: text(value, "tray_color").filter(|c| !c.is_empty()),
        remain: int(value, "remain"),
    }
}

fn ams(value: &Value) -> AmsReport {
    let units = value
        .get("ams")
        .and_then(Value::as_array)
        .map(|units| {
            units
                .iter()
                .map(|unit| AmsUnitReport {
                    id: int(unit, "id").unwrap_or_default(),
                    trays: unit
                        .get("tray")
                        .and_then(Value::as_array)
                        .map(|trays| trays.iter().map(tray).collect())
                        .unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();

    AmsReport {
        units,
        tray_now: int(value, "tray_now"),
    }
}
