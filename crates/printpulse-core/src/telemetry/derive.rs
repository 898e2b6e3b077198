// ── Job, filament and fault derivation ──

use super::report::{PrintReport, TrayReport};
use crate::model::{FilamentInfo, PrintJob, PrinterFault, PrinterStatus};

/// `tray_now` value for the external spool holder.
const EXTERNAL_TRAY: i64 = 254;
/// `tray_now` value when nothing is loaded.
const NO_TRAY: i64 = 255;
const TRAYS_PER_UNIT: i64 = 4;

/// Build the job view, or `None` when no job is loaded.
///
/// `previous` supplies the total-time estimate for the time-based
/// progress fallback once the printer stops sending a percentage.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::as_conversions
)]
pub fn derive_job(
    report: &PrintReport,
    status: PrinterStatus,
    previous: Option<&PrintJob>,
) -> Option<PrintJob> {
    let percent = report.percent();
    let remaining_secs = report.remaining_minutes().saturating_mul(60);
    let layer = report.layer();
    let total_layers = report.total_layers();

    let has_job_data = report.remaining_minutes() > 0
        || layer > 0
        || percent > 0.0
        || report.print_real == Some(1);
    if !status.has_job() && !has_job_data {
        return None;
    }

    let estimated_total_time = if percent > 0.0 && percent < 100.0 && remaining_secs > 0 {
        Some((remaining_secs as f64 / (1.0 - percent / 100.0)).round() as i64)
    } else {
        None
    };

    let mut progress = 0.0;
    if percent > 0.0 && percent <= 100.0 {
        progress = percent;
    } else if layer > 0 && total_layers > 0 {
        progress = layer as f64 / total_layers as f64 * 100.0;
    } else if let Some(total) = previous.and_then(|job| job.estimated_total_time) {
        if total > 0 && remaining_secs > 0 {
            progress = (total - remaining_secs) as f64 / total as f64 * 100.0;
        }
    }

    let file_name = match report.job_name() {
        "" | "undefined" => "Unknown".to_owned(),
        name => name.to_owned(),
    };

    Some(PrintJob {
        progress: progress.clamp(0.0, 100.0),
        time_remaining: remaining_secs,
        estimated_total_time: estimated_total_time
            .or_else(|| previous.and_then(|job| job.estimated_total_time).filter(|_| remaining_secs > 0)),
        file_name,
        print_type: report.print_type.clone(),
        layer_current: clamp_i32(layer),
        layer_total: clamp_i32(total_layers),
        speed_level: report.spd_lvl.map(clamp_i32),
        fan_speed: report.fan_gear.map(clamp_i32),
        stage: report.stg_cur.map(clamp_i32),
        lifecycle: report.lifecycle.clone(),
    })
}

/// The spool feeding the extruder, from `ams.tray_now`.
pub fn derive_filament(report: &PrintReport) -> Option<FilamentInfo> {
    let ams = report.ams.as_ref()?;
    let tray_now = ams.tray_now?;

    let tray = match tray_now {
        NO_TRAY => return None,
        EXTERNAL_TRAY => report.vt_tray.as_ref()?,
        index if index >= 0 => {
            let unit_id = index / TRAYS_PER_UNIT;
            let slot = index % TRAYS_PER_UNIT;
            ams.units
                .iter()
                .find(|unit| unit.id == unit_id)?
                .trays
                .iter()
                .find(|tray| tray.id == Some(slot))?
        }
        _ => return None,
    };

    filament_from_tray(tray)
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn filament_from_tray(tray: &TrayReport) -> Option<FilamentInfo> {
    let kind = tray.tray_type.clone()?;
    let color = tray
        .tray_color
        .as_deref()
        .and_then(|hex| hex.get(..6))
        .map_or_else(|| "#000000".to_owned(), |rgb| format!("#{}", rgb.to_ascii_uppercase()));
    let remaining = tray.remain.map_or(0.0, |r| r.clamp(0, 100) as f64);

    Some(FilamentInfo {
        kind,
        color,
        remaining,
    })
}

/// The fault to show, if any.
///
/// Error codes produce a fault whatever the status; a bare Error status
/// still gets one so the record never shows Error without a reason.
pub fn derive_fault(report: &PrintReport, status: PrinterStatus) -> Option<PrinterFault> {
    let print_error = clamp_i32(report.error_flag());
    let error_code = clamp_i32(report.error_code());

    if print_error <= 0 && error_code <= 0 && status != PrinterStatus::Error {
        return None;
    }

    let gcode_state = report
        .gcode_state
        .clone()
        .unwrap_or_else(|| "Unknown".to_owned());
    let message = if print_error > 0 || error_code > 0 {
        fault_message(print_error, error_code)
    } else {
        format!("Printer reported failure (state {gcode_state}, stage {})", report.stage())
    };

    Some(PrinterFault {
        print_error,
        error_code,
        stage: clamp_i32(report.stage()),
        lifecycle: report
            .lifecycle
            .clone()
            .unwrap_or_else(|| "Unknown".to_owned()),
        gcode_state,
        message,
    })
}

/// Human-readable text for a fault code pair.
pub fn fault_message(print_error: i32, error_code: i32) -> String {
    match (print_error, error_code) {
        (_, 1203) => "Filament runout detected".to_owned(),
        (_, 1204) => "Filament tangle detected".to_owned(),
        (_, 1205) => "Nozzle clog detected".to_owned(),
        (1, _) => "Print error occurred".to_owned(),
        (2, _) => "Bed adhesion failure".to_owned(),
        (3, _) => "Temperature error".to_owned(),
        _ => format!("Error: print_error={print_error}, error_code={error_code}"),
    }
}

fn clamp_i32(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(if value < 0 { i32::MIN } else { i32::MAX })
}
