// ── Telemetry interpretation ──
//
// Turns accumulated report documents into printer records. Pure
// functions only; the session task owns sequencing and side effects.

mod derive;
mod merge;
mod report;
mod status;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

pub use derive::{derive_fault, derive_filament, derive_job, fault_message};
pub use merge::deep_merge;
pub use report::{AmsReport, AmsUnitReport, Indicators, PrintReport, TrayReport};
pub use status::{accept_transition, infer_status};

use crate::model::{Printer, PrinterStatus};

/// Fold an accumulated report document into a printer record.
///
/// Afterwards `status == Error` holds exactly when `error` is set, and
/// `print` is only present while a job is loaded or job data remains.
pub fn apply_report(printer: &mut Printer, accumulated: &Value) {
    printer.last_update = Utc::now();

    let Some(report) = PrintReport::from_document(accumulated) else {
        return;
    };

    report.update_temperatures(&mut printer.temperatures);
    let indicators = Indicators::from_report(&report, &printer.temperatures);

    let previous = printer.status;
    let inferred = infer_status(&report, &indicators);
    if accept_transition(previous, inferred, &indicators) {
        if previous != inferred {
            info!(printer = %printer.id, from = %previous, to = %inferred, "status changed");
        }
        printer.status = inferred;
    } else {
        debug!(
            printer = %printer.id,
            kept = %previous,
            rejected = %inferred,
            "status transition held back"
        );
    }

    // Fault codes override whatever status inference settled on.
    if report.error_flag() > 0 || report.error_code() > 0 {
        printer.status = PrinterStatus::Error;
    }

    printer.print = derive_job(&report, printer.status, printer.print.as_ref());
    printer.filament = derive_filament(&report);
    printer.error = derive_fault(&report, printer.status);
}
