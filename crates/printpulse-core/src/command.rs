// ── Command API ──
//
// Every write to a printer flows through `Command`. Commands are checked
// against the printer record before they reach the wire.

use printpulse_api::{PrinterRequest, SpeedLevel};

use crate::error::CoreError;
use crate::model::{Printer, PrinterStatus};

/// All operations a consumer can request on a printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Pause,
    Resume,
    Stop,
    /// Ask for a status push.
    RequestStatus,
    /// Ask for a full state push.
    PushAll,
    SetSpeed(SpeedLevel),
    /// Chamber light on/off.
    SetLight(bool),
    /// One raw G-code line.
    Gcode(String),
}

impl Command {
    /// Stable lowercase name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::RequestStatus => "request status",
            Self::PushAll => "push all",
            Self::SetSpeed(_) => "set speed",
            Self::SetLight(_) => "set light",
            Self::Gcode(_) => "send gcode",
        }
    }

    /// Whether the printer's current state admits this command.
    ///
    /// A faulted printer that still holds its job (filament runout parks
    /// the job in `PAUSE` with an error attached) can be stopped, and
    /// resumed once the fault was raised from a paused job.
    pub fn allowed_on(&self, printer: &Printer) -> bool {
        let status = printer.status;
        match self {
            Self::Pause => status.has_job(),
            Self::Stop => status.has_job() || printer.print.is_some(),
            Self::Resume => {
                status == PrinterStatus::Paused
                    || (status == PrinterStatus::Error
                        && printer
                            .error
                            .as_ref()
                            .is_some_and(|fault| fault.gcode_state == "PAUSE"))
            }
            _ => true,
        }
    }

    /// Check the command against the current record.
    pub fn validate(&self, printer: &Printer) -> Result<(), CoreError> {
        if !printer.is_commandable() {
            return Err(CoreError::PrinterOffline {
                id: printer.id.clone(),
            });
        }

        if !self.allowed_on(printer) {
            return Err(CoreError::InvalidState {
                id: printer.id.clone(),
                action: self.name().to_owned(),
                status: printer.status.to_string(),
            });
        }

        if let Self::Gcode(line) = self {
            if line.trim().is_empty() || line.contains('\n') {
                return Err(CoreError::ValidationFailed {
                    message: "gcode must be a single non-empty line".into(),
                });
            }
        }

        Ok(())
    }

    /// The wire request this command maps onto.
    pub fn to_request(&self) -> PrinterRequest {
        match self {
            Self::Pause => PrinterRequest::Pause,
            Self::Resume => PrinterRequest::Resume,
            Self::Stop => PrinterRequest::Stop,
            Self::RequestStatus => PrinterRequest::GetStatus,
            Self::PushAll => PrinterRequest::PushAll,
            Self::SetSpeed(level) => PrinterRequest::SetSpeed(*level),
            Self::SetLight(on) => PrinterRequest::SetLight { on: *on },
            Self::Gcode(line) => PrinterRequest::GcodeLine(line.trim().to_owned()),
        }
    }
}
