// ── Printer requests ──
//
// Every write to a printer is a JSON document published on
// `device/{serial}/request`. This module owns the payload shapes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::Error;

/// Topic the printer publishes its reports on.
pub fn report_topic(serial: &str) -> String {
    format!("device/{serial}/report")
}

/// Topic the printer accepts requests on.
pub fn request_topic(serial: &str) -> String {
    format!("device/{serial}/request")
}

/// Sequence id for a new request: wall-clock milliseconds.
///
/// Printers echo it back in their acknowledgement, nothing else reads it.
pub fn next_sequence_id() -> String {
    chrono::Utc::now().timestamp_millis().to_string()
}

/// Print speed profile.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SpeedLevel {
    Silent,
    Standard,
    Sport,
    Ludicrous,
}

impl SpeedLevel {
    /// Numeric level used on the wire (1-4).
    pub fn level(self) -> u8 {
        match self {
            Self::Silent => 1,
            Self::Standard => 2,
            Self::Sport => 3,
            Self::Ludicrous => 4,
        }
    }

    /// Parse the numeric wire level.
    pub fn from_level(level: i64) -> Option<Self> {
        match level {
            1 => Some(Self::Silent),
            2 => Some(Self::Standard),
            3 => Some(Self::Sport),
            4 => Some(Self::Ludicrous),
            _ => None,
        }
    }
}

/// A request that can be published to a printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterRequest {
    /// Ask for a full state push (`pushing.pushall`).
    PushAll,
    /// Ask for the current print status.
    GetStatus,
    Pause,
    Resume,
    Stop,
    SetSpeed(SpeedLevel),
    /// Chamber light on/off.
    SetLight { on: bool },
    /// Raw G-code line.
    GcodeLine(String),
}

impl PrinterRequest {
    /// Stable lowercase name, used in logs and by the CLI.
    pub fn action(&self) -> &'static str {
        match self {
            Self::PushAll => "pushall",
            Self::GetStatus => "get_status",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Stop => "stop",
            Self::SetSpeed(_) => "print_speed",
            Self::SetLight { .. } => "ledctrl",
            Self::GcodeLine(_) => "gcode_line",
        }
    }

    /// Build the JSON body for this request.
    pub fn to_payload(&self, sequence_id: &str) -> Value {
        match self {
            Self::PushAll => json!({
                "pushing": {
                    "sequence_id": sequence_id,
                    "command": "pushall"
                }
            }),

            Self::GetStatus | Self::Pause | Self::Resume | Self::Stop => json!({
                "print": {
                    "sequence_id": sequence_id,
                    "command": self.action()
                }
            }),

            Self::SetSpeed(level) => json!({
                "print": {
                    "sequence_id": sequence_id,
                    "command": "print_speed",
                    "param": level.level().to_string()
                }
            }),

            Self::SetLight { on } => json!({
                "system": {
                    "sequence_id": sequence_id,
                    "command": "ledctrl",
                    "led_node": "chamber_light",
                    "led_mode": if *on { "on" } else { "off" },
                    "led_on_time": 500,
                    "led_off_time": 500,
                    "loop_times": 0,
                    "interval_time": 0
                }
            }),

            Self::GcodeLine(gcode) => json!({
                "print": {
                    "sequence_id": sequence_id,
                    "command": "gcode_line",
                    "param": format!("{gcode}\n")
                }
            }),
        }
    }

    /// Serialize to the bytes that go on the wire.
    pub fn to_bytes(&self, sequence_id: &str) -> Vec<u8> {
        self.to_payload(sequence_id).to_string().into_bytes()
    }
}

impl fmt::Display for PrinterRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetSpeed(level) => write!(f, "print_speed({level})"),
            Self::SetLight { on } => write!(f, "ledctrl({})", if *on { "on" } else { "off" }),
            other => f.write_str(other.action()),
        }
    }
}

/// Parse the parameterless action names accepted by the printer.
impl FromStr for PrinterRequest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pushall" => Ok(Self::PushAll),
            "get_status" => Ok(Self::GetStatus),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            other => Err(Error::UnsupportedCommand(other.to_owned())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn topics_use_serial() {
        assert_eq!(report_topic("01S00A"), "device/01S00A/report");
        assert_eq!(request_topic("01S00A"), "device/01S00A/request");
    }

    #[test]
    fn push_all_uses_pushing_namespace() {
        let payload = PrinterRequest::PushAll.to_payload("7");
        assert_eq!(payload["pushing"]["command"], "pushall");
        assert_eq!(payload["pushing"]["sequence_id"], "7");
        assert!(payload.get("print").is_none());
    }

    #[test]
    fn job_control_commands_use_print_namespace() {
        for (req, name) in [
            (PrinterRequest::Pause, "pause"),
            (PrinterRequest::Resume, "resume"),
            (PrinterRequest::Stop, "stop"),
            (PrinterRequest::GetStatus, "get_status"),
        ] {
            let payload = req.to_payload("1");
            assert_eq!(payload["print"]["command"], name);
        }
    }

    #[test]
    fn speed_is_sent_as_numeric_string() {
        let payload = PrinterRequest::SetSpeed(SpeedLevel::Sport).to_payload("1");
        assert_eq!(payload["print"]["command"], "print_speed");
        assert_eq!(payload["print"]["param"], "3");
    }

    #[test]
    fn light_targets_chamber_node() {
        let payload = PrinterRequest::SetLight { on: false }.to_payload("1");
        assert_eq!(payload["system"]["led_node"], "chamber_light");
        assert_eq!(payload["system"]["led_mode"], "off");
    }

    #[test]
    fn gcode_line_is_newline_terminated() {
        let payload = PrinterRequest::GcodeLine("M104 S200".into()).to_payload("1");
        assert_eq!(payload["print"]["param"], "M104 S200\n");
    }

    #[test]
    fn parses_known_actions() {
        assert_eq!("pause".parse::<PrinterRequest>().unwrap(), PrinterRequest::Pause);
        assert_eq!(
            "get_status".parse::<PrinterRequest>().unwrap(),
            PrinterRequest::GetStatus
        );
    }

    #[test]
    fn rejects_unknown_action() {
        let err = "explode".parse::<PrinterRequest>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedCommand(ref a) if a == "explode"));
    }

    #[test]
    fn speed_level_round_trips_through_wire_number() {
        for level in 1..=4 {
            assert_eq!(SpeedLevel::from_level(level).unwrap().level(), u8::try_from(level).unwrap());
        }
        assert!(SpeedLevel::from_level(9).is_none());
        assert_eq!("sport".parse::<SpeedLevel>().unwrap(), SpeedLevel::Sport);
    }
}
