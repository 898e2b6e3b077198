// ── Report accumulation ──
//
// Printers push a full document on request and small deltas otherwise.
// The accumulated document is the deep merge of everything received.

use serde_json::Value;

/// `gcode_state` values that declare the job over. A push carrying one
/// of these is authoritative about zeroed progress fields. `IDLE` is not
/// among them: some firmware reports it mid-print.
const TERMINAL_STATES: &[&str] = &["FINISH", "FINISHED", "FAILED"];

/// Merge `incoming` into `base`, recursing through objects.
///
/// Non-object values replace. Within an object, three fields resist
/// being blanked by partial pushes unless the same push carries a
/// terminal `gcode_state`:
///
/// - `subtask_name`: empty never replaces a real name
/// - `mc_percent`: `0` never replaces a value strictly between 0 and 100
/// - `mc_remaining_time`: `0` never replaces a positive value
pub fn deep_merge(base: Value, incoming: Value) -> Value {
    match (base, incoming) {
        (Value::Object(mut base_map), Value::Object(incoming_map)) => {
            let terminal = incoming_map
                .get("gcode_state")
                .and_then(Value::as_str)
                .is_some_and(|state| TERMINAL_STATES.contains(&state));

            for (key, value) in incoming_map {
                match base_map.remove(&key) {
                    Some(existing) => {
                        if !terminal && should_preserve(&key, &existing, &value) {
                            base_map.insert(key, existing);
                        } else {
                            base_map.insert(key, deep_merge(existing, value));
                        }
                    }
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, incoming) => incoming,
    }
}

fn should_preserve(key: &str, existing: &Value, incoming: &Value) -> bool {
    match key {
        "subtask_name" => {
            incoming.as_str().unwrap_or_default().is_empty()
                && existing
                    .as_str()
                    .is_some_and(|name| is_real_job_name(name))
        }
        "mc_percent" => {
            is_zero(incoming) && existing.as_f64().is_some_and(|pct| pct > 0.0 && pct < 100.0)
        }
        "mc_remaining_time" => {
            is_zero(incoming) && existing.as_i64().is_some_and(|mins| mins > 0)
        }
        _ => false,
    }
}

fn is_zero(value: &Value) -> bool {
    value.as_f64().unwrap_or_default().abs() < f64::EPSILON
}

/// A job name worth keeping: not empty and not a firmware placeholder.
pub(crate) fn is_real_job_name(name: &str) -> bool {
    !name.is_empty() && name != "Unknown" && name != "undefined"
}
