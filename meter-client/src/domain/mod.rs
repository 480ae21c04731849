pub mod billing;
pub mod chart;
pub mod profile;
pub mod telemetry;

pub use billing::{BillRecord, BillingSnapshot, PurchaseRequest};
pub use chart::ChartPoint;
pub use profile::Profile;
pub use telemetry::TelemetrySnapshot;

use serde_json::Value;

/// Read a numeric field leniently.
///
/// Absent, null, non-finite and non-numeric values are all "unknown". Numeric
/// strings are accepted because some meter firmwares report readings as text.
pub(crate) fn lenient_f64(value: Option<&Value>) -> Option<f64> {
    let n = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

pub(crate) fn lenient_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

pub(crate) fn lenient_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
