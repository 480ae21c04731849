use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{lenient_bool, lenient_f64, lenient_string};

/// Latest polled meter reading.
///
/// Every numeric field is optional: the stats backend forwards whatever the
/// meter last reported, and a missing or garbled reading is "unknown", never zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub meter_id: Option<String>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    /// Current measured by the clamp transformer, used when `current` is unknown.
    pub ct_current: Option<f64>,
    pub power: Option<f64>,
    pub frequency: Option<f64>,
    /// Cumulative energy in kWh.
    pub energy: Option<f64>,
    pub power_factor: Option<f64>,
    pub tamper_detected: bool,
    pub theft_detected: bool,
}

impl TelemetrySnapshot {
    /// Decode a stats record field by field. Never fails.
    pub fn from_value(value: &Value) -> Self {
        let field = |name: &str| value.get(name);

        Self {
            meter_id: lenient_string(field("meter_id").or_else(|| field("meterId"))),
            voltage: lenient_f64(field("voltage")),
            current: lenient_f64(field("current")),
            ct_current: lenient_f64(field("ct_current")),
            power: lenient_f64(field("power")),
            frequency: lenient_f64(field("frequency")),
            energy: lenient_f64(field("energy")),
            power_factor: lenient_f64(field("power_factor")),
            tamper_detected: lenient_bool(field("tamper_detected")),
            theft_detected: lenient_bool(field("theft_detected")),
        }
    }

    /// Line current, falling back to the CT reading.
    pub fn effective_current(&self) -> Option<f64> {
        self.current.or(self.ct_current)
    }
}

impl<'de> Deserialize<'de> for TelemetrySnapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_record() {
        // language=json
        let body = r#"{
            "meter_id": "SM-0042",
            "voltage": 231.4,
            "current": 1.25,
            "power": 289.2,
            "frequency": 50.01,
            "energy": 4.0,
            "power_factor": 0.98,
            "tamper_detected": false,
            "theft_detected": true
        }"#;
        let snapshot: TelemetrySnapshot = serde_json::from_str(body).unwrap();
        assert_eq!(snapshot.meter_id.as_deref(), Some("SM-0042"));
        assert_eq!(snapshot.energy, Some(4.0));
        assert!(snapshot.theft_detected);
        assert!(!snapshot.tamper_detected);
    }

    #[test]
    fn partial_record_leaves_fields_unknown() {
        let body = r#"{"voltage": "NaN", "energy": null, "current": "oops", "ct_current": 0.7}"#;
        let snapshot: TelemetrySnapshot = serde_json::from_str(body).unwrap();
        assert_eq!(snapshot.voltage, None);
        assert_eq!(snapshot.energy, None);
        assert_eq!(snapshot.current, None);
        assert_eq!(snapshot.effective_current(), Some(0.7));
        assert_eq!(snapshot.meter_id, None);
        assert!(!snapshot.theft_detected);
    }

    #[test]
    fn non_object_record_is_all_unknown() {
        let snapshot: TelemetrySnapshot = serde_json::from_str("[]").unwrap();
        assert_eq!(snapshot, TelemetrySnapshot::default());
    }

    #[test]
    fn numeric_meter_id_is_stringified() {
        let snapshot: TelemetrySnapshot = serde_json::from_str(r#"{"meter_id": 1017}"#).unwrap();
        assert_eq!(snapshot.meter_id.as_deref(), Some("1017"));
    }
}
