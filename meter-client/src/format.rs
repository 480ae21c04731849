//! Display formatting for dashboard readings.
//!
//! Unknown readings always render as [`PLACEHOLDER`]; nothing here can produce
//! `"NaN"` or panic on odd input.

pub const PLACEHOLDER: &str = "-";

/// `"<value> <unit>"`, or the placeholder when the value is unknown or not finite.
pub fn reading(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if v.is_finite() => {
            if unit.is_empty() {
                v.to_string()
            } else {
                format!("{v} {unit}")
            }
        }
        _ => PLACEHOLDER.to_string(),
    }
}

pub fn flag(detected: bool) -> &'static str {
    if detected {
        "Detected"
    } else {
        "Safe"
    }
}

/// Two-decimal rendering for unit balances. Non-finite input renders as zero.
pub fn units(value: f64) -> String {
    let value = if value.is_finite() { value } else { 0.0 };
    format!("{value:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_readings_render_placeholder() {
        assert_eq!(reading(None, "V"), "-");
        assert_eq!(reading(Some(f64::NAN), "V"), "-");
        assert_eq!(reading(Some(f64::INFINITY), "W"), "-");
    }

    #[test]
    fn known_readings_render_with_unit() {
        assert_eq!(reading(Some(231.4), "V"), "231.4 V");
        assert_eq!(reading(Some(4.0), "kWh"), "4 kWh");
        assert_eq!(reading(Some(0.0), "A"), "0 A");
        assert_eq!(reading(Some(0.98), ""), "0.98");
    }

    #[test]
    fn flags_and_units() {
        assert_eq!(flag(true), "Detected");
        assert_eq!(flag(false), "Safe");
        assert_eq!(units(5.97), "5.97");
        assert_eq!(units(6.0), "6.00");
        assert_eq!(units(f64::NAN), "0.00");
    }
}
