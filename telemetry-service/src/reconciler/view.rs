use meter_client::{format, BillingSnapshot, ChartPoint, TelemetrySnapshot};
use serde::Serialize;

/// The rendered dashboard. Every reading is pre-formatted; unknown values
/// carry the placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub meter_id: String,
    pub voltage: String,
    pub current: String,
    pub power: String,
    pub frequency: String,
    pub energy: String,
    pub power_factor: String,
    pub tamper: &'static str,
    pub theft: &'static str,
    pub tariff: f64,
    pub billing_amount: f64,
    pub units_purchased: String,
    pub remaining_units: String,
    pub alert_active: bool,
    pub chart: Vec<ChartPoint>,
}

impl DashboardView {
    pub fn render(
        telemetry: Option<&TelemetrySnapshot>,
        billing: Option<&BillingSnapshot>,
        remaining_units: f64,
        tariff: f64,
        alert_active: bool,
        chart: Vec<ChartPoint>,
    ) -> Self {
        let empty = TelemetrySnapshot::default();
        let t = telemetry.unwrap_or(&empty);

        Self {
            meter_id: t
                .meter_id
                .clone()
                .unwrap_or_else(|| format::PLACEHOLDER.to_string()),
            voltage: format::reading(t.voltage, "V"),
            current: format::reading(t.effective_current(), "A"),
            power: format::reading(t.power, "W"),
            frequency: format::reading(t.frequency, "Hz"),
            energy: format::reading(t.energy, "kWh"),
            power_factor: format::reading(t.power_factor, ""),
            tamper: format::flag(t.tamper_detected),
            theft: format::flag(t.theft_detected),
            tariff,
            billing_amount: billing.map_or(0.0, BillingSnapshot::amount_or_zero),
            units_purchased: format::units(billing.map_or(0.0, BillingSnapshot::units_or_zero)),
            remaining_units: format::units(remaining_units),
            alert_active,
            chart,
        }
    }
}
