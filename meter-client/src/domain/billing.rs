use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::{macros::format_description, OffsetDateTime};

use super::{lenient_f64, lenient_string};

/// The most recent purchase as reported by `GET billing/latest`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillingSnapshot {
    /// Units purchased, in kWh.
    pub units: Option<f64>,
    pub amount: Option<f64>,
    pub date: Option<String>,
}

impl BillingSnapshot {
    /// Decode the latest-purchase response. `null`, an empty object or a
    /// non-object all mean "no purchase yet".
    pub fn from_latest(value: &Value) -> Option<Self> {
        let obj = value.as_object().filter(|o| !o.is_empty())?;
        Some(Self {
            units: lenient_f64(obj.get("units")),
            amount: lenient_f64(obj.get("amount")),
            date: lenient_string(obj.get("date").or_else(|| obj.get("timestamp"))),
        })
    }

    pub fn units_or_zero(&self) -> f64 {
        self.units.unwrap_or(0.0)
    }

    pub fn amount_or_zero(&self) -> f64 {
        self.amount.unwrap_or(0.0)
    }
}

/// One entry of the billing history.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillRecord {
    pub id: Option<String>,
    /// Purchase day as `YYYY-MM-DD`.
    pub date: Option<String>,
    pub units: Option<f64>,
    pub tariff: Option<f64>,
    pub amount: Option<f64>,
    pub status: Option<String>,
    pub reference: Option<String>,
    pub email: Option<String>,
}

impl BillRecord {
    fn from_value(id: Option<String>, value: &Value) -> Self {
        let field = |name: &str| value.get(name);
        Self {
            id: lenient_string(field("id")).or(id),
            date: lenient_string(field("date")),
            units: lenient_f64(field("units")),
            tariff: lenient_f64(field("tariff")),
            amount: lenient_f64(field("amount")),
            status: lenient_string(field("status")),
            reference: lenient_string(field("reference")),
            email: lenient_string(field("email")),
        }
    }

    /// Decode `GET billing`: either an object keyed by record id or a plain array.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        match value {
            Value::Object(map) => map
                .iter()
                .map(|(id, bill)| Self::from_value(Some(id.clone()), bill))
                .collect(),
            Value::Array(items) => items.iter().map(|bill| Self::from_value(None, bill)).collect(),
            _ => Vec::new(),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status.as_deref() == Some(PurchaseRequest::PAID)
    }
}

impl<'de> Deserialize<'de> for BillRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::from_value(None, &value))
    }
}

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum PurchaseError {
    #[error("purchase amount must be positive, got {0}")]
    NonPositiveAmount(f64),
    #[error("tariff must be positive, got {0}")]
    InvalidTariff(f64),
    #[error("failed to format purchase date: {0}")]
    Date(String),
}

/// A completed purchase, in the shape `POST billing` persists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseRequest {
    /// Unix milliseconds at the time of purchase.
    pub id: i64,
    pub date: String,
    pub email: String,
    pub units: f64,
    pub tariff: f64,
    pub amount: f64,
    pub status: String,
    pub reference: String,
}

impl PurchaseRequest {
    pub const PAID: &'static str = "Paid";

    /// Build a purchase for `amount` of currency at `tariff` per kWh.
    pub fn from_amount(
        amount: f64,
        tariff: f64,
        email: impl Into<String>,
        reference: impl Into<String>,
        now: OffsetDateTime,
    ) -> Result<Self, PurchaseError> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(PurchaseError::NonPositiveAmount(amount));
        }
        if !tariff.is_finite() || tariff <= 0.0 {
            return Err(PurchaseError::InvalidTariff(tariff));
        }

        let date = now
            .date()
            .format(format_description!("[year]-[month]-[day]"))
            .map_err(|e| PurchaseError::Date(e.to_string()))?;

        Ok(Self {
            id: (now.unix_timestamp_nanos() / 1_000_000) as i64,
            date,
            email: email.into(),
            units: amount / tariff,
            tariff,
            amount,
            status: Self::PAID.to_string(),
            reference: reference.into(),
        })
    }
}
