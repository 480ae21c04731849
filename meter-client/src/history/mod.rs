//! Filtering over historical consumption and billing records.
//!
//! Calendar ranges (month, year) compare in UTC.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::{format_description::well_known::Rfc3339, macros::format_description, Date, Duration, OffsetDateTime};

use crate::domain::{lenient_f64, BillRecord, ChartPoint};

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum HistoryError {
    #[error("unknown history range '{0}', expected day, week, month, year or all")]
    UnknownRange(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeFilter {
    Day,
    Week,
    #[default]
    Month,
    Year,
    All,
}

impl RangeFilter {
    pub fn contains(self, ts: OffsetDateTime, now: OffsetDateTime) -> bool {
        match self {
            Self::Day => now - ts <= Duration::days(1),
            Self::Week => now - ts <= Duration::weeks(1),
            Self::Month => ts.year() == now.year() && ts.month() == now.month(),
            Self::Year => ts.year() == now.year(),
            Self::All => true,
        }
    }
}

impl FromStr for RangeFilter {
    type Err = HistoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            "year" => Ok(Self::Year),
            "all" => Ok(Self::All),
            other => Err(HistoryError::UnknownRange(other.to_string())),
        }
    }
}

/// Interpret a history timestamp.
///
/// Numbers below 1e10 are unix seconds, larger ones milliseconds. Strings may
/// be RFC 3339 or a bare `YYYY-MM-DD`. `{"seconds": n}` objects are accepted.
/// Anything else is taken to be `now`.
pub fn parse_timestamp(value: Option<&Value>, now: OffsetDateTime) -> OffsetDateTime {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64().and_then(from_unix_number),
        Some(Value::String(s)) => parse_date_str(s),
        Some(Value::Object(obj)) => lenient_f64(obj.get("seconds")).and_then(|s| from_unix_seconds(s)),
        _ => None,
    };
    parsed.unwrap_or(now)
}

fn from_unix_number(n: f64) -> Option<OffsetDateTime> {
    if n < 10_000_000_000.0 {
        from_unix_seconds(n)
    } else {
        from_unix_seconds(n / 1000.0)
    }
}

fn from_unix_seconds(secs: f64) -> Option<OffsetDateTime> {
    if !secs.is_finite() {
        return None;
    }
    OffsetDateTime::from_unix_timestamp_nanos((secs * 1e9) as i128).ok()
}

fn parse_date_str(s: &str) -> Option<OffsetDateTime> {
    let s = s.trim();
    if let Ok(ts) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(ts);
    }
    Date::parse(s, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|d| d.midnight().assume_utc())
}

/// Decode `GET chart?type=energy`: an array of `{timestamp, value}` entries.
/// Missing values plot as zero.
pub fn consumption_from_value(value: &Value, now: OffsetDateTime) -> Vec<ChartPoint> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .map(|item| {
            let ts = parse_timestamp(item.get("timestamp"), now);
            ChartPoint::new(ts, lenient_f64(item.get("value")).unwrap_or(0.0))
        })
        .collect()
}

pub fn filter_points(points: &[ChartPoint], range: RangeFilter, now: OffsetDateTime) -> Vec<ChartPoint> {
    points
        .iter()
        .filter(|p| range.contains(p.ts, now))
        .copied()
        .collect()
}

/// The day a bill was recorded, if its `date` can be read.
pub fn bill_date(bill: &BillRecord) -> Option<OffsetDateTime> {
    bill.date.as_deref().and_then(parse_date_str)
}

/// Bills within `range`. Undatable bills only survive [`RangeFilter::All`].
pub fn filter_bills(bills: &[BillRecord], range: RangeFilter, now: OffsetDateTime) -> Vec<BillRecord> {
    bills
        .iter()
        .filter(|bill| match range {
            RangeFilter::All => true,
            _ => bill_date(bill).is_some_and(|ts| range.contains(ts, now)),
        })
        .cloned()
        .collect()
}

/// A bill matches when its date contains `term` or its status contains it
/// case-insensitively.
pub fn search(bills: &[BillRecord], term: &str) -> Vec<BillRecord> {
    if term.is_empty() {
        return bills.to_vec();
    }
    let needle = term.to_lowercase();
    bills
        .iter()
        .filter(|bill| {
            bill.date.as_deref().is_some_and(|d| d.contains(term))
                || bill.status.as_deref().is_some_and(|s| s.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UnitsPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    pub units: f64,
}

/// Purchased units over time for the billing chart.
pub fn billing_chart(bills: &[BillRecord], range: RangeFilter, now: OffsetDateTime) -> Vec<UnitsPoint> {
    let mut points: Vec<UnitsPoint> = filter_bills(bills, range, now)
        .iter()
        .filter_map(|bill| {
            Some(UnitsPoint {
                ts: bill_date(bill)?,
                units: bill.units.unwrap_or(0.0),
            })
        })
        .collect();
    points.sort_by_key(|p| p.ts);
    points
}
