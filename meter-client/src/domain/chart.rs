use serde::Serialize;
use time::OffsetDateTime;

/// One energy reading on the live chart, ordered by `ts`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub ts: OffsetDateTime,
    /// Cumulative energy in kWh.
    pub energy: f64,
}

impl ChartPoint {
    pub fn new(ts: OffsetDateTime, energy: f64) -> Self {
        Self { ts, energy }
    }

    pub fn unix_millis(&self) -> i64 {
        (self.ts.unix_timestamp_nanos() / 1_000_000) as i64
    }

    /// Build a point from unix milliseconds; `None` when out of range.
    pub fn from_unix_millis(millis: i64, energy: f64) -> Option<Self> {
        let ts = OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000).ok()?;
        Some(Self { ts, energy })
    }
}
