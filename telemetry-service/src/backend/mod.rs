pub mod http;

pub use http::HttpBackend;

use meter_client::{BillRecord, BillingSnapshot, ChartPoint, PurchaseRequest, TelemetrySnapshot};
use time::OffsetDateTime;

use crate::reconciler::DashboardError;

/// The stats/billing REST backend.
#[async_trait::async_trait]
pub trait StatsBackend: Send + Sync {
    /// `GET stats`
    async fn fetch_stats(&self) -> Result<TelemetrySnapshot, DashboardError>;

    /// `GET billing/latest`; `None` when nothing has been purchased yet.
    async fn fetch_latest_billing(&self) -> Result<Option<BillingSnapshot>, DashboardError>;

    /// `GET billing`
    async fn fetch_billing_history(&self) -> Result<Vec<BillRecord>, DashboardError>;

    /// `GET chart?type=energy`. Undatable entries are stamped with `now`.
    async fn fetch_energy_history(&self, now: OffsetDateTime) -> Result<Vec<ChartPoint>, DashboardError>;

    /// `POST billing`
    async fn record_purchase(&self, purchase: &PurchaseRequest) -> Result<(), DashboardError>;
}
