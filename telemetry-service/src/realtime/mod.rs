pub mod firebase;
pub mod loopback;
pub mod sse;

pub use firebase::RealtimeDbClient;
pub use loopback::LoopbackStream;

use std::pin::Pin;

use futures::Stream;
use meter_client::ChartPoint;

use crate::reconciler::DashboardError;

/// One item of a realtime subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeUpdate {
    /// Everything currently stored. Replaces the chart rather than adding to it.
    Snapshot(Vec<ChartPoint>),
    /// A single appended reading.
    Point(ChartPoint),
    /// Liveness signal from the server; carries no data.
    KeepAlive,
}

pub type UpdateStream = Pin<Box<dyn Stream<Item = Result<RealtimeUpdate, DashboardError>> + Send>>;

/// Push-based append log of energy readings keyed by timestamp.
#[async_trait::async_trait]
pub trait RealtimeStream: Send + Sync {
    /// Open a subscription. Stores that keep history start with a
    /// [`RealtimeUpdate::Snapshot`], then deliver appends as they happen. The
    /// stream ends on disconnect.
    async fn subscribe(&self) -> Result<UpdateStream, DashboardError>;

    async fn append(&self, point: ChartPoint) -> Result<(), DashboardError>;
}
