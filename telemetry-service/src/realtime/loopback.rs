use futures::StreamExt;
use meter_client::ChartPoint;
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use super::{RealtimeStream, RealtimeUpdate, UpdateStream};
use crate::reconciler::DashboardError;

/// In-process stand-in for the realtime database: appended points are pushed
/// straight to current subscribers. Nothing is retained for late subscribers.
#[derive(Clone)]
pub struct LoopbackStream {
    tx: broadcast::Sender<ChartPoint>,
}

impl LoopbackStream {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

#[async_trait::async_trait]
impl RealtimeStream for LoopbackStream {
    async fn subscribe(&self) -> Result<UpdateStream, DashboardError> {
        let stream = BroadcastStream::new(self.tx.subscribe()).map(|item| {
            item.map(RealtimeUpdate::Point)
                .map_err(|e: BroadcastStreamRecvError| DashboardError::Realtime(format!("loopback subscriber: {e}")))
        });
        Ok(Box::pin(stream))
    }

    async fn append(&self, point: ChartPoint) -> Result<(), DashboardError> {
        // No subscribers is not an error: the view may not be mounted.
        let _ = self.tx.send(point);
        Ok(())
    }
}
