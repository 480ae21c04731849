use std::time::Duration;

use futures::{Stream, StreamExt};
use meter_client::ChartPoint;
use reqwest::{header::ACCEPT, Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{
    sse::{SseDecoder, SseEvent},
    RealtimeStream, RealtimeUpdate, UpdateStream,
};
use crate::reconciler::DashboardError;

/// A chart entry as stored in the realtime database.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct WirePoint {
    value: f64,
    /// Unix milliseconds.
    timestamp: i64,
}

impl From<ChartPoint> for WirePoint {
    fn from(p: ChartPoint) -> Self {
        Self {
            value: p.energy,
            timestamp: p.unix_millis(),
        }
    }
}

fn decode_point(value: &Value) -> Option<ChartPoint> {
    let wire: WirePoint = serde_json::from_value(value.clone()).ok()?;
    if !wire.value.is_finite() {
        return None;
    }
    ChartPoint::from_unix_millis(wire.timestamp, wire.value)
}

/// Content-derived key, so forwarding the same reading twice overwrites
/// instead of appending a duplicate.
fn point_key(point: &ChartPoint) -> String {
    let mut h = blake3::Hasher::new();
    h.update(&point.unix_millis().to_le_bytes());
    h.update(&point.energy.to_bits().to_le_bytes());
    let mut key = h.finalize().to_hex().to_string();
    key.truncate(20);
    key
}

#[derive(Debug, PartialEq)]
enum StreamUpdate {
    Emit(Vec<RealtimeUpdate>),
    Ignore,
    End(String),
}

#[derive(Deserialize)]
struct PathData {
    path: String,
    data: Value,
}

fn interpret(event: &SseEvent) -> StreamUpdate {
    let replace = match event.event.as_str() {
        "put" => true,
        "patch" => false,
        "keep-alive" => return StreamUpdate::Emit(vec![RealtimeUpdate::KeepAlive]),
        "cancel" => return StreamUpdate::End(format!("subscription cancelled: {}", event.data)),
        "auth_revoked" => return StreamUpdate::End("realtime auth revoked".to_string()),
        _ => return StreamUpdate::Ignore,
    };

    let Ok(update) = serde_json::from_str::<PathData>(&event.data) else {
        tracing::debug!(data = %event.data, "ignoring malformed realtime update");
        return StreamUpdate::Ignore;
    };

    let segments: Vec<&str> = update.path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.len() {
        // Root put: the whole log, sent on every (re)connect.
        0 if replace => {
            let points = match update.data {
                Value::Object(children) => children.values().filter_map(decode_point).collect(),
                _ => Vec::new(),
            };
            StreamUpdate::Emit(vec![RealtimeUpdate::Snapshot(points)])
        }
        // Root patch: a merge of some children.
        0 => match update.data {
            Value::Object(children) => StreamUpdate::Emit(
                children
                    .values()
                    .filter_map(decode_point)
                    .map(RealtimeUpdate::Point)
                    .collect(),
            ),
            _ => StreamUpdate::Ignore,
        },
        1 => match decode_point(&update.data) {
            Some(point) => StreamUpdate::Emit(vec![RealtimeUpdate::Point(point)]),
            None => StreamUpdate::Ignore,
        },
        // Field-level edits of an existing entry are not new readings.
        _ => StreamUpdate::Ignore,
    }
}

/// Turn a raw event-stream body into realtime updates.
fn decode_events<B>(
    body: impl Stream<Item = reqwest::Result<B>> + Send + 'static,
) -> impl Stream<Item = Result<RealtimeUpdate, DashboardError>> + Send + 'static
where
    B: AsRef<[u8]> + Send + 'static,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| DashboardError::Realtime(format!("stream read failed: {e}")))?;
            for event in decoder.feed(chunk.as_ref()) {
                match interpret(&event) {
                    StreamUpdate::Emit(updates) => {
                        for update in updates {
                            yield update;
                        }
                    }
                    StreamUpdate::Ignore => {}
                    StreamUpdate::End(reason) => Err(DashboardError::Realtime(reason))?,
                }
            }
        }
    }
}

/// REST/event-stream client for the realtime database.
#[derive(Clone)]
pub struct RealtimeDbClient {
    client: Client,
    base: Url,
    path: String,
    auth_token: Option<String>,
    request_timeout: Duration,
}

impl RealtimeDbClient {
    pub fn new(
        base_url: &str,
        path: &str,
        auth_token: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, DashboardError> {
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base = Url::parse(&normalized)
            .map_err(|e| DashboardError::Realtime(format!("invalid realtime url '{base_url}': {e}")))?;
        // No overall timeout: the subscription body is read for as long as the view lives.
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .map_err(|e| DashboardError::Realtime(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base,
            path: path.trim_matches('/').to_string(),
            auth_token,
            request_timeout,
        })
    }

    fn url(&self, relative: &str) -> Result<Url, DashboardError> {
        let mut url = self
            .base
            .join(&format!("{relative}.json"))
            .map_err(|e| DashboardError::Realtime(format!("invalid realtime path '{relative}': {e}")))?;
        if let Some(token) = &self.auth_token {
            url.query_pairs_mut().append_pair("auth", token);
        }
        Ok(url)
    }
}

#[async_trait::async_trait]
impl RealtimeStream for RealtimeDbClient {
    async fn subscribe(&self) -> Result<UpdateStream, DashboardError> {
        let url = self.url(&self.path)?;
        let response = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DashboardError::Realtime(format!("subscribe failed: {e}")))?;

        Ok(Box::pin(decode_events(response.bytes_stream())))
    }

    async fn append(&self, point: ChartPoint) -> Result<(), DashboardError> {
        let url = self.url(&format!("{}/{}", self.path, point_key(&point)))?;
        self.client
            .put(url)
            .timeout(self.request_timeout)
            .json(&WirePoint::from(point))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| DashboardError::Realtime(format!("append failed: {e}")))?;
        Ok(())
    }
}
