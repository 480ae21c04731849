pub mod episode;
pub mod http;

pub use episode::AlertEpisode;
pub use http::{ChannelKind, HttpAlertChannel};

use std::sync::Arc;

use futures::future::join_all;
use meter_client::{domain::profile::alert_location, Profile, TelemetrySnapshot};
use serde::Serialize;
use time::OffsetDateTime;

use crate::{profile::ProfileSource, reconciler::DashboardError};

pub const UNKNOWN_METER: &str = "Unknown";

/// Body shared by every alert channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertPayload {
    pub meter_id: String,
    pub location: String,
    #[serde(with = "time::serde::rfc3339")]
    pub time: OffsetDateTime,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub payload: AlertPayload,
    /// Destination for phone-style channels, from the profile.
    pub phone: Option<String>,
}

#[async_trait::async_trait]
pub trait AlertChannel: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, alert: &Alert) -> Result<(), DashboardError>;
}

/// Builds alerts from a snapshot plus the profile and fans them out to the
/// configured channels, each independently.
#[derive(Clone)]
pub struct AlertDispatcher {
    channels: Vec<Arc<dyn AlertChannel>>,
    profile: Arc<dyn ProfileSource>,
    status_label: String,
}

impl AlertDispatcher {
    pub fn new(
        channels: Vec<Arc<dyn AlertChannel>>,
        profile: Arc<dyn ProfileSource>,
        status_label: impl Into<String>,
    ) -> Self {
        Self {
            channels,
            profile,
            status_label: status_label.into(),
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    pub async fn build_alert(&self, snapshot: &TelemetrySnapshot, now: OffsetDateTime) -> Alert {
        let profile: Option<Profile> = self.profile.load().await;
        Alert {
            payload: AlertPayload {
                meter_id: snapshot
                    .meter_id
                    .clone()
                    .unwrap_or_else(|| UNKNOWN_METER.to_string()),
                location: alert_location(profile.as_ref()),
                time: now,
                status: self.status_label.clone(),
            },
            phone: profile.and_then(|p| p.phone).filter(|p| !p.trim().is_empty()),
        }
    }

    /// Send `alert` through the named channels concurrently. One channel's
    /// failure neither blocks nor retries another. Returns `(channel, delivered)`.
    pub async fn dispatch(&self, alert: &Alert, targets: &[String]) -> Vec<(String, bool)> {
        let sends = self
            .channels
            .iter()
            .filter(|c| targets.iter().any(|t| t == c.name()))
            .map(|channel| async move {
                let name = channel.name().to_string();
                match channel.send(alert).await {
                    Ok(()) => {
                        tracing::info!(channel = %name, meter_id = %alert.payload.meter_id, "theft alert sent");
                        metrics::counter!("dashboard_alerts_dispatched_total", "channel" => name.clone())
                            .increment(1);
                        (name, true)
                    }
                    Err(e) => {
                        tracing::error!(channel = %name, error = %e, "theft alert dispatch failed");
                        metrics::counter!("dashboard_alert_failures_total", "channel" => name.clone())
                            .increment(1);
                        (name, false)
                    }
                }
            });

        join_all(sends).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::NoProfile;
    use std::sync::Mutex;
    use time::macros::datetime;

    pub(crate) struct RecordingChannel {
        pub name: String,
        pub fail: bool,
        pub sent: Mutex<Vec<Alert>>,
    }

    #[async_trait::async_trait]
    impl AlertChannel for RecordingChannel {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, alert: &Alert) -> Result<(), DashboardError> {
            self.sent.lock().unwrap().push(alert.clone());
            if self.fail {
                Err(DashboardError::Alert("gateway down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    struct FixedProfile(Profile);

    #[async_trait::async_trait]
    impl ProfileSource for FixedProfile {
        async fn load(&self) -> Option<Profile> {
            Some(self.0.clone())
        }
    }

    fn channel(name: &str, fail: bool) -> Arc<RecordingChannel> {
        Arc::new(RecordingChannel {
            name: name.to_string(),
            fail,
            sent: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn alert_falls_back_to_unknowns() {
        let dispatcher = AlertDispatcher::new(Vec::new(), Arc::new(NoProfile), "Theft Detected");
        let alert = dispatcher.build_alert(&TelemetrySnapshot::default(), datetime!(2025-03-14 12:00 UTC)).await;
        assert_eq!(alert.payload.meter_id, "Unknown");
        assert_eq!(alert.payload.location, "Unknown Location");
        assert_eq!(alert.payload.status, "Theft Detected");
        assert_eq!(alert.phone, None);
    }

    #[tokio::test]
    async fn alert_uses_profile_and_meter_id() {
        let profile = Profile {
            phone: Some("+2348000000000".to_string()),
            town: Some("Ikeja".to_string()),
            state: Some("Lagos".to_string()),
            country: Some("Nigeria".to_string()),
            ..Profile::default()
        };
        let dispatcher = AlertDispatcher::new(Vec::new(), Arc::new(FixedProfile(profile)), "Theft Detected");
        let snapshot = TelemetrySnapshot {
            meter_id: Some("SM-0042".to_string()),
            ..TelemetrySnapshot::default()
        };
        let alert = dispatcher.build_alert(&snapshot, datetime!(2025-03-14 12:00 UTC)).await;
        assert_eq!(alert.payload.meter_id, "SM-0042");
        assert_eq!(alert.payload.location, "Ikeja, Lagos, Nigeria");
        assert_eq!(alert.phone.as_deref(), Some("+2348000000000"));

        let json = serde_json::to_value(&alert.payload).unwrap();
        assert_eq!(json["meterId"], "SM-0042");
        assert_eq!(json["time"], "2025-03-14T12:00:00Z");
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_sibling() {
        let sms = channel("sms", true);
        let ops = channel("ops", false);
        let dispatcher = AlertDispatcher::new(
            vec![sms.clone() as Arc<dyn AlertChannel>, ops.clone() as Arc<dyn AlertChannel>],
            Arc::new(NoProfile),
            "Theft Detected",
        );
        let alert = dispatcher.build_alert(&TelemetrySnapshot::default(), datetime!(2025-03-14 12:00 UTC)).await;

        let outcomes = dispatcher.dispatch(&alert, &dispatcher.channel_names()).await;
        assert_eq!(outcomes, vec![("sms".to_string(), false), ("ops".to_string(), true)]);
        assert_eq!(sms.sent.lock().unwrap().len(), 1);
        assert_eq!(ops.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dispatch_only_targets_named_channels() {
        let sms = channel("sms", false);
        let ops = channel("ops", false);
        let dispatcher = AlertDispatcher::new(
            vec![sms.clone() as Arc<dyn AlertChannel>, ops.clone() as Arc<dyn AlertChannel>],
            Arc::new(NoProfile),
            "Theft Detected",
        );
        let alert = dispatcher.build_alert(&TelemetrySnapshot::default(), datetime!(2025-03-14 12:00 UTC)).await;

        dispatcher.dispatch(&alert, &["ops".to_string()]).await;
        assert!(sms.sent.lock().unwrap().is_empty());
        assert_eq!(ops.sent.lock().unwrap().len(), 1);
    }
}
