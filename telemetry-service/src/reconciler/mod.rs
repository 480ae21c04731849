//! Live telemetry reconciliation.
//!
//! Three drivers feed one [`DashboardState`]: a poll timer against the stats
//! backend, a push subscription to the realtime stream and a countdown timer.
//! All of them are started by [`Reconciler::mount`] and stopped together by
//! [`Reconciler::unmount`].

pub mod state;
pub mod view;
pub mod window;

pub use state::{DashboardState, PollOutcome};
pub use view::DashboardView;
pub use window::ChartWindow;

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::StreamExt;
use meter_client::{BillingSnapshot, ChartPoint, TelemetrySnapshot};
use time::OffsetDateTime;
use tokio::{
    sync::Mutex,
    time::{Instant, MissedTickBehavior},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::{
    alerts::AlertDispatcher,
    backend::StatsBackend,
    config::{AppConfig, RetryPolicy},
    realtime::{RealtimeStream, RealtimeUpdate},
};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DashboardError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("realtime stream error: {0}")]
    Realtime(String),
    #[error("alert channel error: {0}")]
    Alert(String),
}

#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub poll_interval: Duration,
    pub countdown_period: Duration,
    pub consumption_rate: f64,
    pub window_size: usize,
    pub dedupe_by_timestamp: bool,
    pub reconnect_backoff: Duration,
    pub realtime_idle_timeout: Duration,
    pub retry: RetryPolicy,
    pub tariff: f64,
}

impl ReconcilerSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            countdown_period: cfg.countdown_period(),
            consumption_rate: cfg.reconciler.consumption_rate_kwh,
            window_size: cfg.realtime.window_size,
            dedupe_by_timestamp: cfg.realtime.dedupe_by_timestamp,
            reconnect_backoff: Duration::from_millis(cfg.realtime.reconnect_backoff_ms),
            realtime_idle_timeout: Duration::from_millis(cfg.realtime.idle_timeout_ms),
            retry: cfg.alerts.retry,
            tariff: cfg.billing.tariff,
        }
    }
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            countdown_period: Duration::from_secs(1),
            consumption_rate: 0.01,
            window_size: 50,
            dedupe_by_timestamp: false,
            reconnect_backoff: Duration::from_secs(5),
            realtime_idle_timeout: Duration::from_secs(90),
            retry: RetryPolicy::Never,
            tariff: 209.9,
        }
    }
}

struct Shared {
    state: Mutex<DashboardState>,
    backend: Arc<dyn StatsBackend>,
    realtime: Arc<dyn RealtimeStream>,
    alerts: AlertDispatcher,
    settings: ReconcilerSettings,
    next_seq: AtomicU64,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

/// Handle to the reconciler. Cheap to clone; every clone drives the same state.
///
/// A reconciler is mounted once. After [`unmount`](Self::unmount) it keeps
/// serving its last state but applies nothing new.
#[derive(Clone)]
pub struct Reconciler {
    shared: Arc<Shared>,
}

async fn fetch_snapshots(
    backend: &dyn StatsBackend,
) -> Result<(TelemetrySnapshot, Option<BillingSnapshot>), DashboardError> {
    tokio::try_join!(backend.fetch_stats(), backend.fetch_latest_billing())
}

impl Reconciler {
    pub fn new(
        settings: ReconcilerSettings,
        backend: Arc<dyn StatsBackend>,
        realtime: Arc<dyn RealtimeStream>,
        alerts: AlertDispatcher,
    ) -> Self {
        let state = DashboardState::new(
            ChartWindow::new(settings.window_size, settings.dedupe_by_timestamp),
            settings.retry,
            settings.consumption_rate,
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                backend,
                realtime,
                alerts,
                settings,
                next_seq: AtomicU64::new(0),
                cancel: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    pub fn backend(&self) -> Arc<dyn StatsBackend> {
        self.shared.backend.clone()
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.shared.settings
    }

    pub fn is_unmounted(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub async fn view(&self) -> DashboardView {
        self.shared.state.lock().await.view(self.shared.settings.tariff)
    }

    pub async fn remaining_units(&self) -> f64 {
        self.shared.state.lock().await.remaining()
    }

    /// Fetch both snapshots and apply them. Never fails: errors are logged and
    /// the previous snapshots stay in place.
    pub async fn poll(&self) {
        let shared = &self.shared;
        if shared.cancel.is_cancelled() {
            return;
        }
        let seq = shared.next_seq.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::counter!("dashboard_polls_total").increment(1);

        let fetched = tokio::select! {
            _ = shared.cancel.cancelled() => {
                tracing::debug!(seq, "poll abandoned on unmount");
                return;
            }
            res = fetch_snapshots(shared.backend.as_ref()) => res,
        };
        let (telemetry, billing) = match fetched {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(seq, error = %e, "poll failed, keeping previous snapshots");
                metrics::counter!("dashboard_poll_failures_total").increment(1);
                return;
            }
        };

        let now = OffsetDateTime::now_utc();
        let channels = shared.alerts.channel_names();
        let outcome = {
            let mut state = shared.state.lock().await;
            if shared.cancel.is_cancelled() {
                tracing::debug!(seq, "discarding poll response after unmount");
                return;
            }
            state.apply_poll(seq, telemetry.clone(), billing, &channels, now)
        };

        match outcome {
            PollOutcome::Stale => {
                tracing::debug!(seq, "discarding out-of-order poll response");
                metrics::counter!("dashboard_stale_responses_total").increment(1);
            }
            PollOutcome::Applied {
                forward,
                alert_channels,
                alert_episode,
                remaining_units,
            } => {
                metrics::gauge!("dashboard_remaining_units").set(remaining_units);
                if let Some(point) = forward {
                    self.forward(point);
                }
                if !alert_channels.is_empty() {
                    self.raise_alert(&telemetry, &alert_channels, alert_episode, now).await;
                }
            }
        }
    }

    /// Schedule a poll outside the regular cadence, e.g. right after a purchase.
    pub fn request_poll(&self) {
        if self.is_unmounted() {
            return;
        }
        let this = self.clone();
        self.shared.tasks.spawn(async move { this.poll().await });
    }

    /// Append a polled reading to the realtime stream without waiting on it.
    fn forward(&self, point: ChartPoint) {
        let realtime = self.shared.realtime.clone();
        self.shared.tasks.spawn(async move {
            if let Err(e) = realtime.append(point).await {
                tracing::warn!(error = %e, "failed to forward energy reading");
                metrics::counter!("dashboard_forward_failures_total").increment(1);
            }
        });
    }

    async fn raise_alert(
        &self,
        telemetry: &TelemetrySnapshot,
        channels: &[String],
        episode: u64,
        now: OffsetDateTime,
    ) {
        let alerts = &self.shared.alerts;
        let alert = alerts.build_alert(telemetry, now).await;
        tracing::warn!(
            episode,
            meter_id = %alert.payload.meter_id,
            location = %alert.payload.location,
            "theft detected, notifying"
        );

        let outcomes = alerts.dispatch(&alert, channels).await;
        let mut state = self.shared.state.lock().await;
        for (channel, delivered) in outcomes {
            state.record_alert_outcome(episode, &channel, delivered);
        }
    }

    pub async fn on_realtime_event(&self, point: ChartPoint) {
        if self.is_unmounted() {
            return;
        }
        metrics::counter!("dashboard_realtime_events_total").increment(1);
        let retained = self.shared.state.lock().await.on_realtime_event(point);
        if !retained {
            tracing::trace!(ts = %point.ts, "realtime point outside window");
        }
    }

    /// Replace the chart with a full snapshot of the realtime log.
    pub async fn on_realtime_snapshot(&self, points: Vec<ChartPoint>) {
        if self.is_unmounted() {
            return;
        }
        tracing::debug!(points = points.len(), "realtime snapshot received");
        self.shared.state.lock().await.replace_chart(points);
    }

    pub async fn tick_countdown(&self) {
        if self.is_unmounted() {
            return;
        }
        if let Some(remaining) = self.shared.state.lock().await.tick_countdown() {
            metrics::gauge!("dashboard_remaining_units").set(remaining);
        }
    }

    /// Start the poll timer, the realtime subscription and the countdown.
    pub fn mount(&self) {
        let tasks = &self.shared.tasks;
        tasks.spawn(self.clone().run_polling());
        tasks.spawn(self.clone().run_realtime());
        tasks.spawn(self.clone().run_countdown());
        tracing::info!(
            poll_interval_ms = self.shared.settings.poll_interval.as_millis() as u64,
            window = self.shared.settings.window_size,
            "reconciler mounted"
        );
    }

    /// Cancel every timer, the subscription and in-flight polls, then wait for
    /// all of them to finish.
    pub async fn unmount(&self) {
        self.shared.cancel.cancel();
        self.shared.tasks.close();
        self.shared.tasks.wait().await;
        tracing::info!("reconciler unmounted");
    }

    async fn run_polling(self) {
        let mut ticker = tokio::time::interval(self.shared.settings.poll_interval);
        // Polls may overlap; a slow backend must not cause a burst of catch-up ticks.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                _ = ticker.tick() => self.request_poll(),
            }
        }
    }

    async fn run_countdown(self) {
        let period = self.shared.settings.countdown_period;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = self.shared.cancel.cancelled() => break,
                _ = ticker.tick() => self.tick_countdown().await,
            }
        }
    }

    async fn run_realtime(self) {
        let cancel = self.shared.cancel.clone();
        loop {
            let subscribed = tokio::select! {
                _ = cancel.cancelled() => return,
                res = self.shared.realtime.subscribe() => res,
            };

            match subscribed {
                Ok(mut stream) => {
                    tracing::info!("realtime subscription established");
                    let idle = self.shared.settings.realtime_idle_timeout;
                    loop {
                        let item = tokio::select! {
                            _ = cancel.cancelled() => return,
                            item = tokio::time::timeout(idle, stream.next()) => item,
                        };
                        match item {
                            Ok(Some(Ok(RealtimeUpdate::Snapshot(points)))) => self.on_realtime_snapshot(points).await,
                            Ok(Some(Ok(RealtimeUpdate::Point(point)))) => self.on_realtime_event(point).await,
                            Ok(Some(Ok(RealtimeUpdate::KeepAlive))) => {}
                            Ok(Some(Err(e))) => tracing::warn!(error = %e, "realtime stream error"),
                            Ok(None) => {
                                tracing::warn!("realtime subscription ended");
                                break;
                            }
                            Err(_) => {
                                tracing::warn!(idle_ms = idle.as_millis() as u64, "realtime subscription idle, reconnecting");
                                break;
                            }
                        }
                    }
                }
                Err(e) => tracing::warn!(error = %e, "realtime subscribe failed"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.shared.settings.reconnect_backoff) => {}
            }
        }
    }
}
