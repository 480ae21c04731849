use meter_client::{BillingSnapshot, ChartPoint, TelemetrySnapshot};
use time::OffsetDateTime;

use super::{view::DashboardView, window::ChartWindow};
use crate::{alerts::AlertEpisode, config::RetryPolicy};

/// Units left on the meter: purchased minus consumed, floored at zero.
pub fn remaining_units(purchased: f64, consumed: f64) -> f64 {
    (purchased - consumed).max(0.0)
}

#[derive(Debug, PartialEq)]
pub enum PollOutcome {
    /// An equal or newer poll was already applied.
    Stale,
    Applied {
        /// Energy reading to append to the realtime stream.
        forward: Option<ChartPoint>,
        /// Alert channels to dispatch for this snapshot.
        alert_channels: Vec<String>,
        /// Episode the dispatch belongs to; outcomes are recorded against it.
        alert_episode: u64,
        remaining_units: f64,
    },
}

/// Everything the dashboard view shows, owned by the reconciler.
#[derive(Debug, Clone)]
pub struct DashboardState {
    telemetry: Option<TelemetrySnapshot>,
    billing: Option<BillingSnapshot>,
    remaining_units: f64,
    window: ChartWindow,
    episode: AlertEpisode,
    last_applied_seq: u64,
    consumption_rate: f64,
}

impl DashboardState {
    pub fn new(window: ChartWindow, retry: RetryPolicy, consumption_rate: f64) -> Self {
        Self {
            telemetry: None,
            billing: None,
            remaining_units: 0.0,
            window,
            episode: AlertEpisode::new(retry),
            last_applied_seq: 0,
            consumption_rate,
        }
    }

    /// Replace both snapshots with the result of poll `seq`.
    ///
    /// Remaining units are re-synchronised only when both the consumed energy
    /// and the purchased units are known; otherwise the simulated countdown
    /// keeps running from its current value.
    pub fn apply_poll(
        &mut self,
        seq: u64,
        telemetry: TelemetrySnapshot,
        billing: Option<BillingSnapshot>,
        channels: &[String],
        now: OffsetDateTime,
    ) -> PollOutcome {
        if seq <= self.last_applied_seq {
            return PollOutcome::Stale;
        }
        self.last_applied_seq = seq;

        if let (Some(consumed), Some(purchased)) = (telemetry.energy, billing.as_ref().and_then(|b| b.units)) {
            self.remaining_units = remaining_units(purchased, consumed);
        }

        let forward = telemetry.energy.map(|energy| ChartPoint::new(now, energy));
        let alert_channels = self.episode.evaluate(telemetry.theft_detected, channels);

        self.telemetry = Some(telemetry);
        self.billing = billing;

        PollOutcome::Applied {
            forward,
            alert_channels,
            alert_episode: self.episode.id(),
            remaining_units: self.remaining_units,
        }
    }

    /// One simulated consumption step. Only runs while a purchase is known.
    pub fn tick_countdown(&mut self) -> Option<f64> {
        self.billing.as_ref()?;
        self.remaining_units = (self.remaining_units - self.consumption_rate).max(0.0);
        Some(self.remaining_units)
    }

    pub fn on_realtime_event(&mut self, point: ChartPoint) -> bool {
        self.window.insert(point)
    }

    /// Rebuild the chart from a full realtime snapshot.
    pub fn replace_chart(&mut self, points: Vec<ChartPoint>) {
        self.window.replace(points);
    }

    pub fn record_alert_outcome(&mut self, episode: u64, channel: &str, delivered: bool) {
        self.episode.record(episode, channel, delivered);
    }

    pub fn telemetry(&self) -> Option<&TelemetrySnapshot> {
        self.telemetry.as_ref()
    }

    pub fn billing(&self) -> Option<&BillingSnapshot> {
        self.billing.as_ref()
    }

    pub fn remaining(&self) -> f64 {
        self.remaining_units
    }

    pub fn view(&self, tariff: f64) -> DashboardView {
        DashboardView::render(
            self.telemetry.as_ref(),
            self.billing.as_ref(),
            self.remaining_units,
            tariff,
            self.episode.is_alerted(),
            self.window.to_vec(),
        )
    }
}
