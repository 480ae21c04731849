use serde::Deserialize;
use std::{fs, path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the stats/billing API, e.g. `https://meter.example/api/`.
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Realtime database root. When absent an in-process loopback stream is used.
    pub base_url: Option<String>,
    #[serde(default = "default_realtime_path")]
    pub path: String,
    pub auth_token: Option<String>,
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    /// A subscription silent for this long (not even a keep-alive) is
    /// treated as disconnected.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
    #[serde(default)]
    pub dedupe_by_timestamp: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            path: default_realtime_path(),
            auth_token: None,
            window_size: default_window_size(),
            reconnect_backoff_ms: default_reconnect_backoff_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            dedupe_by_timestamp: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_countdown_period_ms")]
    pub countdown_period_ms: u64,
    /// Simulated consumption between polls, in kWh per countdown tick.
    #[serde(default = "default_consumption_rate")]
    pub consumption_rate_kwh: f64,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            countdown_period_ms: default_countdown_period_ms(),
            consumption_rate_kwh: default_consumption_rate(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// A failed dispatch still counts as sent for the rest of the episode.
    #[default]
    Never,
    /// Re-dispatch a failed channel on later polls while the episode is active.
    WhileActive { max_attempts: u32 },
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertsConfig {
    pub sms_url: Option<String>,
    pub ops_url: Option<String>,
    #[serde(default = "default_status_label")]
    pub status_label: String,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            sms_url: None,
            ops_url: None,
            status_label: default_status_label(),
            retry: RetryPolicy::Never,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProfileConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    #[serde(default = "default_tariff")]
    pub tariff: f64,
    #[serde(default)]
    pub email: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            tariff: default_tariff(),
            email: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
    #[serde(default)]
    pub reconciler: ReconcilerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    pub profile: Option<ProfileConfig>,
    pub api: ApiConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    pub metrics: Option<MetricsConfig>,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_realtime_path() -> String {
    "hardwareData/chart/energy".to_string()
}

fn default_window_size() -> usize {
    50
}

fn default_reconnect_backoff_ms() -> u64 {
    5_000
}

// The realtime database sends a keep-alive every 30 s.
fn default_idle_timeout_ms() -> u64 {
    90_000
}

fn default_poll_interval_ms() -> u64 {
    3_000
}

fn default_countdown_period_ms() -> u64 {
    1_000
}

fn default_consumption_rate() -> f64 {
    0.01
}

fn default_status_label() -> String {
    "Theft Detected".to_string()
}

fn default_tariff() -> f64 {
    209.9
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("DASHBOARD_CONFIG").unwrap_or_else(|_| "dashboard-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.backend.request_timeout_ms == 0 {
            anyhow::bail!("backend.request_timeout_ms must be greater than zero");
        }
        if self.realtime.reconnect_backoff_ms == 0 {
            anyhow::bail!("realtime.reconnect_backoff_ms must be greater than zero");
        }
        if self.realtime.idle_timeout_ms == 0 {
            anyhow::bail!("realtime.idle_timeout_ms must be greater than zero");
        }
        if self.reconciler.poll_interval_ms == 0 {
            anyhow::bail!("reconciler.poll_interval_ms must be greater than zero");
        }
        if self.reconciler.countdown_period_ms == 0 {
            anyhow::bail!("reconciler.countdown_period_ms must be greater than zero");
        }
        let rate = self.reconciler.consumption_rate_kwh;
        if !rate.is_finite() || rate < 0.0 {
            anyhow::bail!("reconciler.consumption_rate_kwh must not be negative");
        }
        if self.realtime.window_size == 0 {
            anyhow::bail!("realtime.window_size must be greater than zero");
        }
        let tariff = self.billing.tariff;
        if !tariff.is_finite() || tariff <= 0.0 {
            anyhow::bail!("billing.tariff must be positive");
        }
        if let RetryPolicy::WhileActive { max_attempts: 0 } = self.alerts.retry {
            anyhow::bail!("alerts.retry.while_active.max_attempts must be at least 1");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reconciler.poll_interval_ms)
    }

    pub fn countdown_period(&self) -> Duration {
        Duration::from_millis(self.reconciler.countdown_period_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.backend.request_timeout_ms)
    }
}
