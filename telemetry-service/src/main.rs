use std::sync::Arc;

use anyhow::Result;
use telemetry_service::{
    alerts::{AlertChannel, AlertDispatcher, ChannelKind, HttpAlertChannel},
    api::{self, ApiState},
    backend::HttpBackend,
    config::AppConfig,
    metrics_server, observability,
    profile::{JsonFileProfileStore, NoProfile, ProfileSource},
    realtime::{LoopbackStream, RealtimeDbClient, RealtimeStream},
    Reconciler, ReconcilerSettings,
};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let timeout = cfg.request_timeout();
    let backend = Arc::new(HttpBackend::new(&cfg.backend.base_url, timeout)?);

    let realtime: Arc<dyn RealtimeStream> = match &cfg.realtime.base_url {
        Some(url) => Arc::new(RealtimeDbClient::new(
            url,
            &cfg.realtime.path,
            cfg.realtime.auth_token.clone(),
            timeout,
        )?),
        None => {
            tracing::info!("no realtime url configured, charting polled readings in-process");
            Arc::new(LoopbackStream::new(cfg.realtime.window_size * 2))
        }
    };

    let profile: Arc<dyn ProfileSource> = match &cfg.profile {
        Some(p) => Arc::new(JsonFileProfileStore::new(&p.path)),
        None => Arc::new(NoProfile),
    };

    let mut channels: Vec<Arc<dyn AlertChannel>> = Vec::new();
    if let Some(url) = &cfg.alerts.sms_url {
        channels.push(Arc::new(HttpAlertChannel::new("sms", ChannelKind::Sms, url, timeout)?));
    }
    if let Some(url) = &cfg.alerts.ops_url {
        channels.push(Arc::new(HttpAlertChannel::new("ops", ChannelKind::Ops, url, timeout)?));
    }
    if channels.is_empty() {
        tracing::warn!("no alert channels configured, theft alerts will only be logged");
    }
    let alerts = AlertDispatcher::new(channels, profile, cfg.alerts.status_label.clone());

    let reconciler = Reconciler::new(ReconcilerSettings::from_config(&cfg), backend, realtime, alerts);
    reconciler.mount();

    let shutdown = CancellationToken::new();
    let state = ApiState {
        reconciler: reconciler.clone(),
        billing: cfg.billing.clone(),
    };
    let bind_addr = cfg.api.bind_addr.clone();
    let server_shutdown = shutdown.clone();
    let mut server = tokio::spawn(async move { api::serve(&bind_addr, state, server_shutdown).await });

    tokio::select! {
        res = &mut server => {
            // The API stopped on its own, most likely a bind failure.
            reconciler.unmount().await;
            return res?;
        }
        sig = tokio::signal::ctrl_c() => sig?,
    }

    tracing::info!("shutting down");
    shutdown.cancel();
    reconciler.unmount().await;
    server.await??;

    Ok(())
}
