use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

fn describe() {
    metrics::describe_counter!("dashboard_polls_total", "Backend polls started");
    metrics::describe_counter!("dashboard_poll_failures_total", "Polls that kept stale snapshots");
    metrics::describe_counter!("dashboard_stale_responses_total", "Out-of-order poll responses discarded");
    metrics::describe_counter!("dashboard_forward_failures_total", "Energy readings not forwarded to the realtime stream");
    metrics::describe_counter!("dashboard_realtime_events_total", "Realtime chart points received");
    metrics::describe_counter!("dashboard_alerts_dispatched_total", "Theft alerts delivered, per channel");
    metrics::describe_counter!("dashboard_alert_failures_total", "Theft alert dispatch failures, per channel");
    metrics::describe_gauge!("dashboard_remaining_units", "Remaining purchased units in kWh");
}

/// Install the Prometheus recorder and serve `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics bind address '{bind_addr}': {e}"))?;
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install Prometheus metrics recorder: {e}"))?;

    // Only the first initialisation wins; later calls keep the existing handle.
    let _ = PROM_HANDLE.set(handle);
    describe();

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics endpoint listening");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> Result<String, StatusCode> {
    PROM_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}
