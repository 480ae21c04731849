//! HTTP surface of the dashboard.

use std::net::SocketAddr;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use meter_client::{
    history::{self, RangeFilter, UnitsPoint},
    BillRecord, ChartPoint, PurchaseRequest,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;

use crate::{
    config::BillingConfig,
    reconciler::{DashboardView, Reconciler},
};

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct ApiState {
    pub reconciler: Reconciler,
    pub billing: BillingConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    range: Option<String>,
    search: Option<String>,
}

impl HistoryQuery {
    fn range(&self) -> Result<RangeFilter, ApiError> {
        match &self.range {
            Some(r) => r.parse().map_err(|e: history::HistoryError| (StatusCode::BAD_REQUEST, e.to_string())),
            None => Ok(RangeFilter::default()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BillingHistory {
    pub bills: Vec<BillRecord>,
    pub chart: Vec<UnitsPoint>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseBody {
    pub amount: f64,
    pub reference: String,
    pub email: Option<String>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/dashboard", get(dashboard))
        .route("/api/history/energy", get(energy_history))
        .route("/api/history/billing", get(billing_history))
        .route("/api/billing", post(record_purchase))
        .with_state(state)
}

/// Serve the API until `shutdown` is cancelled.
pub async fn serve(bind_addr: &str, state: ApiState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api bind address '{bind_addr}': {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "dashboard api listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}

async fn dashboard(State(state): State<ApiState>) -> Json<DashboardView> {
    Json(state.reconciler.view().await)
}

async fn energy_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<ChartPoint>>, ApiError> {
    let range = query.range()?;
    let now = OffsetDateTime::now_utc();
    let points = state
        .reconciler
        .backend()
        .fetch_energy_history(now)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
    Ok(Json(history::filter_points(&points, range, now)))
}

async fn billing_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<BillingHistory>, ApiError> {
    let range = query.range()?;
    let now = OffsetDateTime::now_utc();
    let bills = state
        .reconciler
        .backend()
        .fetch_billing_history()
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    let chart = history::billing_chart(&bills, range, now);
    let bills = history::search(&history::filter_bills(&bills, range, now), query.search.as_deref().unwrap_or(""));
    Ok(Json(BillingHistory { bills, chart }))
}

async fn record_purchase(
    State(state): State<ApiState>,
    Json(body): Json<PurchaseBody>,
) -> Result<Json<PurchaseRequest>, ApiError> {
    let email = body.email.unwrap_or_else(|| state.billing.email.clone());
    let purchase = PurchaseRequest::from_amount(
        body.amount,
        state.billing.tariff,
        email,
        body.reference,
        OffsetDateTime::now_utc(),
    )
    .map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()))?;

    state
        .reconciler
        .backend()
        .record_purchase(&purchase)
        .await
        .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;

    // Refresh the dashboard now rather than on the next tick.
    state.reconciler.request_poll();
    Ok(Json(purchase))
}
