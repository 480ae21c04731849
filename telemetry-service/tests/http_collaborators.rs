use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde_json::{json, Value};
use telemetry_service::{
    alerts::{AlertChannel, AlertDispatcher, ChannelKind, HttpAlertChannel},
    api::{self, ApiState},
    backend::{HttpBackend, StatsBackend},
    config::BillingConfig,
    profile::NoProfile,
    realtime::LoopbackStream,
    Reconciler, ReconcilerSettings,
};

#[derive(Clone, Default)]
struct Mock {
    theft: Arc<AtomicBool>,
    sms: Arc<Mutex<Vec<Value>>>,
    ops_calls: Arc<AtomicUsize>,
    purchases: Arc<Mutex<Vec<Value>>>,
}

async fn stats(State(mock): State<Mock>) -> Json<Value> {
    Json(json!({
        "meter_id": "SM-0042",
        "voltage": 231.4,
        "current": "NaN",
        "ct_current": 1.2,
        "power": null,
        "energy": 4,
        "theft_detected": mock.theft.load(Ordering::SeqCst),
    }))
}

async fn latest_billing() -> Json<Value> {
    Json(json!({"units": 10, "amount": 2099, "date": "2025-03-01"}))
}

async fn billing_history() -> Json<Value> {
    Json(json!({
        "-Na": {"date": "2025-03-01", "units": 10, "status": "Paid"},
        "-Nb": {"date": "1999-01-01", "units": 2, "status": "Pending"}
    }))
}

async fn save_purchase(State(mock): State<Mock>, Json(body): Json<Value>) -> Json<Value> {
    mock.purchases.lock().unwrap().push(body);
    Json(json!({"success": true}))
}

async fn sms(State(mock): State<Mock>, Json(body): Json<Value>) -> Json<Value> {
    mock.sms.lock().unwrap().push(body);
    Json(json!({"success": true}))
}

async fn ops(State(mock): State<Mock>) -> (StatusCode, Json<Value>) {
    mock.ops_calls.fetch_add(1, Ordering::SeqCst);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"success": false})))
}

async fn spawn_router(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    addr
}

async fn spawn_mock(mock: Mock) -> SocketAddr {
    let app = Router::new()
        .route("/api/stats", get(stats))
        .route("/api/billing/latest", get(latest_billing))
        .route("/api/billing", get(billing_history).post(save_purchase))
        .route("/alerts/sms", post(sms))
        .route("/alerts/ops", post(ops))
        .with_state(mock);
    spawn_router(app).await
}

fn reconciler(addr: SocketAddr) -> Reconciler {
    let timeout = Duration::from_secs(2);
    let backend = Arc::new(HttpBackend::new(&format!("http://{addr}/api"), timeout).unwrap());
    let channels: Vec<Arc<dyn AlertChannel>> = vec![
        Arc::new(HttpAlertChannel::new("sms", ChannelKind::Sms, &format!("http://{addr}/alerts/sms"), timeout).unwrap()),
        Arc::new(HttpAlertChannel::new("ops", ChannelKind::Ops, &format!("http://{addr}/alerts/ops"), timeout).unwrap()),
    ];
    let alerts = AlertDispatcher::new(channels, Arc::new(NoProfile), "Theft Detected");
    Reconciler::new(
        ReconcilerSettings::default(),
        backend,
        Arc::new(LoopbackStream::new(16)),
        alerts,
    )
}

#[tokio::test]
async fn poll_renders_partial_stats_from_http_backend() {
    let addr = spawn_mock(Mock::default()).await;
    let reconciler = reconciler(addr);

    reconciler.poll().await;
    let view = reconciler.view().await;

    assert_eq!(view.meter_id, "SM-0042");
    assert_eq!(view.voltage, "231.4 V");
    assert_eq!(view.current, "1.2 A");
    assert_eq!(view.power, "-");
    assert_eq!(view.energy, "4 kWh");
    assert_eq!(view.units_purchased, "10.00");
    assert_eq!(view.remaining_units, "6.00");
    assert_eq!(view.theft, "Safe");
}

#[tokio::test]
async fn theft_alert_reaches_sms_once_despite_failing_ops_channel() {
    let mock = Mock::default();
    mock.theft.store(true, Ordering::SeqCst);
    let addr = spawn_mock(mock.clone()).await;
    let reconciler = reconciler(addr);

    reconciler.poll().await;
    reconciler.poll().await;

    let sent = mock.sms.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["meterId"], "SM-0042");
    assert_eq!(sent[0]["location"], "Unknown Location");
    assert_eq!(sent[0]["status"], "Theft Detected");
    assert_eq!(mock.ops_calls.load(Ordering::SeqCst), 1);
    assert!(reconciler.view().await.alert_active);
}

#[tokio::test]
async fn unreachable_backend_keeps_placeholders() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let reconciler = reconciler(addr);
    reconciler.poll().await;

    let view = reconciler.view().await;
    assert_eq!(view.voltage, "-");
    assert_eq!(view.remaining_units, "0.00");
}

#[tokio::test]
async fn http_backend_decodes_billing_history() {
    let addr = spawn_mock(Mock::default()).await;
    let backend = HttpBackend::new(&format!("http://{addr}/api/"), Duration::from_secs(2)).unwrap();

    let bills = backend.fetch_billing_history().await.unwrap();
    assert_eq!(bills.len(), 2);
    assert_eq!(bills[0].id.as_deref(), Some("-Na"));
    assert!(bills[0].is_paid());
}

#[tokio::test]
async fn api_serves_dashboard_and_records_purchases() {
    let mock = Mock::default();
    let backend_addr = spawn_mock(mock.clone()).await;
    let reconciler = reconciler(backend_addr);
    reconciler.poll().await;

    let state = ApiState {
        reconciler: reconciler.clone(),
        billing: BillingConfig {
            tariff: 209.9,
            email: "owner@example.com".to_string(),
        },
    };
    let api_addr = spawn_router(api::router(state)).await;
    let client = reqwest::Client::new();

    let view: Value = client
        .get(format!("http://{api_addr}/api/dashboard"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["voltage"], "231.4 V");

    let history: Value = client
        .get(format!("http://{api_addr}/api/history/billing?range=all&search=paid"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["bills"].as_array().unwrap().len(), 1);

    let bad_range = client
        .get(format!("http://{api_addr}/api/history/energy?range=decade"))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_range.status(), reqwest::StatusCode::BAD_REQUEST);

    let saved = client
        .post(format!("http://{api_addr}/api/billing"))
        .json(&json!({"amount": 2099, "reference": "T-1"}))
        .send()
        .await
        .unwrap();
    assert!(saved.status().is_success());

    let purchases = mock.purchases.lock().unwrap().clone();
    assert_eq!(purchases.len(), 1);
    assert_eq!(purchases[0]["email"], "owner@example.com");
    assert_eq!(purchases[0]["status"], "Paid");
    assert!((purchases[0]["units"].as_f64().unwrap() - 10.0).abs() < 1e-9);

    let rejected = client
        .post(format!("http://{api_addr}/api/billing"))
        .json(&json!({"amount": 0, "reference": "T-2"}))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);

    reconciler.unmount().await;
}
