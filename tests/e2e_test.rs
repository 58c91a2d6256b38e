//! End-to-end tests through the HTTP API
//!
//! Printers are wiremock servers; the API runs in-process on an ephemeral
//! port and receipts travel over real HTTP.
//!
//! Run with: cargo test --test e2e_test

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use fixtures::*;
use receipt_dispatch::{
    app_state::AppState,
    config::{DestinationConfig, DispatchConfig},
    models::dispatch::{DispatchSummary, ReportStatus},
    routes,
    services::{
        dispatcher::ReceiptDispatcher,
        fallback::{FallbackNotifier, LogAlertChannel},
        manual_queue::{InMemoryManualPrintStore, ManualPrintStore},
        transport::HttpPrinterTransport,
    },
};

struct TestApp {
    base_url: String,
    client: reqwest::Client,
    store: Arc<InMemoryManualPrintStore>,
}

/// Serve the API with `alpha` and `beta` pointed at the given mock printers.
async fn spawn_app(alpha: &MockServer, beta: &MockServer) -> TestApp {
    let mut config = DispatchConfig::default().with_destinations(vec![
        DestinationConfig::new("alpha", "Alpha Canteen", &format!("{}/print", alpha.uri())),
        DestinationConfig::new("beta", "Beta Juice Bar", &format!("{}/print", beta.uri())),
    ]);
    config.retry.max_attempts = 2;
    config.retry.attempt_timeout = Duration::from_secs(2);
    config.retry.base_delay = Duration::from_millis(50);
    config.breaker.failure_threshold = 1;

    let store = Arc::new(InMemoryManualPrintStore::new());
    let manual_store: Arc<dyn ManualPrintStore> = store.clone();
    let transport = Arc::new(HttpPrinterTransport::new().expect("Failed to build HTTP client"));
    let fallback = FallbackNotifier::new(Arc::new(LogAlertChannel), Arc::clone(&manual_store));
    let dispatcher =
        ReceiptDispatcher::new(config, transport, fallback).expect("Invalid dispatch config");

    let app = routes::api_router(AppState::new(dispatcher, manual_store));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    TestApp {
        base_url: format!("http://{addr}"),
        client: reqwest::Client::new(),
        store,
    }
}

async fn printer_ok() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/print"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "printerId": "mock-printer",
            "timestamp": "2026-01-01T12:30:05Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_e2e_health_check() {
    let alpha = printer_ok().await;
    let beta = printer_ok().await;
    let app = spawn_app(&alpha, &beta).await;

    let response = app
        .client
        .get(format!("{}/health", app.base_url))
        .send()
        .await
        .expect("Health check failed");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["printers"]["total_destinations"], 2);
    assert_eq!(body["manual_queue_length"], 0);
}

#[tokio::test]
async fn test_e2e_dispatch_split_order() {
    let alpha = printer_ok().await;
    let beta = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/print"))
        .and(header("X-Destination-Id", "beta"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&beta)
        .await;
    let app = spawn_app(&alpha, &beta).await;

    let response = app
        .client
        .post(format!("{}/api/v1/orders/dispatch", app.base_url))
        .json(&split_order())
        .send()
        .await
        .expect("Dispatch request failed");

    assert_eq!(response.status(), 200);
    let summary: DispatchSummary = response.json().await.unwrap();
    assert_eq!(summary.token_number, "T100");
    assert_eq!(summary.report("alpha").unwrap().status, ReportStatus::Success);
    assert_eq!(summary.report("beta").unwrap().status, ReportStatus::Failed);

    let parked = app.store.records();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].destination_id, "beta");

    // Beta's breaker tripped, so the service reports itself degraded.
    let health = app
        .client
        .get(format!("{}/health", app.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(health.status(), 503);
    let body: Value = health.json().await.unwrap();
    assert_eq!(body["printers"]["destinations"][1]["circuit_state"], "open");
    assert_eq!(body["manual_queue_length"], 1);
}

#[tokio::test]
async fn test_e2e_rejects_order_without_items() {
    let alpha = printer_ok().await;
    let beta = printer_ok().await;
    let app = spawn_app(&alpha, &beta).await;

    let response = app
        .client
        .post(format!("{}/api/v1/orders/dispatch", app.base_url))
        .json(&order("E1", vec![]))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 422);
}

#[tokio::test]
async fn test_e2e_flush() {
    let alpha = printer_ok().await;
    let beta = printer_ok().await;
    let app = spawn_app(&alpha, &beta).await;

    let response = app
        .client
        .post(format!("{}/api/v1/admin/flush", app.base_url))
        .json(&json!({ "destination_id": "alpha" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["flushed"], 0);

    let response = app
        .client
        .post(format!("{}/api/v1/admin/flush", app.base_url))
        .json(&json!({ "destination_id": "nowhere" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}
