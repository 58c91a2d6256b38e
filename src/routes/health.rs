use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::app_state::AppState;
use crate::models::health::{OverallHealth, SystemStatus};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub printers: SystemStatus,
    pub manual_store: ComponentHealth,
    pub manual_queue_length: Option<u64>,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    pub status: String,
    pub latency_ms: Option<u64>,
}

/// GET /health: printer health with breaker and queue status per shop.
///
/// Only the printers decide the status code; an unreachable manual-print
/// store is reported but does not stop receipts from being dispatched.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let printers = state.dispatcher.scheduler().system_status();

    let store_start = std::time::Instant::now();
    let (manual_store, manual_queue_length) = match state.manual_store.health_check().await {
        Ok(()) => {
            let latency_ms = Some(store_start.elapsed().as_millis() as u64);
            match state.manual_store.len().await {
                Ok(len) => (
                    ComponentHealth {
                        status: "ok".to_string(),
                        latency_ms,
                    },
                    Some(len),
                ),
                Err(e) => {
                    tracing::warn!(error = %e, "Manual-print store length unavailable");
                    (
                        ComponentHealth {
                            status: "error".to_string(),
                            latency_ms,
                        },
                        None,
                    )
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Manual-print store unreachable");
            (
                ComponentHealth {
                    status: "error".to_string(),
                    latency_ms: None,
                },
                None,
            )
        }
    };

    let status_code = if printers.overall == OverallHealth::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: printers.overall.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        printers,
        manual_store,
        manual_queue_length,
    };

    (status_code, Json(response))
}
