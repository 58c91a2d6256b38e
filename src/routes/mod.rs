use axum::{routing::get, routing::post, Router};

use crate::app_state::AppState;

pub mod dispatch;
pub mod health;
pub mod metrics;

/// Health, dispatch and admin routes. The binary adds `/metrics` and layers.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/api/v1/orders/dispatch", post(dispatch::dispatch_order))
        .route("/api/v1/admin/flush", post(dispatch::flush_queues))
        .with_state(state)
}
