use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::dispatch::DispatchSummary;
use crate::models::order::Order;

/// POST /api/v1/orders/dispatch: print receipts for a paid order.
///
/// Always answers 200 for a valid order; per-shop failures are in the summary.
pub async fn dispatch_order(
    State(state): State<AppState>,
    Json(order): Json<Order>,
) -> Result<Json<DispatchSummary>, (StatusCode, String)> {
    order
        .validate()
        .map_err(|report| (StatusCode::UNPROCESSABLE_ENTITY, report.to_string()))?;

    let summary = state.dispatcher.dispatch_receipts(&order).await;
    Ok(Json(summary))
}

#[derive(Debug, Default, Deserialize)]
pub struct FlushRequest {
    /// Flush only this destination; every destination when absent.
    pub destination_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    pub flushed: usize,
}

/// POST /api/v1/admin/flush: drop queued jobs into the manual-print path.
pub async fn flush_queues(
    State(state): State<AppState>,
    Json(request): Json<FlushRequest>,
) -> Result<Json<FlushResponse>, StatusCode> {
    let scheduler = state.dispatcher.scheduler();

    if let Some(id) = &request.destination_id {
        if state.dispatcher.config().destination(id).is_none() {
            return Err(StatusCode::NOT_FOUND);
        }
    }

    let flushed = scheduler.flush(request.destination_id.as_deref()).await;
    Ok(Json(FlushResponse { flushed }))
}
