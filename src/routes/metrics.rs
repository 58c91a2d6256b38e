use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::services::breaker::CircuitState;
use crate::services::dispatcher::ReceiptDispatcher;

#[derive(Clone)]
pub struct MetricsState {
    pub prometheus: Arc<PrometheusHandle>,
    pub dispatcher: Arc<ReceiptDispatcher>,
}

/// Prometheus scrape endpoint. Breaker states are sampled at scrape time
/// (0 closed, 1 half-open, 2 open).
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    for destination in state.dispatcher.scheduler().system_status().destinations {
        let value = match destination.circuit_state {
            CircuitState::Closed => 0.0,
            CircuitState::HalfOpen => 1.0,
            CircuitState::Open => 2.0,
        };
        metrics::gauge!("receipt_circuit_state", "destination" => destination.destination_id)
            .set(value);
    }

    state.prometheus.render()
}
