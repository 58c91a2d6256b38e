use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use receipt_dispatch::{
    app_state::AppState,
    config::AppConfig,
    routes::{self, metrics::MetricsState},
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let config = AppConfig::from_env()?;

    tracing::info!(low_latency = config.low_latency, "Initializing receipt-dispatch server");

    let prometheus_handle = Arc::new(PrometheusBuilder::new().install_recorder()?);

    metrics::describe_counter!("receipt_jobs_enqueued_total", "Print jobs queued per shop");
    metrics::describe_counter!("receipt_jobs_completed_total", "Print jobs delivered per shop");
    metrics::describe_counter!("receipt_jobs_failed_total", "Print jobs that ended failed, by reason");
    metrics::describe_counter!("receipt_delivery_attempts_total", "Network delivery attempts per shop");
    metrics::describe_histogram!("receipt_delivery_seconds", "Duration of successful deliveries");
    metrics::describe_gauge!("receipt_queue_depth", "Jobs waiting in each shop queue");
    metrics::describe_counter!("receipt_fallback_actions_total", "Fallback alerts by channel and outcome");
    metrics::describe_counter!("receipt_circuit_opened_total", "Times a shop's circuit breaker opened");
    metrics::describe_gauge!("receipt_circuit_state", "Breaker state per shop (0 closed, 1 half-open, 2 open)");

    let state = AppState::from_config(&config)?;

    for destination in &state.dispatcher.config().destinations {
        tracing::info!(
            destination = %destination.id,
            print_url = %destination.print_url,
            "Printer configured"
        );
    }

    let metrics_state = MetricsState {
        prometheus: prometheus_handle,
        dispatcher: Arc::clone(&state.dispatcher),
    };

    let app = routes::api_router(state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(metrics_state),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(256 * 1024));

    tracing::info!("Starting receipt-dispatch on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;
    Ok(())
}
