use receipt_dispatch::{
    app_state::AppState, config::AppConfig, services::reconcile::reconcile_pass,
};
use std::time::Duration;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting manual-print reconcile worker");

    let config = AppConfig::from_env()?;
    if config.redis_url.is_none() {
        tracing::warn!("REDIS_URL not set, nothing to reconcile across restarts");
    }

    let state = AppState::from_config(&config)?;
    let scheduler = state.dispatcher.scheduler();

    tracing::info!("Reconcile worker ready, starting replay loop");

    loop {
        match state.manual_store.len().await {
            Ok(0) => {
                tracing::trace!("No manual prints pending, sleeping");
            }
            Ok(pending) => {
                // Only what was parked before this pass; failed replays are re-parked.
                let limit = usize::try_from(pending).unwrap_or(usize::MAX);
                match reconcile_pass(scheduler, state.manual_store.as_ref(), limit).await {
                    Ok(outcome) => {
                        tracing::info!(
                            pending,
                            delivered = outcome.delivered,
                            failed = outcome.failed,
                            deferred = outcome.deferred,
                            "Reconcile pass complete"
                        );
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Reconcile pass failed, will retry");
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Manual-print store unreachable, will retry");
            }
        }

        sleep(Duration::from_secs(POLL_INTERVAL_SECS)).await;
    }
}
