use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::models::job::PrintJob;
use crate::services::breaker::CircuitState;
use crate::services::manual_queue::{ManualPrintStore, ManualQueueError};
use crate::services::scheduler::DispatchScheduler;

/// Result of one pass over the manual-print store.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub delivered: usize,
    /// Replayed but failed again; these are parked again without new alerts.
    pub failed: usize,
    /// Put back untouched because the destination's breaker is still open.
    pub deferred: usize,
}

/// Replay up to `limit` parked receipts through the scheduler.
pub async fn reconcile_pass(
    scheduler: &Arc<DispatchScheduler>,
    store: &dyn ManualPrintStore,
    limit: usize,
) -> Result<ReconcileOutcome, ManualQueueError> {
    let mut outcome = ReconcileOutcome::default();
    let mut completions = Vec::new();

    for _ in 0..limit {
        let Some(record) = store.pop().await? else {
            break;
        };

        let breaker = scheduler.executor().breakers().snapshot(&record.destination_id);
        if breaker.state == CircuitState::Open {
            store.append(&record).await?;
            outcome.deferred += 1;
            continue;
        }

        tracing::info!(
            destination = %record.destination_id,
            token = %record.slice.token_number,
            original_job = %record.job_id,
            "Replaying manual print"
        );
        completions.push(scheduler.enqueue(PrintJob::replay(record.slice)));
    }

    for result in join_all(completions).await {
        match result {
            Ok(report) if report.succeeded() => outcome.delivered += 1,
            _ => outcome.failed += 1,
        }
    }

    tracing::info!(
        delivered = outcome.delivered,
        failed = outcome.failed,
        deferred = outcome.deferred,
        "Reconcile pass finished"
    );
    Ok(outcome)
}
