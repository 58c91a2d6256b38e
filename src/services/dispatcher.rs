use std::sync::Arc;

use futures::future::join_all;
use tokio::time::{timeout_at, Instant};

use crate::config::{ConfigError, DispatchConfig};
use crate::models::dispatch::{DestinationReport, DispatchSummary, FailureReason, JobReport, ReportStatus};
use crate::models::job::PrintJob;
use crate::models::order::Order;
use crate::services::delivery::DeliveryExecutor;
use crate::services::fallback::FallbackNotifier;
use crate::services::scheduler::DispatchScheduler;
use crate::services::transport::PrinterTransport;

/// Entry point for the payment-success flow.
///
/// Owns the scheduler (and through it the breakers, statistics and queues),
/// so independent dispatchers never share state.
pub struct ReceiptDispatcher {
    config: Arc<DispatchConfig>,
    scheduler: Arc<DispatchScheduler>,
}

impl ReceiptDispatcher {
    pub fn new(
        config: DispatchConfig,
        transport: Arc<dyn PrinterTransport>,
        fallback: FallbackNotifier,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let config = Arc::new(config);
        let executor = DeliveryExecutor::new(Arc::clone(&config), transport, Arc::new(fallback));
        let scheduler = Arc::new(DispatchScheduler::new(executor));
        Ok(Self { config, scheduler })
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Arc<DispatchScheduler> {
        &self.scheduler
    }

    /// Queue one receipt per destination and wait for them, but never longer
    /// than the safety timeout. Jobs still running at the timeout are
    /// reported as `pending` and keep running in the background.
    pub async fn dispatch_receipts(&self, order: &Order) -> DispatchSummary {
        let deadline = Instant::now() + self.config.safety_timeout;
        let slices = order.split_by_destination();

        tracing::info!(
            order_id = %order.order_id,
            token = %order.token_number,
            destinations = slices.len(),
            "Dispatching receipts"
        );

        let waits = slices.into_iter().map(|slice| {
            let job = PrintJob::new(slice);
            let job_id = job.id;
            let destination_id = job.destination_id.clone();
            let completion = self.scheduler.enqueue(job);

            async move {
                match timeout_at(deadline, completion).await {
                    Ok(Ok(report)) => destination_report(report),
                    Ok(Err(_)) => DestinationReport {
                        destination_id,
                        job_id: Some(job_id),
                        status: ReportStatus::Failed,
                        error: Some(FailureReason::Abandoned.to_string()),
                    },
                    Err(_) => DestinationReport {
                        destination_id,
                        job_id: Some(job_id),
                        status: ReportStatus::Pending,
                        error: None,
                    },
                }
            }
        });

        // Enqueue everything before waiting on anything.
        let waits: Vec<_> = waits.collect();
        let reports = join_all(waits).await;
        let timed_out = reports.iter().any(|r| r.status == ReportStatus::Pending);

        let summary = DispatchSummary {
            order_id: order.order_id.clone(),
            token_number: order.token_number.clone(),
            reports,
            timed_out,
        };

        tracing::info!(
            order_id = %summary.order_id,
            succeeded = summary.count(ReportStatus::Success),
            failed = summary.count(ReportStatus::Failed),
            pending = summary.count(ReportStatus::Pending),
            "Receipt dispatch summary"
        );

        summary
    }
}

fn destination_report(report: JobReport) -> DestinationReport {
    let status = if report.succeeded() {
        ReportStatus::Success
    } else {
        ReportStatus::Failed
    };
    DestinationReport {
        destination_id: report.destination_id,
        job_id: Some(report.job_id),
        status,
        error: report.failure.map(|f| f.to_string()),
    }
}
