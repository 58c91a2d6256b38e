use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::config::{DestinationConfig, DispatchConfig};
use crate::models::dispatch::{DeliveryReceipt, FailureReason};
use crate::models::job::PrintJob;
use crate::services::breaker::{CircuitState, HealthTracker};
use crate::services::fallback::FallbackNotifier;
use crate::services::receipt::{estimate_prep_minutes, render_receipt};
use crate::services::stats::StatsRegistry;
use crate::services::transport::{PrintRequest, PrinterTransport, ShopNotification, TransportError};

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    Delivered(DeliveryReceipt),
    /// The printer was contacted (or timed out) and did not accept the receipt.
    Failed { error: String, retryable: bool },
    /// Rejected by the breaker without touching the network.
    CircuitOpen,
}

/// Performs delivery attempts and reports their outcomes to the breaker,
/// the statistics and the fallback notifier.
pub struct DeliveryExecutor {
    config: Arc<DispatchConfig>,
    transport: Arc<dyn PrinterTransport>,
    breakers: HealthTracker,
    stats: StatsRegistry,
    fallback: Arc<FallbackNotifier>,
}

impl DeliveryExecutor {
    pub fn new(
        config: Arc<DispatchConfig>,
        transport: Arc<dyn PrinterTransport>,
        fallback: Arc<FallbackNotifier>,
    ) -> Self {
        let breakers = HealthTracker::new(
            config.breaker.clone(),
            config.destinations.iter().map(|d| d.id.as_str()),
        );
        Self {
            config,
            transport,
            breakers,
            stats: StatsRegistry::default(),
            fallback,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn breakers(&self) -> &HealthTracker {
        &self.breakers
    }

    pub fn stats(&self) -> &StatsRegistry {
        &self.stats
    }

    /// One attempt, bounded by the attempt timeout and by `budget` (what is
    /// left of the job's deadline). Increments `job.attempts` only when the
    /// network is contacted. In `half_open` the attempt is the single trial
    /// and its failure is not retryable.
    pub async fn attempt_delivery(&self, job: &mut PrintJob, budget: Duration) -> AttemptOutcome {
        let Some(destination) = self.config.destination(&job.destination_id) else {
            return AttemptOutcome::Failed {
                error: format!("destination `{}` is not configured", job.destination_id),
                retryable: false,
            };
        };

        let state = self.breakers.query(&destination.id);
        if state == CircuitState::Open {
            tracing::warn!(
                destination = %destination.id,
                job_id = %job.id,
                "Circuit open, skipping printer"
            );
            return AttemptOutcome::CircuitOpen;
        }

        job.attempts += 1;
        let attempt = job.attempts;
        let receipt = render_receipt(&job.slice, &self.config.receipt);
        let request_id = format!("{}_{}_{}", destination.id, job.id.simple(), attempt);
        let request = PrintRequest::receipt(
            &destination.id,
            &job.slice.token_number,
            receipt,
            request_id.clone(),
            attempt,
        );
        let timeout = self.config.retry.attempt_timeout.min(budget);

        metrics::counter!("receipt_delivery_attempts_total", "destination" => destination.id.clone())
            .increment(1);
        tracing::info!(
            destination = %destination.id,
            job_id = %job.id,
            token = %job.slice.token_number,
            attempt,
            max_attempts = self.config.retry.max_attempts,
            circuit = %state,
            "Sending receipt to printer"
        );

        let result = match tokio::time::timeout(timeout, self.transport.print(destination, &request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(timeout)),
        };

        match result {
            Ok(ack) => AttemptOutcome::Delivered(DeliveryReceipt {
                delivery_id: ack
                    .delivery_id
                    .unwrap_or_else(|| format!("printer_{}", destination.id)),
                request_id,
                delivered_at: ack.timestamp.unwrap_or_else(Utc::now),
            }),
            Err(e) => {
                tracing::warn!(
                    destination = %destination.id,
                    job_id = %job.id,
                    attempt,
                    error = %e,
                    "Print attempt failed"
                );
                AttemptOutcome::Failed {
                    error: e.to_string(),
                    retryable: state == CircuitState::Closed,
                }
            }
        }
    }

    /// Close the breaker, update statistics and ping the shop display.
    pub fn report_success(&self, job: &PrintJob, duration: Duration) {
        self.breakers.record_success(&job.destination_id);
        let stats = self.stats.record(&job.destination_id, true, duration);

        metrics::histogram!("receipt_delivery_seconds", "destination" => job.destination_id.clone())
            .record(duration.as_secs_f64());
        tracing::debug!(
            destination = %job.destination_id,
            processed = stats.processed,
            failed = stats.failed,
            avg_ms = stats.avg_duration_ms as u64,
            "Queue stats updated"
        );

        if let Some(destination) = self.config.destination(&job.destination_id) {
            self.spawn_shop_notification(destination.clone(), job);
        }
    }

    /// Record a terminal failure and run the fallback alerts.
    ///
    /// Only genuine delivery failures count against the breaker. The
    /// fallback runs on its own task; this waits at most the fallback grace
    /// period for it.
    pub async fn report_failure(&self, job: &PrintJob, reason: &FailureReason) {
        match reason {
            FailureReason::Exhausted { .. } => {
                self.breakers.record_failure(&job.destination_id);
                self.stats.record(&job.destination_id, false, Duration::ZERO);
            }
            FailureReason::CircuitOpen | FailureReason::Internal { .. } => {
                self.stats.record(&job.destination_id, false, Duration::ZERO);
            }
            FailureReason::Flushed
            | FailureReason::UnknownDestination { .. }
            | FailureReason::Abandoned => {}
        }

        let Some(destination) = self.config.destination(&job.destination_id).cloned() else {
            tracing::error!(
                destination = %job.destination_id,
                job_id = %job.id,
                "No contact details for destination, fallback skipped"
            );
            return;
        };

        let receipt = render_receipt(&job.slice, &self.config.receipt);
        let notifier = Arc::clone(&self.fallback);
        let job = job.clone();
        let reason = reason.clone();
        let task = tokio::spawn(async move {
            notifier.notify(&destination, &job, &receipt, &reason).await
        });

        match tokio::time::timeout(self.config.fallback_grace, task).await {
            Ok(Ok(report)) => {
                tracing::debug!(?report, "Fallback finished");
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Fallback task aborted");
            }
            Err(_) => {
                tracing::warn!(
                    grace_ms = self.config.fallback_grace.as_millis() as u64,
                    "Fallback still running, continuing in background"
                );
            }
        }
    }

    fn spawn_shop_notification(&self, destination: DestinationConfig, job: &PrintJob) {
        let slice = job.slice.clone();
        let transport = Arc::clone(&self.transport);
        let timeout = self.config.notify_timeout;

        tokio::spawn(async move {
            let notification = ShopNotification {
                kind: "NEW_ORDER".to_string(),
                token_number: slice.token_number.clone(),
                customer_name: slice.customer.name.clone().unwrap_or_else(|| "N/A".to_string()),
                item_count: slice.item_count(),
                total_amount: slice.subtotal,
                estimated_time: estimate_prep_minutes(&slice.items),
                priority: "normal".to_string(),
                timestamp: Utc::now(),
            };

            match tokio::time::timeout(timeout, transport.notify(&destination, &notification)).await {
                Ok(Ok(())) => {
                    tracing::info!(destination = %destination.id, token = %notification.token_number, "Shop display notified");
                }
                Ok(Err(e)) => {
                    tracing::warn!(destination = %destination.id, error = %e, "Failed to notify shop display");
                }
                Err(_) => {
                    tracing::warn!(destination = %destination.id, "Shop display notification timed out");
                }
            }
        });
    }
}
