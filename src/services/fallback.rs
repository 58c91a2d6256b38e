//! Alternate alerts for receipts that could not be printed.
//!
//! Three independent actions run in order: SMS to the shop contact, email
//! with the full receipt, and a manual-print record. Each failure is logged
//! and the next action still runs.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::config::DestinationConfig;
use crate::models::dispatch::FailureReason;
use crate::models::job::PrintJob;
use crate::services::manual_queue::{ManualPrintRecord, ManualPrintStore};

/// SMS and email delivery. Wired to a real gateway by the deployment.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn send_sms(&self, to: &str, message: &str) -> Result<(), AlertError>;

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), AlertError>;
}

/// Writes alerts to the log only.
pub struct LogAlertChannel;

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn send_sms(&self, to: &str, message: &str) -> Result<(), AlertError> {
        tracing::warn!(to, message, "SMS alert (log channel)");
        Ok(())
    }

    async fn send_email(&self, to: &str, subject: &str, body: &str) -> Result<(), AlertError> {
        tracing::warn!(to, subject, body_len = body.len(), "Email alert (log channel)");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FallbackChannel {
    Sms,
    Email,
    ManualQueue,
}

/// Which fallback actions went through.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct FallbackReport {
    pub delivered: Vec<FallbackChannel>,
    pub failed: Vec<FallbackChannel>,
}

pub struct FallbackNotifier {
    alerts: Arc<dyn AlertChannel>,
    manual: Arc<dyn ManualPrintStore>,
}

impl FallbackNotifier {
    pub fn new(alerts: Arc<dyn AlertChannel>, manual: Arc<dyn ManualPrintStore>) -> Self {
        Self { alerts, manual }
    }

    /// Run all three actions for a terminally failed job. Never fails.
    ///
    /// Replayed jobs were alerted on when first parked, so they are only
    /// parked again.
    pub async fn notify(
        &self,
        destination: &DestinationConfig,
        job: &PrintJob,
        receipt: &str,
        reason: &FailureReason,
    ) -> FallbackReport {
        let slice = &job.slice;
        let mut report = FallbackReport::default();

        if job.replay {
            tracing::warn!(
                destination = %destination.id,
                job_id = %job.id,
                token = %slice.token_number,
                reason = %reason,
                "Replayed receipt still not printed, parking it again"
            );
        } else {
            tracing::error!(
                destination = %destination.id,
                job_id = %job.id,
                token = %slice.token_number,
                reason = %reason,
                "Receipt could not be printed, sending fallback alerts"
            );
            self.send_alerts(&mut report, destination, job, receipt).await;
        }

        let manual = ManualPrintRecord {
            job_id: job.id,
            destination_id: destination.id.clone(),
            slice: slice.clone(),
            receipt: receipt.to_string(),
            reason: reason.clone(),
            queued_at: Utc::now(),
        };
        let outcome = self.manual.append(&manual).await;
        record(
            &mut report,
            FallbackChannel::ManualQueue,
            destination,
            outcome.map_err(|e| e.to_string()),
        );

        report
    }

    async fn send_alerts(
        &self,
        report: &mut FallbackReport,
        destination: &DestinationConfig,
        job: &PrintJob,
        receipt: &str,
    ) {
        let slice = &job.slice;
        let customer = slice.customer.name.as_deref().unwrap_or("N/A");

        let sms = format!(
            "PRINTER DOWN at {}! New order: token {}, customer {}, items {}, total {:.2}. Check the printer now.",
            destination.name,
            slice.token_number,
            customer,
            slice.item_count(),
            slice.subtotal,
        );
        let outcome = self.alerts.send_sms(&destination.contact_phone, &sms).await;
        record(report, FallbackChannel::Sms, destination, outcome.map_err(|e| e.to_string()));

        let subject = format!("Printer failure - order token {}", slice.token_number);
        let outcome = self
            .alerts
            .send_email(&destination.contact_email, &subject, receipt)
            .await;
        record(report, FallbackChannel::Email, destination, outcome.map_err(|e| e.to_string()));
    }
}

fn record(
    report: &mut FallbackReport,
    channel: FallbackChannel,
    destination: &DestinationConfig,
    outcome: Result<(), String>,
) {
    let label = match &outcome {
        Ok(()) => "ok",
        Err(_) => "error",
    };
    metrics::counter!(
        "receipt_fallback_actions_total",
        "destination" => destination.id.clone(),
        "channel" => channel.as_ref().to_string(),
        "outcome" => label
    )
    .increment(1);

    match outcome {
        Ok(()) => {
            tracing::info!(destination = %destination.id, %channel, "Fallback action sent");
            report.delivered.push(channel);
        }
        Err(error) => {
            tracing::error!(destination = %destination.id, %channel, %error, "Fallback action failed");
            report.failed.push(channel);
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Alert rejected: {0}")]
    Rejected(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{CustomerInfo, OrderSlice};
    use crate::services::manual_queue::InMemoryManualPrintStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingAlerts {
        sms: AtomicUsize,
        email: AtomicUsize,
        fail_sms: bool,
    }

    #[async_trait]
    impl AlertChannel for CountingAlerts {
        async fn send_sms(&self, _to: &str, _message: &str) -> Result<(), AlertError> {
            self.sms.fetch_add(1, Ordering::SeqCst);
            if self.fail_sms {
                return Err(AlertError::Unavailable("gateway down".to_string()));
            }
            Ok(())
        }

        async fn send_email(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), AlertError> {
            self.email.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn job() -> PrintJob {
        PrintJob::new(OrderSlice {
            order_id: "o-1".to_string(),
            token_number: "C09".to_string(),
            customer: CustomerInfo {
                name: Some("Ravi".to_string()),
                ..CustomerInfo::default()
            },
            destination_id: "bites".to_string(),
            destination_name: "Bites and Bites".to_string(),
            items: Vec::new(),
            subtotal: 80.0,
            paid_at: None,
        })
    }

    #[tokio::test]
    async fn test_each_action_runs_once_even_when_sms_fails() {
        let alerts = Arc::new(CountingAlerts {
            fail_sms: true,
            ..CountingAlerts::default()
        });
        let store = Arc::new(InMemoryManualPrintStore::new());
        let notifier = FallbackNotifier::new(alerts.clone(), store.clone());
        let destination = DestinationConfig::new("bites", "Bites and Bites", "http://127.0.0.1:9/print");

        let report = notifier
            .notify(&destination, &job(), "receipt text", &FailureReason::CircuitOpen)
            .await;

        assert_eq!(alerts.sms.load(Ordering::SeqCst), 1);
        assert_eq!(alerts.email.load(Ordering::SeqCst), 1);
        assert_eq!(store.records().len(), 1);
        assert_eq!(report.failed, vec![FallbackChannel::Sms]);
        assert_eq!(
            report.delivered,
            vec![FallbackChannel::Email, FallbackChannel::ManualQueue]
        );
    }

    #[tokio::test]
    async fn test_manual_record_carries_receipt_and_reason() {
        let store = Arc::new(InMemoryManualPrintStore::new());
        let notifier = FallbackNotifier::new(Arc::new(LogAlertChannel), store.clone());
        let destination = DestinationConfig::new("bites", "Bites and Bites", "http://127.0.0.1:9/print");
        let reason = FailureReason::Exhausted {
            attempts: 3,
            last_error: "timeout".to_string(),
        };

        notifier.notify(&destination, &job(), "receipt text", &reason).await;

        let records = store.records();
        assert_eq!(records[0].receipt, "receipt text");
        assert_eq!(records[0].reason, reason);
        assert_eq!(records[0].slice.token_number, "C09");
    }

    #[tokio::test]
    async fn test_replayed_job_is_parked_without_alerts() {
        let alerts = Arc::new(CountingAlerts::default());
        let store = Arc::new(InMemoryManualPrintStore::new());
        let notifier = FallbackNotifier::new(alerts.clone(), store.clone());
        let destination = DestinationConfig::new("bites", "Bites and Bites", "http://127.0.0.1:9/print");
        let replayed = PrintJob::replay(job().slice);

        let report = notifier
            .notify(&destination, &replayed, "receipt text", &FailureReason::CircuitOpen)
            .await;

        assert_eq!(alerts.sms.load(Ordering::SeqCst), 0);
        assert_eq!(alerts.email.load(Ordering::SeqCst), 0);
        assert_eq!(store.records().len(), 1);
        assert_eq!(report.delivered, vec![FallbackChannel::ManualQueue]);
    }
}
