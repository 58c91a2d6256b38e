use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::JobStatus;

/// Acknowledgement returned by a printer that accepted a receipt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeliveryReceipt {
    pub delivery_id: String,
    pub request_id: String,
    pub delivered_at: DateTime<Utc>,
}

/// Why a job ended in the `failed` state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The breaker was open; the printer was never contacted.
    #[error("printer circuit breaker is open, printer was not contacted")]
    CircuitOpen,

    #[error("delivery failed after {attempts} attempt(s): {last_error}")]
    Exhausted { attempts: u32, last_error: String },

    #[error("destination `{destination_id}` is not configured")]
    UnknownDestination { destination_id: String },

    #[error("job was flushed from the queue before delivery")]
    Flushed,

    #[error("job was dropped before reaching a terminal state")]
    Abandoned,

    /// The attempt task died; the printer may or may not have printed.
    #[error("delivery task failed: {message}")]
    Internal { message: String },
}

impl FailureReason {
    /// Short label used for metrics and logs.
    pub fn tag(&self) -> &'static str {
        match self {
            FailureReason::CircuitOpen => "circuit_open",
            FailureReason::Exhausted { .. } => "exhausted",
            FailureReason::UnknownDestination { .. } => "unknown_destination",
            FailureReason::Flushed => "flushed",
            FailureReason::Abandoned => "abandoned",
            FailureReason::Internal { .. } => "internal",
        }
    }
}

/// Terminal outcome of a print job, handed to whoever enqueued it and to
/// completion subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub job_id: Uuid,
    pub destination_id: String,
    pub order_id: String,
    pub token_number: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub delivery: Option<DeliveryReceipt>,
    pub failure: Option<FailureReason>,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Completed
    }
}

/// Per-destination line of a dispatch summary.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Failed,
    /// Still running when the safety timeout elapsed.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationReport {
    pub destination_id: String,
    pub job_id: Option<Uuid>,
    pub status: ReportStatus,
    pub error: Option<String>,
}

/// What the payment-success flow gets back from a dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub order_id: String,
    pub token_number: String,
    pub reports: Vec<DestinationReport>,
    /// True when at least one job was still running at the safety timeout.
    pub timed_out: bool,
}

impl DispatchSummary {
    pub fn report(&self, destination_id: &str) -> Option<&DestinationReport> {
        self.reports
            .iter()
            .find(|r| r.destination_id == destination_id)
    }

    pub fn all_succeeded(&self) -> bool {
        self.reports.iter().all(|r| r.status == ReportStatus::Success)
    }

    pub fn count(&self, status: ReportStatus) -> usize {
        self.reports.iter().filter(|r| r.status == status).count()
    }
}
