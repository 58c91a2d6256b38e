use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::OrderSlice;

/// Status of a print job while it moves through its destination queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Retrying,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// One receipt for one destination for one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintJob {
    pub id: Uuid,
    pub destination_id: String,
    pub slice: OrderSlice,
    /// Delivery attempts that actually reached the network.
    pub attempts: u32,
    pub status: JobStatus,
    pub enqueued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Re-dispatched from the manual-print store.
    #[serde(default)]
    pub replay: bool,
}

impl PrintJob {
    pub fn new(slice: OrderSlice) -> Self {
        Self {
            id: Uuid::new_v4(),
            destination_id: slice.destination_id.clone(),
            slice,
            attempts: 0,
            status: JobStatus::Queued,
            enqueued_at: Utc::now(),
            started_at: None,
            completed_at: None,
            replay: false,
        }
    }

    /// A job for a receipt that was parked for manual printing earlier.
    pub fn replay(slice: OrderSlice) -> Self {
        Self {
            replay: true,
            ..Self::new(slice)
        }
    }
}
