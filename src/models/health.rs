use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::services::breaker::CircuitState;

/// Point-in-time view of one destination, for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct DestinationHealth {
    pub destination_id: String,
    pub name: String,
    pub circuit_state: CircuitState,
    pub queue_length: usize,
    pub in_flight: bool,
    pub consecutive_failures: u32,
    /// Percentage of processed jobs that succeeded, `None` before the first job.
    pub success_rate: Option<f64>,
    pub avg_response_ms: u64,
    pub last_failure_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Critical,
}

impl OverallHealth {
    /// Healthy when every breaker is closed, degraded while more than half are.
    pub fn from_counts(closed: usize, total: usize) -> Self {
        if closed == total {
            OverallHealth::Healthy
        } else if closed * 2 > total {
            OverallHealth::Degraded
        } else {
            OverallHealth::Critical
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub timestamp: DateTime<Utc>,
    pub overall: OverallHealth,
    pub healthy_destinations: usize,
    pub total_destinations: usize,
    pub total_queue_length: usize,
    pub destinations: Vec<DestinationHealth>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overall_health_thresholds() {
        assert_eq!(OverallHealth::from_counts(4, 4), OverallHealth::Healthy);
        assert_eq!(OverallHealth::from_counts(3, 4), OverallHealth::Degraded);
        assert_eq!(OverallHealth::from_counts(2, 4), OverallHealth::Critical);
        assert_eq!(OverallHealth::from_counts(0, 0), OverallHealth::Healthy);
    }
}
