use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;

use crate::config::PacingPolicy;

/// Rolling delivery statistics for one destination. Advisory only.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
pub struct QueueStats {
    pub processed: u64,
    pub failed: u64,
    /// Halved-weight moving average of successful delivery durations.
    pub avg_duration_ms: f64,
}

impl QueueStats {
    pub fn record(&mut self, success: bool, duration: Duration) {
        self.processed += 1;
        if !success {
            self.failed += 1;
        }

        let ms = duration.as_secs_f64() * 1000.0;
        if success && ms > 0.0 {
            self.avg_duration_ms = if self.avg_duration_ms == 0.0 {
                ms
            } else {
                (self.avg_duration_ms + ms) / 2.0
            };
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.processed == 0 {
            0.0
        } else {
            self.failed as f64 / self.processed as f64
        }
    }

    pub fn success_rate_percent(&self) -> Option<f64> {
        (self.processed > 0).then(|| (1.0 - self.failure_rate()) * 100.0)
    }
}

/// `base + failure_rate * failure_penalty + slow_penalty when slow`, capped.
pub fn pacing_delay(stats: &QueueStats, policy: &PacingPolicy) -> Duration {
    let mut delay = policy.base + policy.failure_penalty.mul_f64(stats.failure_rate());
    if stats.avg_duration_ms > policy.slow_threshold.as_secs_f64() * 1000.0 {
        delay += policy.slow_penalty;
    }
    delay.min(policy.max)
}

#[derive(Default)]
pub struct StatsRegistry {
    stats: Mutex<HashMap<String, QueueStats>>,
}

impl StatsRegistry {
    pub fn record(&self, destination: &str, success: bool, duration: Duration) -> QueueStats {
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = stats.entry(destination.to_string()).or_default();
        entry.record(success, duration);
        *entry
    }

    pub fn get(&self, destination: &str) -> QueueStats {
        let stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.get(destination).copied().unwrap_or_default()
    }
}
