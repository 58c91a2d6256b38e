//! Per-destination circuit breaker.
//!
//! `closed` lets every attempt through. Reaching the failure threshold opens
//! the breaker for a cooldown; the first `query` after the cooldown moves it
//! to `half_open`, where a single trial decides between `closed` and a fresh
//! `open`. `query`, `record_success` and `record_failure` are the only
//! mutators.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use crate::config::BreakerSettings;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
struct Breaker {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    cooldown_until: Option<Instant>,
}

impl Default for Breaker {
    fn default() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            cooldown_until: None,
        }
    }
}

/// Read-only copy of a breaker, for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

pub struct HealthTracker {
    settings: BreakerSettings,
    breakers: Mutex<HashMap<String, Breaker>>,
}

impl HealthTracker {
    /// Start every known destination closed with no failures.
    pub fn new<'a>(settings: BreakerSettings, destinations: impl IntoIterator<Item = &'a str>) -> Self {
        let breakers = destinations
            .into_iter()
            .map(|id| (id.to_string(), Breaker::default()))
            .collect();
        Self {
            settings,
            breakers: Mutex::new(breakers),
        }
    }

    /// Current state of a destination. Moves `open` to `half_open` once the
    /// cooldown has elapsed.
    pub fn query(&self, destination: &str) -> CircuitState {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.entry(destination.to_string()).or_default();

        if breaker.state == CircuitState::Open {
            let cooled_down = breaker
                .cooldown_until
                .map_or(true, |until| Instant::now() >= until);
            if cooled_down {
                breaker.state = CircuitState::HalfOpen;
                tracing::info!(destination, "Circuit breaker moving to half-open");
            }
        }

        breaker.state
    }

    pub fn record_success(&self, destination: &str) {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.entry(destination.to_string()).or_default();

        if breaker.state != CircuitState::Closed {
            tracing::info!(destination, "Circuit breaker closing after successful delivery");
        }

        breaker.state = CircuitState::Closed;
        breaker.consecutive_failures = 0;
        breaker.last_failure_at = None;
        breaker.cooldown_until = None;
    }

    pub fn record_failure(&self, destination: &str) {
        let mut breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.entry(destination.to_string()).or_default();

        breaker.consecutive_failures = breaker.consecutive_failures.saturating_add(1);
        breaker.last_failure_at = Some(Utc::now());

        let trips = match breaker.state {
            CircuitState::HalfOpen | CircuitState::Open => true,
            CircuitState::Closed => breaker.consecutive_failures >= self.settings.failure_threshold,
        };

        if trips {
            let reopened = breaker.state != CircuitState::Closed;
            breaker.state = CircuitState::Open;
            breaker.cooldown_until = Some(Instant::now() + self.settings.cooldown);
            metrics::counter!("receipt_circuit_opened_total", "destination" => destination.to_string())
                .increment(1);
            tracing::warn!(
                destination,
                failures = breaker.consecutive_failures,
                cooldown_ms = self.settings.cooldown.as_millis() as u64,
                reopened,
                "Circuit breaker opened"
            );
        }
    }

    /// Snapshot without side effects; an expired cooldown still reads `open`
    /// until the next `query`.
    pub fn snapshot(&self, destination: &str) -> BreakerSnapshot {
        let breakers = self.breakers.lock().unwrap_or_else(PoisonError::into_inner);
        let breaker = breakers.get(destination).cloned().unwrap_or_default();
        BreakerSnapshot {
            state: breaker.state,
            consecutive_failures: breaker.consecutive_failures,
            last_failure_at: breaker.last_failure_at,
        }
    }
}
