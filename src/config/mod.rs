use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::services::receipt::ReceiptTemplate;

/// Process configuration read from the environment (and `.env`).
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Unused by the reconcile binary.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// JSON file with the destination list. The reference shops are used when unset.
    pub destinations_file: Option<String>,

    /// Redis connection string for the manual-print store. In-memory when unset.
    pub redis_url: Option<String>,

    /// Use short timeouts and a single attempt (local development, demos).
    #[serde(default)]
    pub low_latency: bool,

    /// Simulate every printer instead of calling the shop LAN.
    #[serde(default)]
    pub mock_printers: bool,

    pub retry_attempts: Option<u32>,
    pub attempt_timeout_ms: Option<u64>,
    pub backoff_base_ms: Option<u64>,
    pub job_timeout_ms: Option<u64>,
    pub failure_threshold: Option<u32>,
    pub cooldown_ms: Option<u64>,
    pub safety_timeout_ms: Option<u64>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build the dispatch configuration: profile defaults, then destinations,
    /// then any explicit overrides.
    pub fn dispatch_config(&self) -> Result<DispatchConfig, ConfigError> {
        let mut config = if self.low_latency {
            DispatchConfig::low_latency()
        } else {
            DispatchConfig::default()
        };

        if let Some(path) = &self.destinations_file {
            config.destinations = load_destinations(Path::new(path))?;
        }

        if let Some(v) = self.retry_attempts {
            config.retry.max_attempts = v;
        }
        if let Some(v) = self.attempt_timeout_ms {
            config.retry.attempt_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.backoff_base_ms {
            config.retry.base_delay = Duration::from_millis(v);
        }
        if let Some(v) = self.job_timeout_ms {
            config.retry.job_timeout = Duration::from_millis(v);
        }
        if let Some(v) = self.failure_threshold {
            config.breaker.failure_threshold = v;
        }
        if let Some(v) = self.cooldown_ms {
            config.breaker.cooldown = Duration::from_millis(v);
        }
        if let Some(v) = self.safety_timeout_ms {
            config.safety_timeout = Duration::from_millis(v);
        }

        config.validate()?;
        Ok(config)
    }
}

/// A shop printer the dispatcher can deliver to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DestinationConfig {
    pub id: String,
    pub name: String,
    /// Receipt endpoint, e.g. `http://192.168.1.100:8080/print`.
    pub print_url: String,
    /// Display endpoint. Derived from `print_url` when omitted.
    #[serde(default)]
    pub notify_url: Option<String>,
    pub contact_phone: String,
    pub contact_email: String,
}

impl DestinationConfig {
    pub fn new(id: &str, name: &str, print_url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            print_url: print_url.to_string(),
            notify_url: None,
            contact_phone: DEFAULT_CONTACT_PHONE.to_string(),
            contact_email: DEFAULT_CONTACT_EMAIL.to_string(),
        }
    }

    /// The configured notify URL, or the print URL with a trailing `/print`
    /// swapped for `/notify`.
    pub fn notify_endpoint(&self) -> String {
        if let Some(url) = &self.notify_url {
            return url.clone();
        }
        match self.print_url.strip_suffix("/print") {
            Some(base) => format!("{base}/notify"),
            None => format!("{}/notify", self.print_url.trim_end_matches('/')),
        }
    }
}

const DEFAULT_CONTACT_PHONE: &str = "+91-8306461994";
const DEFAULT_CONTACT_EMAIL: &str = "orders@foodstreet.example";

/// The four shops of the reference deployment.
pub fn reference_destinations() -> Vec<DestinationConfig> {
    vec![
        DestinationConfig::new("zuzu", "ZUZU", "http://192.168.1.100:8080/print"),
        DestinationConfig::new("oasis", "Oasis Kitchen", "http://192.168.1.101:8080/print"),
        DestinationConfig::new("bites", "Bites and Bites", "http://192.168.1.102:8080/print"),
        DestinationConfig::new("shakers", "Shakers and Movers", "http://192.168.1.103:8080/print"),
    ]
}

/// Read a JSON array of destinations from disk.
pub fn load_destinations(path: &Path) -> Result<Vec<DestinationConfig>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(ConfigError::Parse)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Network attempts per job, including the first.
    pub max_attempts: u32,
    pub attempt_timeout: Duration,
    /// Delay after the first failed attempt; doubles after each further one.
    pub base_delay: Duration,
    /// Hard bound on the time one job may spend being attempted.
    pub job_timeout: Duration,
}

impl RetryPolicy {
    /// `base_delay * 2^(attempt-1)` for the attempt that just failed.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

/// Spacing between two jobs on the same destination.
#[derive(Debug, Clone, PartialEq)]
pub struct PacingPolicy {
    pub base: Duration,
    /// Scaled by the destination's failure rate (0.0..=1.0).
    pub failure_penalty: Duration,
    pub slow_threshold: Duration,
    pub slow_penalty: Duration,
    pub max: Duration,
}

/// Everything the dispatch core needs, with the production defaults.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub destinations: Vec<DestinationConfig>,
    pub retry: RetryPolicy,
    pub breaker: BreakerSettings,
    pub pacing: PacingPolicy,
    /// How long `dispatch_receipts` waits before reporting jobs as pending.
    pub safety_timeout: Duration,
    /// How long a terminal failure waits on the fallback alerts.
    pub fallback_grace: Duration,
    pub notify_timeout: Duration,
    pub receipt: ReceiptTemplate,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            destinations: reference_destinations(),
            retry: RetryPolicy {
                max_attempts: 3,
                attempt_timeout: Duration::from_secs(10),
                base_delay: Duration::from_millis(2000),
                job_timeout: Duration::from_secs(45),
            },
            breaker: BreakerSettings {
                failure_threshold: 3,
                cooldown: Duration::from_secs(30),
            },
            pacing: PacingPolicy {
                base: Duration::from_millis(200),
                failure_penalty: Duration::from_millis(1000),
                slow_threshold: Duration::from_millis(3000),
                slow_penalty: Duration::from_millis(500),
                max: Duration::from_millis(2000),
            },
            safety_timeout: Duration::from_secs(10),
            fallback_grace: Duration::from_secs(2),
            notify_timeout: Duration::from_secs(5),
            receipt: ReceiptTemplate::default(),
        }
    }
}

impl DispatchConfig {
    /// Single attempt with short timeouts, for development and tests.
    pub fn low_latency() -> Self {
        let mut config = Self::default();
        config.retry.max_attempts = 1;
        config.retry.attempt_timeout = Duration::from_secs(3);
        config.retry.base_delay = Duration::from_millis(500);
        config.retry.job_timeout = Duration::from_secs(5);
        config
    }

    pub fn with_destinations(mut self, destinations: Vec<DestinationConfig>) -> Self {
        self.destinations = destinations;
        self
    }

    pub fn destination(&self, id: &str) -> Option<&DestinationConfig> {
        self.destinations.iter().find(|d| d.id == id)
    }

    /// Reject configurations the dispatcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.destinations.is_empty() {
            return Err(ConfigError::NoDestinations);
        }

        let mut seen = HashSet::new();
        for destination in &self.destinations {
            if destination.id.trim().is_empty() {
                return Err(ConfigError::EmptyDestinationId);
            }
            if !seen.insert(destination.id.as_str()) {
                return Err(ConfigError::DuplicateDestination(destination.id.clone()));
            }
            for url in [destination.print_url.clone(), destination.notify_endpoint()] {
                reqwest::Url::parse(&url).map_err(|e| ConfigError::InvalidUrl {
                    destination: destination.id.clone(),
                    url: url.clone(),
                    reason: e.to_string(),
                })?;
            }
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid("retry attempts must be at least 1".into()));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::Invalid("failure threshold must be at least 1".into()));
        }
        if self.retry.attempt_timeout.is_zero() || self.retry.job_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeouts must be non-zero".into()));
        }

        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse destinations: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("At least one destination must be configured")]
    NoDestinations,

    #[error("Destination id must not be empty")]
    EmptyDestinationId,

    #[error("Destination `{0}` is configured more than once")]
    DuplicateDestination(String),

    #[error("Destination `{destination}` has an invalid URL `{url}`: {reason}")]
    InvalidUrl {
        destination: String,
        url: String,
        reason: String,
    },

    #[error("Invalid dispatch configuration: {0}")]
    Invalid(String),
}
