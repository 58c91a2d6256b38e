//! Test doubles for the printer network and the alert gateways

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use receipt_dispatch::config::{DestinationConfig, DispatchConfig};
use receipt_dispatch::services::dispatcher::ReceiptDispatcher;
use receipt_dispatch::services::fallback::{AlertChannel, AlertError, FallbackNotifier};
use receipt_dispatch::services::manual_queue::InMemoryManualPrintStore;
use receipt_dispatch::services::transport::{
    PrintAck, PrintRequest, PrinterTransport, ShopNotification, TransportError,
};

/// How a fake printer answers.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    Succeed,
    /// Answer with an error immediately.
    Fail,
    /// Never answer; only the attempt timeout ends the call.
    Hang,
    /// Succeed after this long.
    Delay(Duration),
    /// Fail the first n calls, then succeed.
    FailFirst(usize),
    /// Panic inside the call.
    Panic,
}

/// One `print` call as seen by the fake printer.
#[derive(Debug, Clone)]
pub struct PrintCall {
    pub destination_id: String,
    pub token_number: String,
    pub attempt: u32,
    pub at: Instant,
}

#[derive(Default)]
pub struct FakeTransport {
    behaviors: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<Vec<PrintCall>>,
    in_flight: Mutex<HashMap<String, usize>>,
    max_in_flight: Mutex<HashMap<String, usize>>,
    notifications: AtomicUsize,
}

struct InFlightGuard<'a> {
    transport: &'a FakeTransport,
    destination_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let mut in_flight = self.transport.in_flight.lock().unwrap();
        if let Some(count) = in_flight.get_mut(&self.destination_id) {
            *count -= 1;
        }
    }
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, destination_id: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .unwrap()
            .insert(destination_id.to_string(), behavior);
    }

    pub fn calls(&self) -> Vec<PrintCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, destination_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.destination_id == destination_id)
            .count()
    }

    pub fn max_in_flight(&self, destination_id: &str) -> usize {
        self.max_in_flight
            .lock()
            .unwrap()
            .get(destination_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn notifications(&self) -> usize {
        self.notifications.load(Ordering::SeqCst)
    }

    fn enter(&self, destination_id: &str) -> InFlightGuard<'_> {
        let mut in_flight = self.in_flight.lock().unwrap();
        let count = in_flight.entry(destination_id.to_string()).or_insert(0);
        *count += 1;
        let current = *count;
        drop(in_flight);

        let mut max = self.max_in_flight.lock().unwrap();
        let entry = max.entry(destination_id.to_string()).or_insert(0);
        *entry = (*entry).max(current);

        InFlightGuard {
            transport: self,
            destination_id: destination_id.to_string(),
        }
    }
}

#[async_trait]
impl PrinterTransport for FakeTransport {
    async fn print(
        &self,
        destination: &DestinationConfig,
        request: &PrintRequest,
    ) -> Result<PrintAck, TransportError> {
        let previous_calls = self.call_count(&destination.id);
        self.calls.lock().unwrap().push(PrintCall {
            destination_id: destination.id.clone(),
            token_number: request.token_number.clone(),
            attempt: request.attempt,
            at: Instant::now(),
        });
        let _guard = self.enter(&destination.id);

        let behavior = self
            .behaviors
            .lock()
            .unwrap()
            .get(&destination.id)
            .copied()
            .unwrap_or(Behavior::Succeed);

        match behavior {
            Behavior::Succeed => {}
            Behavior::Fail => return Err(TransportError::Status { status: 500 }),
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            Behavior::Delay(delay) => tokio::time::sleep(delay).await,
            Behavior::Panic => panic!("printer driver crashed"),
            Behavior::FailFirst(n) => {
                if previous_calls < n {
                    return Err(TransportError::Rejected("paper jam".to_string()));
                }
            }
        }

        Ok(PrintAck {
            delivery_id: Some(format!("{}-{}", destination.id, request.request_id)),
            timestamp: None,
        })
    }

    async fn notify(
        &self,
        _destination: &DestinationConfig,
        _notification: &ShopNotification,
    ) -> Result<(), TransportError> {
        self.notifications.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Counts alerts; can be told to fail SMS sends.
#[derive(Default)]
pub struct CountingAlerts {
    pub sms: AtomicUsize,
    pub email: AtomicUsize,
    pub fail_sms: bool,
}

#[async_trait]
impl AlertChannel for CountingAlerts {
    async fn send_sms(&self, _to: &str, _message: &str) -> Result<(), AlertError> {
        self.sms.fetch_add(1, Ordering::SeqCst);
        if self.fail_sms {
            return Err(AlertError::Unavailable("sms gateway down".to_string()));
        }
        Ok(())
    }

    async fn send_email(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), AlertError> {
        self.email.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl CountingAlerts {
    pub fn sms_count(&self) -> usize {
        self.sms.load(Ordering::SeqCst)
    }

    pub fn email_count(&self) -> usize {
        self.email.load(Ordering::SeqCst)
    }
}

/// A dispatcher wired to fakes, plus handles on every fake.
pub struct Harness {
    pub dispatcher: ReceiptDispatcher,
    pub transport: Arc<FakeTransport>,
    pub alerts: Arc<CountingAlerts>,
    pub store: Arc<InMemoryManualPrintStore>,
}

/// Two shops, `alpha` and `beta`, with test-friendly timings.
pub fn test_config() -> DispatchConfig {
    let mut config = DispatchConfig::default().with_destinations(vec![
        DestinationConfig::new("alpha", "Alpha Canteen", "http://alpha.printer.test/print"),
        DestinationConfig::new("beta", "Beta Juice Bar", "http://beta.printer.test/print"),
    ]);
    config.retry.attempt_timeout = Duration::from_secs(3);
    config.retry.base_delay = Duration::from_millis(500);
    config.retry.job_timeout = Duration::from_secs(30);
    config.safety_timeout = Duration::from_secs(60);
    config
}

pub fn harness(config: DispatchConfig) -> Harness {
    harness_with_alerts(config, CountingAlerts::default())
}

pub fn harness_with_alerts(config: DispatchConfig, alerts: CountingAlerts) -> Harness {
    let transport = Arc::new(FakeTransport::new());
    let alerts = Arc::new(alerts);
    let store = Arc::new(InMemoryManualPrintStore::new());
    let fallback = FallbackNotifier::new(alerts.clone(), store.clone());
    let dispatcher = ReceiptDispatcher::new(config, transport.clone(), fallback)
        .expect("test config must be valid");

    Harness {
        dispatcher,
        transport,
        alerts,
        store,
    }
}
