use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::DestinationConfig;

/// JSON body POSTed to a printer's receipt endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    pub copies: u32,
    pub destination_id: String,
    pub token_number: String,
    pub timestamp: DateTime<Utc>,
    pub priority: String,
    pub request_id: String,
    pub attempt: u32,
}

impl PrintRequest {
    pub fn receipt(
        destination_id: &str,
        token_number: &str,
        content: String,
        request_id: String,
        attempt: u32,
    ) -> Self {
        Self {
            kind: "receipt".to_string(),
            content,
            copies: 1,
            destination_id: destination_id.to_string(),
            token_number: token_number.to_string(),
            timestamp: Utc::now(),
            priority: "high".to_string(),
            request_id,
            attempt,
        }
    }
}

/// What a printer answers on success. Both fields are optional on the wire.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrintAck {
    #[serde(default, alias = "printerId")]
    pub delivery_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

/// JSON body POSTed to a shop's display endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ShopNotification {
    #[serde(rename = "type")]
    pub kind: String,
    pub token_number: String,
    pub customer_name: String,
    pub item_count: usize,
    pub total_amount: f64,
    /// Minutes.
    pub estimated_time: u32,
    pub priority: String,
    pub timestamp: DateTime<Utc>,
}

/// Network side of delivery. Implementations do not enforce timeouts; the
/// executor bounds every call.
#[async_trait]
pub trait PrinterTransport: Send + Sync {
    async fn print(
        &self,
        destination: &DestinationConfig,
        request: &PrintRequest,
    ) -> Result<PrintAck, TransportError>;

    async fn notify(
        &self,
        destination: &DestinationConfig,
        notification: &ShopNotification,
    ) -> Result<(), TransportError>;
}

/// Printers reachable over plain HTTP on the shop LAN.
pub struct HttpPrinterTransport {
    http: Client,
}

impl HttpPrinterTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("receipt-dispatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PrinterTransport for HttpPrinterTransport {
    async fn print(
        &self,
        destination: &DestinationConfig,
        request: &PrintRequest,
    ) -> Result<PrintAck, TransportError> {
        let response = self
            .http
            .post(&destination.print_url)
            .header("X-Destination-Id", &destination.id)
            .header("X-Token", &request.token_number)
            .header("X-Request-Id", &request.request_id)
            .header("X-Attempt", request.attempt.to_string())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }

        // A 2xx is a printed receipt even if the body is not what we expect.
        let body = response.bytes().await?;
        match serde_json::from_slice::<PrintAck>(&body) {
            Ok(ack) => Ok(ack),
            Err(e) => {
                tracing::debug!(
                    destination = %destination.id,
                    error = %e,
                    "Printer acknowledged without a readable body"
                );
                Ok(PrintAck::default())
            }
        }
    }

    async fn notify(
        &self,
        destination: &DestinationConfig,
        notification: &ShopNotification,
    ) -> Result<(), TransportError> {
        let response = self
            .http
            .post(destination.notify_endpoint())
            .json(notification)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

/// Simulated printers for local development: every receipt "prints" after
/// a short delay and is written to the log.
pub struct MockPrinterTransport {
    delay: Duration,
}

impl MockPrinterTransport {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for MockPrinterTransport {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}

#[async_trait]
impl PrinterTransport for MockPrinterTransport {
    async fn print(
        &self,
        destination: &DestinationConfig,
        request: &PrintRequest,
    ) -> Result<PrintAck, TransportError> {
        tokio::time::sleep(self.delay).await;
        tracing::info!(
            destination = %destination.id,
            token = %request.token_number,
            request_id = %request.request_id,
            receipt = %request.content,
            "Mock printer printed receipt"
        );
        Ok(PrintAck {
            delivery_id: Some(format!("mock_printer_{}", destination.id)),
            timestamp: Some(Utc::now()),
        })
    }

    async fn notify(
        &self,
        destination: &DestinationConfig,
        notification: &ShopNotification,
    ) -> Result<(), TransportError> {
        tracing::info!(
            destination = %destination.id,
            token = %notification.token_number,
            estimated_minutes = notification.estimated_time,
            "Mock shop display notified"
        );
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Printer responded with status {status}")]
    Status { status: u16 },

    #[error("Printer did not respond within {0:?}")]
    Timeout(Duration),

    #[error("Printer rejected the request: {0}")]
    Rejected(String),
}
