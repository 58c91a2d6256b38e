use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::services::{
    dispatcher::ReceiptDispatcher,
    fallback::{FallbackNotifier, LogAlertChannel},
    manual_queue::{InMemoryManualPrintStore, ManualPrintStore, ManualQueueError, RedisManualPrintStore},
    transport::{HttpPrinterTransport, MockPrinterTransport, PrinterTransport, TransportError},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<ReceiptDispatcher>,
    pub manual_store: Arc<dyn ManualPrintStore>,
}

impl AppState {
    pub fn new(dispatcher: ReceiptDispatcher, manual_store: Arc<dyn ManualPrintStore>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            manual_store,
        }
    }

    /// Wire the printer transport (HTTP, or simulated with `MOCK_PRINTERS`),
    /// log-only alerts and the manual-print store (Redis when configured)
    /// from environment configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, StartupError> {
        let dispatch_config = config.dispatch_config()?;

        let manual_store: Arc<dyn ManualPrintStore> = match &config.redis_url {
            Some(url) => {
                tracing::info!("Using Redis manual-print store");
                Arc::new(RedisManualPrintStore::new(url)?)
            }
            None => {
                tracing::warn!("REDIS_URL not set, manual-print records are kept in memory");
                Arc::new(InMemoryManualPrintStore::new())
            }
        };

        let transport: Arc<dyn PrinterTransport> = if config.mock_printers {
            tracing::warn!("MOCK_PRINTERS set, receipts are simulated and never reach a printer");
            Arc::new(MockPrinterTransport::default())
        } else {
            Arc::new(HttpPrinterTransport::new()?)
        };
        let fallback = FallbackNotifier::new(Arc::new(LogAlertChannel), Arc::clone(&manual_store));
        let dispatcher = ReceiptDispatcher::new(dispatch_config, transport, fallback)?;

        Ok(Self::new(dispatcher, manual_store))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to build printer transport: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to open manual-print store: {0}")]
    ManualQueue(#[from] ManualQueueError),
}
