use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::dispatch::FailureReason;
use crate::models::order::OrderSlice;

const MANUAL_QUEUE_KEY: &str = "receipt_dispatch:manual_prints";

/// A receipt that staff have to print by hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ManualPrintRecord {
    pub job_id: Uuid,
    pub destination_id: String,
    pub slice: OrderSlice,
    pub receipt: String,
    pub reason: FailureReason,
    pub queued_at: DateTime<Utc>,
}

/// Durable "manual print needed" list, oldest first.
#[async_trait]
pub trait ManualPrintStore: Send + Sync {
    async fn append(&self, record: &ManualPrintRecord) -> Result<(), ManualQueueError>;

    /// Remove and return the oldest record.
    async fn pop(&self) -> Result<Option<ManualPrintRecord>, ManualQueueError>;

    async fn len(&self) -> Result<u64, ManualQueueError>;

    /// Connectivity check for `/health`.
    async fn health_check(&self) -> Result<(), ManualQueueError> {
        Ok(())
    }
}

/// Redis list: `LPUSH` to append, `RPOP` to take the oldest.
pub struct RedisManualPrintStore {
    client: redis::Client,
}

impl RedisManualPrintStore {
    pub fn new(redis_url: &str) -> Result<Self, ManualQueueError> {
        let client = redis::Client::open(redis_url).map_err(ManualQueueError::Redis)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ManualPrintStore for RedisManualPrintStore {
    async fn append(&self, record: &ManualPrintRecord) -> Result<(), ManualQueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(record)?;
        conn.lpush::<_, _, ()>(MANUAL_QUEUE_KEY, &payload).await?;
        Ok(())
    }

    async fn pop(&self) -> Result<Option<ManualPrintRecord>, ManualQueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload: Option<String> = conn.rpop(MANUAL_QUEUE_KEY, None).await?;

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn len(&self) -> Result<u64, ManualQueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let depth: u64 = conn.llen(MANUAL_QUEUE_KEY).await?;
        Ok(depth)
    }

    async fn health_check(&self) -> Result<(), ManualQueueError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }
}

/// Process-local store, used when no Redis is configured and in tests.
#[derive(Default)]
pub struct InMemoryManualPrintStore {
    records: Mutex<VecDeque<ManualPrintRecord>>,
}

impl InMemoryManualPrintStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ManualPrintRecord> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.iter().cloned().collect()
    }
}

#[async_trait]
impl ManualPrintStore for InMemoryManualPrintStore {
    async fn append(&self, record: &ManualPrintRecord) -> Result<(), ManualQueueError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        records.push_back(record.clone());
        Ok(())
    }

    async fn pop(&self) -> Result<Option<ManualPrintRecord>, ManualQueueError> {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.pop_front())
    }

    async fn len(&self) -> Result<u64, ManualQueueError> {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(records.len() as u64)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManualQueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}
