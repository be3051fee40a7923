//! Durable FIFO of serialized tasks
//!
//! Producers push to the tail, the single worker pops from the head. The queue
//! stores raw strings so a malformed payload reaches the worker and is dropped
//! there instead of being lost inside the backend.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

use crate::moderation::{ModerationError, ModerationResult, Task};

/// Queue operations consumed by producers and the worker
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Append to the tail; returns the queue length after the push
    async fn push(&self, payload: String) -> ModerationResult<u64>;

    /// Take the oldest payload, waiting up to `timeout` for one to arrive
    async fn pop(&self, timeout: Duration) -> ModerationResult<Option<String>>;

    async fn len(&self) -> ModerationResult<u64>;
}

/// Serialize `task` and push it to the tail of `queue`
///
/// The returned length is only an approximate position indicator.
///
/// # Errors
///
/// Returns an error if the task is invalid or the queue push fails.
pub async fn enqueue(queue: &dyn TaskQueue, task: &Task) -> ModerationResult<u64> {
    task.validate()?;
    queue.push(task.encode()?).await
}

/// In-process queue, used in tests and when no Redis URL is configured
#[derive(Default)]
pub struct MemoryQueue {
    items: Mutex<VecDeque<String>>,
    pushed: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the pending payloads, head first
    pub async fn pending(&self) -> Vec<String> {
        self.items.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn push(&self, payload: String) -> ModerationResult<u64> {
        let len = {
            let mut items = self.items.lock().await;
            items.push_back(payload);
            items.len() as u64
        };
        self.pushed.notify_one();
        Ok(len)
    }

    async fn pop(&self, timeout: Duration) -> ModerationResult<Option<String>> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let notified = self.pushed.notified();
            if let Some(payload) = self.items.lock().await.pop_front() {
                return Ok(Some(payload));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn len(&self) -> ModerationResult<u64> {
        Ok(self.items.lock().await.len() as u64)
    }
}

/// Redis list queue: RPUSH to the tail, BLPOP from the head
#[derive(Clone)]
pub struct RedisQueue {
    pool: Pool,
    key: String,
}

impl std::fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisQueue").field("key", &self.key).finish()
    }
}

impl RedisQueue {
    /// Create a pooled queue client for the list at `key`
    ///
    /// # Errors
    ///
    /// Returns a queue error if the pool cannot be built from the URL.
    pub fn from_url(redis_url: &str, key: impl Into<String>) -> ModerationResult<Self> {
        let pool = Config::from_url(redis_url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| ModerationError::Queue(format!("failed to create redis pool: {e}")))?;
        Ok(Self::with_pool(pool, key))
    }

    /// Share an existing pool, e.g. between the main and dead-letter queues
    pub fn with_pool(pool: Pool, key: impl Into<String>) -> Self {
        Self {
            pool,
            key: key.into(),
        }
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

#[async_trait]
impl TaskQueue for RedisQueue {
    async fn push(&self, payload: String) -> ModerationResult<u64> {
        let mut conn = self.pool.get().await?;
        let len = conn
            .rpush::<_, _, u64>(&self.key, payload)
            .await
            .map_err(|e| ModerationError::Queue(format!("RPUSH failed for `{}`: {e}", self.key)))?;
        Ok(len)
    }

    async fn pop(&self, timeout: Duration) -> ModerationResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let popped = conn
            .blpop::<_, Option<(String, String)>>(&self.key, timeout.as_secs_f64())
            .await
            .map_err(|e| ModerationError::Queue(format!("BLPOP failed for `{}`: {e}", self.key)))?;
        Ok(popped.map(|(_, payload)| payload))
    }

    async fn len(&self) -> ModerationResult<u64> {
        let mut conn = self.pool.get().await?;
        let len = conn
            .llen::<_, u64>(&self.key)
            .await
            .map_err(|e| ModerationError::Queue(format!("LLEN failed for `{}`: {e}", self.key)))?;
        Ok(len)
    }
}
