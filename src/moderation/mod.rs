//! Moderation pipeline
//!
//! Producers validate tasks and push them onto a queue; a single [`Worker`]
//! pops and executes them against the chat and persistence capabilities.

pub mod announce;
pub mod error;
pub mod escalation;
pub mod handler;
pub mod info;
pub mod notice;
pub mod propagation;
pub mod provider;
pub mod queue;
pub mod record;
pub mod retry;
pub mod store;
pub mod task;
#[cfg(test)]
pub(crate) mod testing;
pub mod worker;

pub use announce::{Announcement, announce};
pub use error::{ErrorKind, ModerationError, ModerationResult};
pub use escalation::{ESCALATION_REASON, WARNING_THRESHOLD, WarnOutcome, WarnState};
pub use handler::{HandlerContext, HandlerOutcome, HandlerRegistry, TaskHandler};
pub use info::{ChatMembership, InfoReport};
pub use notice::{Notice, send_notice, send_text};
pub use propagation::{ChatOutcome, CrossChatAction, PropagationReport, propagated_reason};
pub use provider::{ChatProvider, MemberStatus, Restriction, kick_member};
pub use queue::{MemoryQueue, RedisQueue, TaskQueue, enqueue};
pub use record::{
    BanRecord, Ledger, PunishmentEntry, PunishmentKind, WarningRecord, rebuild_ledger,
};
pub use retry::{RetryPolicy, with_rate_limit};
pub use store::{MemoryStore, ModerationStore};
pub use task::{ChatId, MessageId, Task, TaskType, UserId};
pub use worker::{DeadLetter, TaskReport, Worker};

use std::sync::Arc;
use tracing::info;

use crate::config::WardenConfig;

/// Wires the capabilities, queue and configuration together
#[derive(Clone)]
pub struct Warden {
    ctx: HandlerContext,
    queue: Arc<dyn TaskQueue>,
    dead_letter: Option<Arc<dyn TaskQueue>>,
    handlers: Arc<HandlerRegistry>,
    config: WardenConfig,
}

impl Warden {
    pub fn new(
        provider: Arc<dyn ChatProvider>,
        store: Arc<dyn ModerationStore>,
        queue: Arc<dyn TaskQueue>,
        config: WardenConfig,
    ) -> Self {
        let ctx = HandlerContext::new(provider, store)
            .with_retry(config.retry)
            .with_propagation(config.propagation.clone());
        Self {
            ctx,
            queue,
            dead_letter: None,
            handlers: Arc::new(HandlerRegistry::new()),
            config,
        }
    }

    /// Build queues from the configuration: Redis when a URL is set, memory otherwise
    ///
    /// # Errors
    ///
    /// Returns a queue error if the Redis pool cannot be created.
    pub fn from_config(
        provider: Arc<dyn ChatProvider>,
        store: Arc<dyn ModerationStore>,
        config: WardenConfig,
    ) -> ModerationResult<Self> {
        let (queue, dead_letter): (Arc<dyn TaskQueue>, Arc<dyn TaskQueue>) =
            if let Some(url) = config.redis_url.as_deref() {
                let queue = RedisQueue::from_url(url, config.queue_key.clone())?;
                let dead_letter =
                    RedisQueue::with_pool(queue.pool().clone(), config.dead_letter_key.clone());
                info!(key = %config.queue_key, "Using Redis task queue");
                (Arc::new(queue), Arc::new(dead_letter))
            } else {
                info!("No Redis URL configured, using in-memory task queue");
                (Arc::new(MemoryQueue::new()), Arc::new(MemoryQueue::new()))
            };

        Ok(Self::new(provider, store, queue, config).with_dead_letter(dead_letter))
    }

    #[must_use]
    pub fn with_dead_letter(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.dead_letter = Some(queue);
        self
    }

    /// Replace the handler registry, e.g. to add custom task handlers
    #[must_use]
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Arc::new(handlers);
        self
    }

    /// Validate and enqueue a task; returns the approximate queue position
    ///
    /// # Errors
    ///
    /// Returns `MalformedTask` for invalid tasks or a queue error.
    pub async fn submit(&self, task: &Task) -> ModerationResult<u64> {
        let position = enqueue(self.queue.as_ref(), task).await?;
        info!(task_type = %task.task_type, chat_id = task.chat_id, position, "Task queued");
        Ok(position)
    }

    /// Queue a mute, applying the configured default duration when none is given
    ///
    /// # Errors
    ///
    /// Same as [`Warden::submit`].
    pub async fn submit_mute(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        moderator_id: UserId,
        reason: &str,
        minutes: Option<u32>,
    ) -> ModerationResult<u64> {
        let task = Task::mute_with_default(
            user_id,
            chat_id,
            moderator_id,
            reason,
            minutes,
            self.config.default_mute_minutes,
        );
        self.submit(&task).await
    }

    /// Pending tasks
    ///
    /// # Errors
    ///
    /// Returns a queue error if the length cannot be read.
    pub async fn pending(&self) -> ModerationResult<u64> {
        self.queue.len().await
    }

    /// A worker consuming this warden's queue
    #[must_use]
    pub fn worker(&self) -> Worker {
        let worker = Worker::new(
            self.queue.clone(),
            self.handlers.clone(),
            self.ctx.clone(),
            self.config.worker.clone(),
        );
        match &self.dead_letter {
            Some(queue) => worker.with_dead_letter(queue.clone()),
            None => worker,
        }
    }

    pub fn context(&self) -> &HandlerContext {
        &self.ctx
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }
}
