//! Queue consumer
//!
//! A single worker pops tasks and runs them one at a time to completion.
//! Delivery is at-most-once: a payload is gone from the queue once popped,
//! and failures are dead-lettered rather than redelivered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::WORKER_TARGET;
use crate::config::WorkerConfig;
use crate::logging::{log_dropped_payload, log_task_end, log_task_error, log_task_start};
use crate::moderation::handler::{HandlerContext, HandlerOutcome, HandlerRegistry};
use crate::moderation::{ErrorKind, ModerationError, ModerationResult, Task, TaskQueue, TaskType};

/// Typed result of one popped payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    /// `None` when the payload did not decode
    pub task_type: Option<TaskType>,
    pub outcome: Result<HandlerOutcome, ErrorKind>,
}

/// Record written to the dead-letter queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetter {
    pub payload: String,
    pub error_kind: ErrorKind,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(payload: impl Into<String>, err: &ModerationError) -> Self {
        Self {
            payload: payload.into(),
            error_kind: err.kind(),
            error: err.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Single consumer of the moderation queue
#[derive(Clone)]
pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    dead_letter: Option<Arc<dyn TaskQueue>>,
    handlers: Arc<HandlerRegistry>,
    ctx: HandlerContext,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        handlers: Arc<HandlerRegistry>,
        ctx: HandlerContext,
        config: WorkerConfig,
    ) -> Self {
        Self {
            queue,
            dead_letter: None,
            handlers,
            ctx,
            config,
        }
    }

    /// Send failed and malformed payloads to `queue`
    #[must_use]
    pub fn with_dead_letter(mut self, queue: Arc<dyn TaskQueue>) -> Self {
        self.dead_letter = Some(queue);
        self
    }

    /// Pop one payload and run it to completion
    ///
    /// Returns `None` when the pop timed out with nothing to do.
    ///
    /// # Errors
    ///
    /// Only queue failures are returned; task failures are reported in the
    /// [`TaskReport`].
    pub async fn run_once(&self) -> ModerationResult<Option<TaskReport>> {
        let Some(payload) = self.queue.pop(self.config.pop_timeout).await? else {
            return Ok(None);
        };

        let task = match Task::decode(&payload) {
            Ok(task) => task,
            Err(e) => {
                log_dropped_payload(&payload, &e);
                self.bury(payload, &e).await;
                return Ok(Some(TaskReport {
                    task_type: None,
                    outcome: Err(e.kind()),
                }));
            }
        };

        log_task_start(&task);
        let started = Instant::now();

        let outcome = match self.handlers.execute(&self.ctx, &task).await {
            Ok(outcome) => {
                log_task_end(&task, &outcome, started.elapsed());
                Ok(outcome)
            }
            Err(e) => {
                log_task_error(&task, &e);
                self.bury(payload, &e).await;
                Err(e.kind())
            }
        };

        Ok(Some(TaskReport {
            task_type: Some(task.task_type),
            outcome,
        }))
    }

    /// Consume tasks until `shutdown` turns true
    ///
    /// The flag is checked between tasks, so a task in flight always finishes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(target: WORKER_TARGET, "Starting moderation worker");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(Some(_)) => false,
                Ok(None) => true,
                Err(e) => {
                    error!(target: WORKER_TARGET, error = %e, "Failed to pop from queue");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.idle_sleep) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        info!(target: WORKER_TARGET, "Moderation worker shut down");
    }

    /// Run the worker on its own task
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn bury(&self, payload: String, err: &ModerationError) {
        if !self.config.dead_letter {
            return;
        }
        let Some(dead_letter) = &self.dead_letter else {
            return;
        };

        let record = match serde_json::to_string(&DeadLetter::new(payload, err)) {
            Ok(record) => record,
            Err(e) => {
                warn!(target: WORKER_TARGET, error = %e, "Failed to encode dead letter");
                return;
            }
        };
        if let Err(e) = dead_letter.push(record).await {
            warn!(target: WORKER_TARGET, error = %e, "Failed to push dead letter");
        }
    }
}
