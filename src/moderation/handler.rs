//! Task handlers
//!
//! One handler per task type, looked up through [`HandlerRegistry`]. Handlers
//! call the chat provider first and only record the action once it succeeded.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::PropagationConfig;
use crate::moderation::escalation::{self, WarnOutcome};
use crate::moderation::info::{self, InfoReport};
use crate::moderation::propagation::{self, CrossChatAction, PropagationReport};
use crate::moderation::{
    ChatId, ChatProvider, ModerationError, ModerationResult, ModerationStore, Notice,
    PunishmentEntry, PunishmentKind, Restriction, RetryPolicy, Task, TaskType, send_notice,
};
use crate::{AUDIT_TARGET, ERROR_TARGET};

/// Capabilities and pacing shared by every handler
#[derive(Clone)]
pub struct HandlerContext {
    pub provider: Arc<dyn ChatProvider>,
    pub store: Arc<dyn ModerationStore>,
    pub retry: RetryPolicy,
    pub propagation: PropagationConfig,
}

impl HandlerContext {
    pub fn new(provider: Arc<dyn ChatProvider>, store: Arc<dyn ModerationStore>) -> Self {
        Self {
            provider,
            store,
            retry: RetryPolicy::default(),
            propagation: PropagationConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_propagation(mut self, propagation: PropagationConfig) -> Self {
        self.propagation = propagation;
        self
    }

    /// Append to the punishment log, logging instead of failing
    ///
    /// The chat action has already happened at this point, so a persistence
    /// failure leaves a gap in the audit trail but does not fail the task.
    pub async fn record(&self, entry: PunishmentEntry) -> bool {
        let (kind, user_id, chat_id) = (entry.kind, entry.user_id, entry.chat_id);
        match self.store.append_punishment(entry).await {
            Ok(()) => {
                info!(target: AUDIT_TARGET, %kind, user_id, chat_id, "Recorded punishment");
                true
            }
            Err(e) => {
                error!(
                    target: ERROR_TARGET,
                    %kind,
                    user_id,
                    chat_id,
                    error = %e,
                    "Failed to record punishment; audit trail has a gap"
                );
                false
            }
        }
    }

    /// Send a notice, logging a failure instead of returning it
    pub async fn notify(&self, chat_id: ChatId, notice: &Notice) {
        if let Err(e) = send_notice(self.provider.as_ref(), self.retry, chat_id, notice).await {
            warn!(chat_id, error = %e, "Failed to send notice");
        }
    }
}

/// What a handler did, reported back to the worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Ban or kick, with its per-chat propagation results
    Propagated(PropagationReport),
    Muted { minutes: u32 },
    Warned(WarnOutcome),
    Unwarned { remaining: u32 },
    /// Unban or unmute
    Lifted,
    Report(InfoReport),
}

/// Trait for handling one task type
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome>;
}

/// Registry of task handlers
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Box<dyn TaskHandler>>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandlerRegistry {
    /// Create a registry with a handler for every task type
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();

        registry.register(TaskType::Ban, Box::new(CrossChatHandler(CrossChatAction::Ban)));
        registry.register(TaskType::Kick, Box::new(CrossChatHandler(CrossChatAction::Kick)));
        registry.register(TaskType::Mute, Box::new(MuteHandler));
        registry.register(TaskType::Unmute, Box::new(UnmuteHandler));
        registry.register(TaskType::Unban, Box::new(UnbanHandler));
        registry.register(TaskType::Warn, Box::new(WarnHandler));
        registry.register(TaskType::Unwarn, Box::new(UnwarnHandler));
        registry.register(TaskType::Info, Box::new(InfoHandler));

        registry
    }

    #[must_use]
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, task_type: TaskType, handler: Box<dyn TaskHandler>) {
        self.handlers.insert(task_type, handler);
    }

    #[must_use]
    pub fn get(&self, task_type: TaskType) -> Option<&dyn TaskHandler> {
        self.handlers.get(&task_type).map(AsRef::as_ref)
    }

    /// Dispatch `task` to its handler
    ///
    /// # Errors
    ///
    /// Returns `MalformedTask` if no handler is registered for the task type,
    /// otherwise whatever the handler returns.
    pub async fn execute(
        &self,
        ctx: &HandlerContext,
        task: &Task,
    ) -> ModerationResult<HandlerOutcome> {
        let task_type = task.task_type;
        if let Some(handler) = self.get(task_type) {
            handler.handle(ctx, task).await
        } else {
            Err(ModerationError::MalformedTask(format!(
                "No handler registered for task type: {task_type}"
            )))
        }
    }
}

/// Ban or kick in the origin chat, then everywhere else the user is present
pub struct CrossChatHandler(pub CrossChatAction);

#[async_trait]
impl TaskHandler for CrossChatHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome> {
        let report = propagation::propagate(ctx, task, self.0).await?;
        Ok(HandlerOutcome::Propagated(report))
    }
}

pub struct MuteHandler;

#[async_trait]
impl TaskHandler for MuteHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome> {
        let user_id = task.target_user()?;
        let minutes = task.duration_minutes.ok_or_else(|| {
            ModerationError::MalformedTask("mute task is missing `duration_minutes`".into())
        })?;
        let until = Utc::now() + chrono::Duration::minutes(i64::from(minutes));

        if let Err(e) = ctx
            .provider
            .restrict_member(task.chat_id, user_id, Restriction::Muted { until })
            .await
        {
            ctx.notify(task.chat_id, &failed(TaskType::Mute, &e)).await;
            return Err(e);
        }

        ctx.record(
            PunishmentEntry::new(user_id, task.chat_id, PunishmentKind::Mute, &task.reason)
                .with_moderator(task.moderator_id)
                .with_duration(Some(minutes)),
        )
        .await;

        ctx.notify(
            task.chat_id,
            &Notice::Muted {
                mention: task.mention(),
                minutes,
                reason: task.reason.clone(),
            },
        )
        .await;

        Ok(HandlerOutcome::Muted { minutes })
    }
}

pub struct UnmuteHandler;

#[async_trait]
impl TaskHandler for UnmuteHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome> {
        let user_id = task.target_user()?;

        if let Err(e) = ctx
            .provider
            .restrict_member(task.chat_id, user_id, Restriction::Lifted)
            .await
        {
            ctx.notify(task.chat_id, &failed(TaskType::Unmute, &e)).await;
            return Err(e);
        }

        ctx.record(
            PunishmentEntry::new(user_id, task.chat_id, PunishmentKind::Unmute, &task.reason)
                .with_moderator(task.moderator_id),
        )
        .await;

        ctx.notify(
            task.chat_id,
            &Notice::Lifted {
                mention: task.mention(),
                action: TaskType::Unmute,
            },
        )
        .await;

        Ok(HandlerOutcome::Lifted)
    }
}

pub struct UnbanHandler;

#[async_trait]
impl TaskHandler for UnbanHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome> {
        let user_id = task.target_user()?;

        if let Err(e) = ctx.provider.unban_member(task.chat_id, user_id).await {
            ctx.notify(task.chat_id, &failed(TaskType::Unban, &e)).await;
            return Err(e);
        }

        if let Err(e) = ctx.store.remove_ban(user_id, task.chat_id).await {
            error!(target: ERROR_TARGET, user_id, chat_id = task.chat_id, error = %e, "Failed to remove ban row");
        }
        ctx.record(
            PunishmentEntry::new(user_id, task.chat_id, PunishmentKind::Unban, &task.reason)
                .with_moderator(task.moderator_id),
        )
        .await;

        ctx.notify(
            task.chat_id,
            &Notice::Lifted {
                mention: task.mention(),
                action: TaskType::Unban,
            },
        )
        .await;

        Ok(HandlerOutcome::Lifted)
    }
}

pub struct WarnHandler;

#[async_trait]
impl TaskHandler for WarnHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome> {
        escalation::add_warning(ctx, task)
            .await
            .map(HandlerOutcome::Warned)
    }
}

pub struct UnwarnHandler;

#[async_trait]
impl TaskHandler for UnwarnHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome> {
        let remaining = escalation::remove_warning(ctx, task).await?;
        Ok(HandlerOutcome::Unwarned { remaining })
    }
}

pub struct InfoHandler;

#[async_trait]
impl TaskHandler for InfoHandler {
    async fn handle(&self, ctx: &HandlerContext, task: &Task) -> ModerationResult<HandlerOutcome> {
        info::report(ctx, task).await.map(HandlerOutcome::Report)
    }
}

pub(crate) fn failed(action: TaskType, error: &ModerationError) -> Notice {
    Notice::Failed {
        action,
        error: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::testing::{Call, DownStore, FakeChat};
    use crate::moderation::MemoryStore;

    fn context(chat: &Arc<FakeChat>, store: &Arc<MemoryStore>) -> HandlerContext {
        HandlerContext::new(chat.clone(), store.clone())
    }

    #[test]
    fn test_registry_covers_every_task_type() {
        let registry = HandlerRegistry::new();
        for task_type in TaskType::ALL {
            assert!(registry.get(task_type).is_some(), "missing handler for {task_type}");
        }
    }

    #[tokio::test]
    async fn test_empty_registry_rejects_task() {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&chat, &store);
        let task = Task::new(TaskType::Unmute, -1, 7).with_user(42);

        let err = HandlerRegistry::empty().execute(&ctx, &task).await.unwrap_err();
        assert!(matches!(err, ModerationError::MalformedTask(_)));
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_mute_restricts_and_records_duration() {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&chat, &store);
        let task = Task::new(TaskType::Mute, -1, 7)
            .with_user(42)
            .with_reason("flood")
            .with_duration(15);

        let outcome = HandlerRegistry::new().execute(&ctx, &task).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Muted { minutes: 15 });

        assert!(chat.calls().iter().any(|call| matches!(
            call,
            Call::Restrict { chat_id: -1, user_id: 42, restriction: Restriction::Muted { .. } }
        )));
        let log = store.punishments().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, PunishmentKind::Mute);
        assert_eq!(log[0].duration_minutes, Some(15));
        assert_eq!(log[0].moderator_id, Some(7));
        assert_eq!(chat.messages_to(-1).len(), 1);
    }

    #[tokio::test]
    async fn test_failed_mute_records_nothing_and_notifies() {
        let chat = Arc::new(FakeChat::new());
        chat.fail_actions_in(-1, ModerationError::permission(-1, "not enough rights"));
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&chat, &store);
        let task = Task::new(TaskType::Mute, -1, 7)
            .with_user(42)
            .with_reason("flood")
            .with_duration(15);

        let err = HandlerRegistry::new().execute(&ctx, &task).await.unwrap_err();
        assert!(matches!(err, ModerationError::PermissionDenied { .. }));
        assert!(store.punishments().await.is_empty());
        assert!(chat.messages_to(-1)[0].starts_with("Could not mute"));
    }

    #[tokio::test]
    async fn test_unban_clears_ban_row_and_logs() {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        store.upsert_ban(42, -1, "spam").await.unwrap();
        let ctx = context(&chat, &store);
        let task = Task::new(TaskType::Unban, -1, 7).with_user(42);

        let outcome = HandlerRegistry::new().execute(&ctx, &task).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Lifted);
        assert!(store.get_ban(42, -1).await.unwrap().is_none());
        assert_eq!(chat.calls(), vec![
            Call::Unban { chat_id: -1, user_id: 42 },
            Call::Send { chat_id: -1, text: "Lifted the ban on ID:42.".into() },
        ]);
        assert_eq!(store.punishments().await[0].kind, PunishmentKind::Unban);
    }

    #[tokio::test]
    async fn test_notice_failure_is_not_fatal() {
        let chat = Arc::new(FakeChat::new());
        chat.fail_sends_in(-1);
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&chat, &store);
        let task = Task::new(TaskType::Unban, -1, 7).with_user(42);

        let outcome = HandlerRegistry::new().execute(&ctx, &task).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Lifted);
        assert_eq!(store.punishments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unmute_lifts_restriction() {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = context(&chat, &store);
        let task = Task::new(TaskType::Unmute, -1, 7).with_user(42).with_username("bob");

        HandlerRegistry::new().execute(&ctx, &task).await.unwrap();
        assert_eq!(chat.calls()[0], Call::Restrict {
            chat_id: -1,
            user_id: 42,
            restriction: Restriction::Lifted,
        });
        assert_eq!(chat.messages_to(-1), vec!["Lifted the mute on @bob.".to_string()]);
    }

    #[tokio::test]
    async fn test_unreachable_store_keeps_chat_actions() {
        let chat = Arc::new(FakeChat::new());
        let ctx = HandlerContext::new(chat.clone(), Arc::new(DownStore));
        let registry = HandlerRegistry::new();

        let mute = Task::new(TaskType::Mute, -1, 7)
            .with_user(42)
            .with_reason("flood")
            .with_duration(15);
        let unban = Task::new(TaskType::Unban, -1, 7).with_user(42);

        assert_eq!(
            registry.execute(&ctx, &mute).await.unwrap(),
            HandlerOutcome::Muted { minutes: 15 }
        );
        assert_eq!(registry.execute(&ctx, &unban).await.unwrap(), HandlerOutcome::Lifted);
        assert!(matches!(chat.calls()[0], Call::Restrict { chat_id: -1, user_id: 42, .. }));
        assert!(chat.calls().contains(&Call::Unban { chat_id: -1, user_id: 42 }));
        assert_eq!(chat.messages_to(-1).len(), 2);
    }
}
