//! Warning escalation
//!
//! Warnings accumulate per `(user, chat)`. Reaching [`WARNING_THRESHOLD`]
//! kicks the user from that chat only; the kick is not propagated.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::moderation::handler::{HandlerContext, failed};
use crate::moderation::{
    ModerationResult, Notice, PunishmentEntry, PunishmentKind, Task, TaskType, kick_member,
};
use crate::{AUDIT_TARGET, ERROR_TARGET};

pub const WARNING_THRESHOLD: u32 = 3;

/// Reason written on the kick entry produced by escalation
pub const ESCALATION_REASON: &str = "3 warnings";

/// Where a user stands for one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarnState {
    Clean,
    Warned(u32),
    /// Threshold reached; the user gets kicked
    Escalated,
}

impl WarnState {
    #[must_use]
    pub fn from_count(count: u32) -> Self {
        match count {
            0 => Self::Clean,
            n if n >= WARNING_THRESHOLD => Self::Escalated,
            n => Self::Warned(n),
        }
    }
}

/// Result of a warn task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarnOutcome {
    pub count: u32,
    pub state: WarnState,
    /// Whether the escalation kick went through
    pub kicked: bool,
}

/// Add a warning and escalate to a kick at the threshold
///
/// # Errors
///
/// Returns an error if the task has no target. A store failure counts as zero
/// warnings, so the chat is still notified but nothing escalates. A failed
/// escalation kick is reported in the outcome and a chat notice.
pub async fn add_warning(ctx: &HandlerContext, task: &Task) -> ModerationResult<WarnOutcome> {
    let user_id = task.target_user()?;
    let chat_id = task.chat_id;

    let count = match ctx.store.upsert_warning(user_id, chat_id).await {
        Ok(count) => count,
        Err(e) => {
            error!(target: ERROR_TARGET, user_id, chat_id, error = %e, "Failed to store warning");
            0
        }
    };
    ctx.record(
        PunishmentEntry::new(user_id, chat_id, PunishmentKind::Warn, &task.reason)
            .with_moderator(task.moderator_id),
    )
    .await;

    let state = WarnState::from_count(count);
    let mention = task.mention();

    if state != WarnState::Escalated {
        ctx.notify(
            chat_id,
            &Notice::Warned {
                mention,
                count,
                reason: task.reason.clone(),
            },
        )
        .await;
        return Ok(WarnOutcome {
            count,
            state,
            kicked: false,
        });
    }

    info!(target: AUDIT_TARGET, user_id, chat_id, count, "Warning threshold reached, kicking");
    let kicked = match kick_member(ctx.provider.as_ref(), chat_id, user_id).await {
        Ok(()) => {
            ctx.record(
                PunishmentEntry::new(user_id, chat_id, PunishmentKind::Kick, ESCALATION_REASON)
                    .with_moderator(task.moderator_id),
            )
            .await;
            ctx.notify(
                chat_id,
                &Notice::EscalationKick {
                    mention,
                    reason: task.reason.clone(),
                },
            )
            .await;
            true
        }
        Err(e) => {
            warn!(user_id, chat_id, error = %e, "Escalation kick failed");
            ctx.notify(chat_id, &failed(TaskType::Kick, &e)).await;
            false
        }
    };

    Ok(WarnOutcome {
        count,
        state,
        kicked,
    })
}

/// Remove one warning; returns the remaining count
///
/// Zero is returned both when the last warning was removed and when the user
/// had none.
///
/// # Errors
///
/// Returns an error if the task has no target. A store failure is logged and
/// reported as zero remaining.
pub async fn remove_warning(ctx: &HandlerContext, task: &Task) -> ModerationResult<u32> {
    let user_id = task.target_user()?;
    let remaining = match ctx.store.remove_warning(user_id, task.chat_id).await {
        Ok(remaining) => remaining,
        Err(e) => {
            error!(
                target: ERROR_TARGET,
                user_id,
                chat_id = task.chat_id,
                error = %e,
                "Failed to remove warning"
            );
            0
        }
    };

    ctx.record(
        PunishmentEntry::new(user_id, task.chat_id, PunishmentKind::Unwarn, &task.reason)
            .with_moderator(task.moderator_id),
    )
    .await;
    ctx.notify(
        task.chat_id,
        &Notice::Unwarned {
            mention: task.mention(),
            remaining,
        },
    )
    .await;

    Ok(remaining)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::testing::{Call, DownStore, FakeChat};
    use crate::moderation::{MemoryStore, ModerationError, ModerationStore};
    use std::sync::Arc;

    fn setup() -> (Arc<FakeChat>, Arc<MemoryStore>, HandlerContext) {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = HandlerContext::new(chat.clone(), store.clone());
        (chat, store, ctx)
    }

    fn warn_task() -> Task {
        Task::new(TaskType::Warn, -1, 7).with_user(42).with_reason("spam")
    }

    #[test]
    fn test_state_from_count() {
        assert_eq!(WarnState::from_count(0), WarnState::Clean);
        assert_eq!(WarnState::from_count(2), WarnState::Warned(2));
        assert_eq!(WarnState::from_count(3), WarnState::Escalated);
    }

    #[tokio::test]
    async fn test_three_warnings_kick_once() {
        let (chat, store, ctx) = setup();

        let first = add_warning(&ctx, &warn_task()).await.unwrap();
        let second = add_warning(&ctx, &warn_task()).await.unwrap();
        assert_eq!(first.state, WarnState::Warned(1));
        assert_eq!(second.state, WarnState::Warned(2));
        assert!(chat.bans().is_empty());

        let third = add_warning(&ctx, &warn_task()).await.unwrap();
        assert_eq!(third, WarnOutcome {
            count: 3,
            state: WarnState::Escalated,
            kicked: true,
        });

        let log = store.punishments().await;
        let warns = log.iter().filter(|e| e.kind == PunishmentKind::Warn).count();
        let kicks: Vec<_> = log.iter().filter(|e| e.kind == PunishmentKind::Kick).collect();
        assert_eq!(warns, 3);
        assert_eq!(kicks.len(), 1);
        assert_eq!(kicks[0].reason, ESCALATION_REASON);

        // kick sequence in the origin chat only
        assert_eq!(chat.bans(), vec![Call::Ban { chat_id: -1, user_id: 42, revoke_messages: false }]);
        assert!(chat.calls().contains(&Call::Unban { chat_id: -1, user_id: 42 }));
        assert!(!chat.calls().contains(&Call::ListChats));
    }

    #[tokio::test]
    async fn test_failed_escalation_keeps_warning() {
        let (chat, store, ctx) = setup();
        for _ in 0..2 {
            add_warning(&ctx, &warn_task()).await.unwrap();
        }
        chat.fail_actions_in(-1, ModerationError::permission(-1, "not admin"));

        let outcome = add_warning(&ctx, &warn_task()).await.unwrap();
        assert!(!outcome.kicked);
        assert_eq!(store.get_warning_count(42, -1).await.unwrap(), 3);
        let log = store.punishments().await;
        assert!(log.iter().all(|e| e.kind == PunishmentKind::Warn));
    }

    #[tokio::test]
    async fn test_unwarn_zero_is_ambiguous() {
        let (_chat, store, ctx) = setup();
        add_warning(&ctx, &warn_task()).await.unwrap();

        let unwarn = Task::new(TaskType::Unwarn, -1, 7).with_user(42);
        assert_eq!(remove_warning(&ctx, &unwarn).await.unwrap(), 0);

        let never_warned = Task::new(TaskType::Unwarn, -1, 7).with_user(99);
        assert_eq!(remove_warning(&ctx, &never_warned).await.unwrap(), 0);

        let unwarns = store
            .punishments()
            .await
            .iter()
            .filter(|e| e.kind == PunishmentKind::Unwarn)
            .count();
        assert_eq!(unwarns, 2);
    }

    #[tokio::test]
    async fn test_warning_counts_are_per_chat() {
        let (_chat, store, ctx) = setup();
        add_warning(&ctx, &warn_task()).await.unwrap();
        let elsewhere = Task::new(TaskType::Warn, -2, 7).with_user(42).with_reason("spam");
        add_warning(&ctx, &elsewhere).await.unwrap();

        assert_eq!(store.get_warning_count(42, -1).await.unwrap(), 1);
        assert_eq!(store.get_warning_count(42, -2).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_still_notifies() {
        let chat = Arc::new(FakeChat::new());
        let ctx = HandlerContext::new(chat.clone(), Arc::new(DownStore));

        let outcome = add_warning(&ctx, &warn_task()).await.unwrap();
        assert_eq!(outcome, WarnOutcome {
            count: 0,
            state: WarnState::Clean,
            kicked: false,
        });
        assert!(chat.bans().is_empty());
        assert_eq!(chat.messages_to(-1).len(), 1);

        let unwarn = Task::new(TaskType::Unwarn, -1, 7).with_user(42);
        assert_eq!(remove_warning(&ctx, &unwarn).await.unwrap(), 0);
        assert_eq!(chat.messages_to(-1).len(), 2);
    }
}
