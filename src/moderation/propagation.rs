//! Cross-chat propagation
//!
//! A ban or kick is applied in the origin chat first. If that succeeds, the
//! same action is replayed in every other administered chat where the target
//! is currently present. Each chat is independent: a failure in one is logged
//! and the sweep moves on.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::moderation::handler::{HandlerContext, failed};
use crate::moderation::{
    ChatId, ChatProvider, ErrorKind, ModerationResult, Notice, PunishmentEntry, PunishmentKind,
    Task, TaskType, UserId, kick_member, with_rate_limit,
};
use crate::{ERROR_TARGET, PROPAGATION_TARGET};

/// Actions that propagate across chats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrossChatAction {
    Ban,
    Kick,
}

impl CrossChatAction {
    #[must_use]
    pub fn task_type(self) -> TaskType {
        match self {
            Self::Ban => TaskType::Ban,
            Self::Kick => TaskType::Kick,
        }
    }

    fn punishment(self) -> PunishmentKind {
        match self {
            Self::Ban => PunishmentKind::Ban,
            Self::Kick => PunishmentKind::Kick,
        }
    }

    /// Ban revokes the user's messages; kick lifts the ban right away
    async fn apply(
        self,
        provider: &dyn ChatProvider,
        chat_id: ChatId,
        user_id: UserId,
    ) -> ModerationResult<()> {
        match self {
            Self::Ban => provider.ban_member(chat_id, user_id, true).await,
            Self::Kick => kick_member(provider, chat_id, user_id).await,
        }
    }

    /// Write the ban row (bans only) and the log entry for one chat
    async fn record(
        self,
        ctx: &HandlerContext,
        user_id: UserId,
        chat_id: ChatId,
        reason: &str,
        moderator_id: UserId,
    ) {
        if self == Self::Ban {
            if let Err(e) = ctx.store.upsert_ban(user_id, chat_id, reason).await {
                error!(target: ERROR_TARGET, user_id, chat_id, error = %e, "Failed to store ban row");
            }
        }
        ctx.record(
            PunishmentEntry::new(user_id, chat_id, self.punishment(), reason)
                .with_moderator(moderator_id),
        )
        .await;
    }
}

/// Result of one chat in the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatOutcome {
    Applied,
    /// Target was not a participant
    Absent,
    Failed(ErrorKind),
}

/// Per-chat results of a propagated action
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PropagationReport {
    pub origin: ChatId,
    pub chats: Vec<(ChatId, ChatOutcome)>,
    /// Set when the administered chats could not be listed
    pub enumeration_failed: Option<ErrorKind>,
}

impl PropagationReport {
    /// Chats other than the origin where the action was applied
    #[must_use]
    pub fn applied(&self) -> Vec<ChatId> {
        self.chats_with(ChatOutcome::Applied)
    }

    #[must_use]
    pub fn absent(&self) -> Vec<ChatId> {
        self.chats_with(ChatOutcome::Absent)
    }

    #[must_use]
    pub fn failed(&self) -> Vec<ChatId> {
        self.chats
            .iter()
            .filter(|(_, outcome)| matches!(outcome, ChatOutcome::Failed(_)))
            .map(|(chat_id, _)| *chat_id)
            .collect()
    }

    fn chats_with(&self, wanted: ChatOutcome) -> Vec<ChatId> {
        self.chats
            .iter()
            .filter(|(_, outcome)| *outcome == wanted)
            .map(|(chat_id, _)| *chat_id)
            .collect()
    }
}

/// Reason written for chats other than the origin
#[must_use]
pub fn propagated_reason(origin: ChatId, reason: &str) -> String {
    format!("Propagated from chat {origin}: {reason}")
}

/// Apply `action` in the task's chat, then replay it across administered chats
///
/// # Errors
///
/// Returns the origin chat's error; nothing is propagated in that case.
/// Failures in other chats only show up in the report.
pub async fn propagate(
    ctx: &HandlerContext,
    task: &Task,
    action: CrossChatAction,
) -> ModerationResult<PropagationReport> {
    let user_id = task.target_user()?;
    let origin = task.chat_id;
    let mention = task.mention();
    let provider = ctx.provider.as_ref();

    send_farewell(ctx, task, action).await;

    if let Err(e) = action.apply(provider, origin, user_id).await {
        warn!(
            target: PROPAGATION_TARGET,
            action = %action.task_type(),
            user_id,
            chat_id = origin,
            error = %e,
            "Action failed in origin chat, not propagating"
        );
        ctx.notify(origin, &failed(action.task_type(), &e)).await;
        return Err(e);
    }

    action
        .record(ctx, user_id, origin, &task.reason, task.moderator_id)
        .await;
    ctx.notify(
        origin,
        &Notice::Applied {
            mention,
            action: action.task_type(),
            reason: task.reason.clone(),
        },
    )
    .await;

    let mut report = PropagationReport {
        origin,
        ..PropagationReport::default()
    };

    let chats = match with_rate_limit(ctx.retry, "list_administered_chats", move || {
        provider.list_administered_chats()
    })
    .await
    {
        Ok(chats) => chats,
        Err(e) => {
            error!(target: PROPAGATION_TARGET, user_id, error = %e, "Failed to list administered chats");
            report.enumeration_failed = Some(e.kind());
            return Ok(report);
        }
    };

    let reason = propagated_reason(origin, &task.reason);

    for chat_id in chats.into_iter().filter(|chat_id| *chat_id != origin) {
        let outcome = sweep_chat(ctx, action, chat_id, user_id, &reason, task).await;
        report.chats.push((chat_id, outcome));
    }

    info!(
        target: PROPAGATION_TARGET,
        action = %action.task_type(),
        user_id,
        origin,
        applied = report.applied().len(),
        failed = report.failed().len(),
        "Propagation finished"
    );

    Ok(report)
}

async fn sweep_chat(
    ctx: &HandlerContext,
    action: CrossChatAction,
    chat_id: ChatId,
    user_id: UserId,
    reason: &str,
    task: &Task,
) -> ChatOutcome {
    let provider = ctx.provider.as_ref();

    match provider.probe_membership(chat_id, user_id).await {
        Ok(true) => {}
        Ok(false) => return ChatOutcome::Absent,
        Err(e) => {
            warn!(target: PROPAGATION_TARGET, chat_id, user_id, error = %e, "Membership probe failed, skipping chat");
            return ChatOutcome::Failed(e.kind());
        }
    }

    if let Err(e) = action.apply(provider, chat_id, user_id).await {
        if e.is_skippable() {
            warn!(target: PROPAGATION_TARGET, chat_id, user_id, error = %e, "Propagated action failed, skipping chat");
        } else {
            error!(target: PROPAGATION_TARGET, chat_id, user_id, error = %e, "Propagated action failed, skipping chat");
        }
        return ChatOutcome::Failed(e.kind());
    }

    action
        .record(ctx, user_id, chat_id, reason, task.moderator_id)
        .await;

    let chat_name = match provider.chat_title(chat_id).await {
        Ok(Some(title)) => title,
        _ => format!("chat {chat_id}"),
    };
    ctx.notify(
        chat_id,
        &Notice::Propagated {
            mention: task.mention(),
            action: action.task_type(),
            chat_name,
            reason: task.reason.clone(),
        },
    )
    .await;
    tokio::time::sleep(ctx.propagation.notify_delay).await;

    ChatOutcome::Applied
}

/// Play the configured farewell track in the origin chat before acting
async fn send_farewell(ctx: &HandlerContext, task: &Task, action: CrossChatAction) {
    let Some(path) = ctx.propagation.farewell_audio.as_deref() else {
        return;
    };
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        warn!(path = %path.display(), "Farewell audio file not found, skipping");
        return;
    }

    let caption = Notice::Farewell {
        mention: task.mention(),
        action: action.task_type(),
        reason: task.reason.clone(),
    }
    .to_string();
    let caption = caption.as_str();
    let provider = ctx.provider.as_ref();
    let chat_id = task.chat_id;

    match with_rate_limit(ctx.retry, "send_audio", move || {
        provider.send_audio(chat_id, path, caption)
    })
    .await
    {
        Ok(_) => tokio::time::sleep(ctx.propagation.farewell_delay).await,
        Err(e) => warn!(chat_id, error = %e, "Failed to send farewell audio"),
    }
}
