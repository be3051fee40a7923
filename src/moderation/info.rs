//! User info aggregation
//!
//! Read-only: resolves a username, then collects the punishment history for
//! the requesting chat and the user's membership across administered chats.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use tracing::{info, warn};

use crate::moderation::handler::HandlerContext;
use crate::moderation::{
    ChatId, MemberStatus, ModerationError, ModerationResult, Notice, PunishmentEntry, Task, UserId,
    send_text, with_rate_limit,
};

/// Membership in one chat other than the requesting one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMembership {
    pub chat_id: ChatId,
    pub title: String,
    pub status: MemberStatus,
}

/// Everything known about a user, as seen from the requesting chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfoReport {
    pub username: String,
    pub user_id: UserId,
    /// Status in the requesting chat, if it could be read
    pub status: Option<MemberStatus>,
    pub memberships: Vec<ChatMembership>,
    /// Newest first
    pub history: Vec<PunishmentEntry>,
}

impl Display for InfoReport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "User @{} (ID: {})", self.username, self.user_id)?;
        match self.status {
            Some(status) => writeln!(f, "Status here: {status}")?,
            None => writeln!(f, "Status here: not a member")?,
        }

        writeln!(f)?;
        if self.memberships.is_empty() {
            writeln!(f, "Not present in other chats.")?;
        } else {
            writeln!(f, "Other chats ({}):", self.memberships.len())?;
            for membership in &self.memberships {
                writeln!(f, "- {} ({})", membership.title, membership.status)?;
            }
        }

        writeln!(f)?;
        if self.history.is_empty() {
            write!(f, "No punishments recorded in this chat.")
        } else {
            write!(f, "Punishments ({}):", self.history.len())?;
            for entry in &self.history {
                write!(f, "\n- {}", entry.kind)?;
                if let Some(minutes) = entry.duration_minutes {
                    write!(f, " ({minutes} min)")?;
                }
                write!(f, ": {}", entry.reason)?;
                match entry.moderator_id {
                    Some(moderator) => write!(f, " by ID:{moderator}")?,
                    None => write!(f, " by unknown moderator")?,
                }
                write!(f, " on {}", entry.timestamp.format("%Y-%m-%d %H:%M"))?;
            }
            Ok(())
        }
    }
}

/// Build the info report for `task.username` and send it to the requesting chat
///
/// # Errors
///
/// Returns `NotFound` if the username does not resolve (a notice is still
/// sent), or the provider error if the report cannot be delivered.
pub async fn report(ctx: &HandlerContext, task: &Task) -> ModerationResult<InfoReport> {
    let username = task
        .username
        .as_deref()
        .map(|name| name.trim_start_matches('@').to_string())
        .ok_or_else(|| ModerationError::MalformedTask("info task is missing `username`".into()))?;
    let chat_id = task.chat_id;
    let provider = ctx.provider.as_ref();

    let Some(user_id) = provider.resolve_username(&username).await? else {
        ctx.notify(
            chat_id,
            &Notice::UserNotFound {
                username: username.clone(),
            },
        )
        .await;
        return Err(ModerationError::NotFound(format!("user @{username}")));
    };

    let history = ctx
        .store
        .query_punishments(user_id, chat_id)
        .await
        .unwrap_or_else(|e| {
            warn!(user_id, chat_id, error = %e, "Failed to read punishment history");
            Vec::new()
        });

    let status = provider
        .get_member_status(chat_id, user_id)
        .await
        .inspect_err(|e| warn!(user_id, chat_id, error = %e, "Failed to read member status"))
        .ok();

    let memberships = collect_memberships(ctx, chat_id, user_id).await;

    let report = InfoReport {
        username,
        user_id,
        status,
        memberships,
        history,
    };
    info!(
        user_id,
        chat_id,
        punishments = report.history.len(),
        chats = report.memberships.len(),
        "Built info report"
    );

    send_text(provider, ctx.retry, chat_id, &report.to_string()).await?;
    Ok(report)
}

async fn collect_memberships(
    ctx: &HandlerContext,
    origin: ChatId,
    user_id: UserId,
) -> Vec<ChatMembership> {
    let provider = ctx.provider.as_ref();
    let chats = match with_rate_limit(ctx.retry, "list_administered_chats", move || {
        provider.list_administered_chats()
    })
    .await
    {
        Ok(chats) => chats,
        Err(e) => {
            warn!(user_id, error = %e, "Failed to list administered chats for info");
            return Vec::new();
        }
    };

    let mut memberships = Vec::new();
    for chat_id in chats.into_iter().filter(|chat_id| *chat_id != origin) {
        match provider.probe_membership(chat_id, user_id).await {
            Ok(true) => {
                let status = provider
                    .get_member_status(chat_id, user_id)
                    .await
                    .unwrap_or(MemberStatus::Member);
                let title = match provider.chat_title(chat_id).await {
                    Ok(Some(title)) => title,
                    _ => format!("ID: {chat_id}"),
                };
                memberships.push(ChatMembership {
                    chat_id,
                    title,
                    status,
                });
            }
            Ok(false) => {}
            Err(e) => warn!(chat_id, user_id, error = %e, "Membership probe failed, skipping chat"),
        }
        tokio::time::sleep(ctx.propagation.info_probe_delay).await;
    }

    memberships
}
