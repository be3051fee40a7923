//! Chat notices sent after moderation actions
//!
//! Each chat where an action was attempted gets its own notice (or silence);
//! there is no aggregated summary across chats.

use std::fmt::{self, Display, Formatter};

use crate::moderation::escalation::WARNING_THRESHOLD;
use crate::moderation::{
    ChatId, ChatProvider, MessageId, ModerationResult, RetryPolicy, TaskType, with_rate_limit,
};

/// Message announcing the result of an action in one chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Caption for the farewell track played before a ban or kick
    Farewell {
        mention: String,
        action: TaskType,
        reason: String,
    },
    /// Action applied in the chat where it was requested
    Applied {
        mention: String,
        action: TaskType,
        reason: String,
    },
    /// Action replayed in another chat
    Propagated {
        mention: String,
        action: TaskType,
        chat_name: String,
        reason: String,
    },
    Failed {
        action: TaskType,
        error: String,
    },
    Muted {
        mention: String,
        minutes: u32,
        reason: String,
    },
    Warned {
        mention: String,
        count: u32,
        reason: String,
    },
    EscalationKick {
        mention: String,
        reason: String,
    },
    Unwarned {
        mention: String,
        remaining: u32,
    },
    /// Automatic mute after a forbidden word
    Filtered {
        mention: String,
        minutes: u32,
    },
    Lifted {
        mention: String,
        action: TaskType,
    },
    UserNotFound {
        username: String,
    },
}

fn past_tense(action: TaskType) -> &'static str {
    match action {
        TaskType::Ban => "banned",
        TaskType::Kick => "kicked",
        TaskType::Mute => "muted",
        TaskType::Warn => "warned",
        TaskType::Unban => "unbanned",
        TaskType::Unmute => "unmuted",
        TaskType::Unwarn => "relieved of a warning",
        TaskType::Info => "looked up",
    }
}

impl Display for Notice {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Farewell {
                mention,
                action,
                reason,
            } => write!(f, "{mention} is about to be {}. Reason: {reason}", past_tense(*action)),
            Self::Applied {
                mention,
                action,
                reason,
            } => write!(f, "{mention} was {} in this chat. Reason: {reason}.", past_tense(*action)),
            Self::Propagated {
                mention,
                action,
                chat_name,
                reason,
            } => write!(f, "{mention} was {} in {chat_name}. Reason: {reason}.", past_tense(*action)),
            Self::Failed { action, error } => write!(f, "Could not {action} the user: {error}"),
            Self::Muted {
                mention,
                minutes,
                reason,
            } => write!(f, "{mention} was muted for {minutes} minutes. Reason: {reason}."),
            Self::Warned {
                mention,
                count,
                reason,
            } => write!(f, "{mention} received warning {count}/{WARNING_THRESHOLD}. Reason: {reason}."),
            Self::EscalationKick { mention, reason } => write!(
                f,
                "{mention} reached {WARNING_THRESHOLD}/{WARNING_THRESHOLD} warnings and was kicked. Reason: {reason}."
            ),
            Self::Unwarned { mention, remaining } => write!(
                f,
                "Removed a warning from {mention}. {remaining}/{WARNING_THRESHOLD} remaining."
            ),
            Self::Filtered { mention, minutes } => write!(
                f,
                "{mention} was muted for {} hours for using a forbidden word.",
                minutes / 60
            ),
            Self::Lifted { mention, action } => {
                let lifted = match action {
                    TaskType::Unmute => "mute",
                    _ => "ban",
                };
                write!(f, "Lifted the {lifted} on {mention}.")
            }
            Self::UserNotFound { username } => {
                write!(f, "User @{} was not found.", username.trim_start_matches('@'))
            }
        }
    }
}

/// Send `notice` to `chat_id` through the rate-limit guard
///
/// # Errors
///
/// Returns the provider error if the send fails after retries.
pub async fn send_notice(
    provider: &dyn ChatProvider,
    policy: RetryPolicy,
    chat_id: ChatId,
    notice: &Notice,
) -> ModerationResult<MessageId> {
    send_text(provider, policy, chat_id, &notice.to_string()).await
}

/// Send free-form text through the rate-limit guard
///
/// # Errors
///
/// Returns the provider error if the send fails after retries.
pub async fn send_text(
    provider: &dyn ChatProvider,
    policy: RetryPolicy,
    chat_id: ChatId,
    text: &str,
) -> ModerationResult<MessageId> {
    with_rate_limit(policy, "send_message", move || {
        provider.send_message(chat_id, text)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warned_text_counts_against_threshold() {
        let notice = Notice::Warned {
            mention: "@bob".into(),
            count: 2,
            reason: "spam".into(),
        };
        assert_eq!(notice.to_string(), "@bob received warning 2/3. Reason: spam.");
    }

    #[test]
    fn test_propagated_text_names_chat() {
        let notice = Notice::Propagated {
            mention: "ID:42".into(),
            action: TaskType::Kick,
            chat_name: "Rust Chat".into(),
            reason: "raid".into(),
        };
        assert_eq!(notice.to_string(), "ID:42 was kicked in Rust Chat. Reason: raid.");
    }

    #[test]
    fn test_lifted_and_not_found() {
        let notice = Notice::Lifted {
            mention: "@bob".into(),
            action: TaskType::Unmute,
        };
        assert_eq!(notice.to_string(), "Lifted the mute on @bob.");
        let notice = Notice::UserNotFound {
            username: "@ghost".into(),
        };
        assert_eq!(notice.to_string(), "User @ghost was not found.");
    }
}
