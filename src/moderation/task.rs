//! Moderation task types
//!
//! A [`Task`] is the immutable request a producer pushes onto the queue. It
//! travels as a flat JSON record so that producers written in anything can
//! enqueue work.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::moderation::{ModerationError, ModerationResult};

pub type UserId = i64;
pub type ChatId = i64;
pub type MessageId = i64;

/// Kind of moderation action a task requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Ban,
    Kick,
    Mute,
    Warn,
    Unban,
    Unmute,
    Unwarn,
    /// Read-only user report
    Info,
}

impl TaskType {
    pub const ALL: [Self; 8] = [
        Self::Ban,
        Self::Kick,
        Self::Mute,
        Self::Warn,
        Self::Unban,
        Self::Unmute,
        Self::Unwarn,
        Self::Info,
    ];

    /// Whether a successful action is replayed across other administered chats
    #[must_use]
    pub fn propagates(self) -> bool {
        matches!(self, Self::Ban | Self::Kick)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Kick => "kick",
            Self::Mute => "mute",
            Self::Warn => "warn",
            Self::Unban => "unban",
            Self::Unmute => "unmute",
            Self::Unwarn => "unwarn",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested moderation action, exactly as it sits on the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_type: TaskType,
    /// Target user; absent for `info`, which resolves the username instead
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub reason: String,
    /// Chat the command was issued in
    pub chat_id: ChatId,
    pub moderator_id: UserId,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

impl Task {
    /// Create a bare task; attach target data with the `with_*` methods
    pub fn new(task_type: TaskType, chat_id: ChatId, moderator_id: UserId) -> Self {
        Self {
            task_type,
            user_id: None,
            username: None,
            reason: String::new(),
            chat_id,
            moderator_id,
            duration_minutes: None,
        }
    }

    #[must_use]
    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    #[must_use]
    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = Some(minutes);
        self
    }

    /// Build a mute task, falling back to `default_minutes` when no duration is given
    pub fn mute_with_default(
        user_id: UserId,
        chat_id: ChatId,
        moderator_id: UserId,
        reason: impl Into<String>,
        minutes: Option<u32>,
        default_minutes: u32,
    ) -> Self {
        Self::new(TaskType::Mute, chat_id, moderator_id)
            .with_user(user_id)
            .with_reason(reason)
            .with_duration(minutes.unwrap_or(default_minutes))
    }

    /// Check the fields each task type requires
    ///
    /// # Errors
    ///
    /// Returns `MalformedTask` naming the first missing field.
    pub fn validate(&self) -> ModerationResult<()> {
        let missing = |field: &str| {
            Err(ModerationError::MalformedTask(format!(
                "{} task is missing `{field}`",
                self.task_type
            )))
        };

        match self.task_type {
            TaskType::Info => {
                if self.username.as_deref().is_none_or(|name| name.trim().is_empty()) {
                    return missing("username");
                }
            }
            task_type => {
                if self.user_id.is_none() {
                    return missing("user_id");
                }
                let needs_reason = matches!(
                    task_type,
                    TaskType::Ban | TaskType::Kick | TaskType::Warn | TaskType::Mute
                );
                if needs_reason && self.reason.trim().is_empty() {
                    return missing("reason");
                }
                if task_type == TaskType::Mute && self.duration_minutes.is_none() {
                    return missing("duration_minutes");
                }
            }
        }

        Ok(())
    }

    /// The target user id, required by every task type except `info`
    ///
    /// # Errors
    ///
    /// Returns `MalformedTask` when the id is absent.
    pub fn target_user(&self) -> ModerationResult<UserId> {
        self.user_id.ok_or_else(|| {
            ModerationError::MalformedTask(format!("{} task has no user_id", self.task_type))
        })
    }

    /// Human-readable handle for notices: `@name` when known, otherwise the id
    #[must_use]
    pub fn mention(&self) -> String {
        match (&self.username, self.user_id) {
            (Some(name), _) if !name.is_empty() => format!("@{}", name.trim_start_matches('@')),
            (_, Some(id)) => format!("ID:{id}"),
            _ => "unknown user".to_string(),
        }
    }

    /// Serialize to the queue wire format
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> ModerationResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse and validate a raw queue payload
    ///
    /// # Errors
    ///
    /// Returns `MalformedTask` for undecodable payloads, unknown task types or
    /// missing required fields.
    pub fn decode(raw: &str) -> ModerationResult<Self> {
        let task: Self = serde_json::from_str(raw)?;
        task.validate()?;
        Ok(task)
    }
}
