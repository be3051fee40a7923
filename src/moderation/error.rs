//! Error types for the moderation pipeline
//!
//! Every failure a handler, the queue or a capability can produce maps onto one
//! of these variants. The worker only ever sees the coarse [`ErrorKind`].

use std::time::Duration;

use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while moderating
#[derive(Debug, Clone, Error)]
pub enum ModerationError {
    /// The provider asked us to back off for a while
    #[error("Rate limited, retry after {}s", .retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    /// The agent lacks rights in this chat
    #[error("Permission denied in chat {chat_id}: {message}")]
    PermissionDenied { chat_id: i64, message: String },

    /// Target is not a member, or the chat cannot be resolved
    #[error("Not found: {0}")]
    NotFound(String),

    /// Queue payload could not be decoded or is missing required fields
    #[error("Malformed task: {0}")]
    MalformedTask(String),

    /// The persistence store failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// The queue backend failed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Any other provider-side failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Rate-limit retries ran out of attempts or cumulative wait
    #[error("Retry budget exhausted after {attempts} attempts ({}s waited)", .waited.as_secs())]
    RetryBudgetExhausted { attempts: u32, waited: Duration },

    /// Generic error
    #[error("Moderation error: {0}")]
    Other(String),
}

/// Coarse classification of a [`ModerationError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[display("transient_provider")]
    TransientProvider,
    #[display("permission")]
    Permission,
    #[display("not_found")]
    NotFound,
    #[display("malformed_task")]
    MalformedTask,
    #[display("persistence")]
    Persistence,
    #[display("queue")]
    Queue,
    #[display("provider")]
    Provider,
    #[display("other")]
    Other,
}

impl ModerationError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RateLimited { .. } | Self::RetryBudgetExhausted { .. } => {
                ErrorKind::TransientProvider
            }
            Self::PermissionDenied { .. } => ErrorKind::Permission,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::MalformedTask(_) => ErrorKind::MalformedTask,
            Self::Persistence(_) => ErrorKind::Persistence,
            Self::Queue(_) => ErrorKind::Queue,
            Self::Provider(_) => ErrorKind::Provider,
            Self::Other(_) => ErrorKind::Other,
        }
    }

    /// Whether a per-chat step may log this error and move on to the next chat
    #[must_use]
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied { .. } | Self::NotFound(_) | Self::Provider(_)
        )
    }

    pub fn permission(chat_id: i64, message: impl Into<String>) -> Self {
        Self::PermissionDenied {
            chat_id,
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for ModerationError {
    fn from(error: redis::RedisError) -> Self {
        Self::Queue(error.to_string())
    }
}

impl From<deadpool_redis::PoolError> for ModerationError {
    fn from(error: deadpool_redis::PoolError) -> Self {
        Self::Queue(format!("failed to get redis connection: {error}"))
    }
}

impl From<serde_json::Error> for ModerationError {
    fn from(error: serde_json::Error) -> Self {
        Self::MalformedTask(error.to_string())
    }
}

impl From<serde_yaml::Error> for ModerationError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<std::io::Error> for ModerationError {
    fn from(error: std::io::Error) -> Self {
        Self::Persistence(error.to_string())
    }
}

impl From<String> for ModerationError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for moderation operations
pub type ModerationResult<T> = Result<T, ModerationError>;
