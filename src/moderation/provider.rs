//! Chat capability
//!
//! The operations the moderation pipeline needs from a chat platform. Concrete
//! clients live outside this crate; they translate their own failures into
//! [`ModerationError`](crate::moderation::ModerationError) variants, reporting
//! flood-control responses as `RateLimited`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::moderation::{ChatId, MessageId, ModerationResult, UserId};

/// Membership status of a user in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    #[display("Owner")]
    Creator,
    #[display("Administrator")]
    Administrator,
    #[display("Member")]
    Member,
    #[display("Restricted")]
    Restricted,
    #[display("Left the chat")]
    Left,
    #[display("Kicked")]
    Kicked,
}

impl MemberStatus {
    /// Whether the user is currently inside the chat
    #[must_use]
    pub fn is_present(self) -> bool {
        matches!(
            self,
            Self::Creator | Self::Administrator | Self::Member | Self::Restricted
        )
    }

    #[must_use]
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Creator | Self::Administrator)
    }
}

/// Change applied by [`ChatProvider::restrict_member`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Restriction {
    /// No sending of any kind until the given instant
    Muted { until: DateTime<Utc> },
    /// Restore the default member permissions
    Lifted,
}

/// Operations consumed from the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        restriction: Restriction,
    ) -> ModerationResult<()>;

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        revoke_messages: bool,
    ) -> ModerationResult<()>;

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> ModerationResult<()>;

    async fn get_member_status(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> ModerationResult<MemberStatus>;

    /// Chats where the agent is creator or administrator
    async fn list_administered_chats(&self) -> ModerationResult<Vec<ChatId>>;

    /// Whether the user is currently a participant of the chat
    async fn probe_membership(&self, chat_id: ChatId, user_id: UserId) -> ModerationResult<bool>;

    async fn send_message(&self, chat_id: ChatId, text: &str) -> ModerationResult<MessageId>;

    async fn send_audio(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
    ) -> ModerationResult<MessageId>;

    async fn pin_message(&self, chat_id: ChatId, message_id: MessageId) -> ModerationResult<()>;

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ModerationResult<()>;

    /// Resolve a `@username` (with or without the `@`) to a numeric id
    async fn resolve_username(&self, username: &str) -> ModerationResult<Option<UserId>>;

    async fn chat_title(&self, chat_id: ChatId) -> ModerationResult<Option<String>>;

    /// Mention handles of every participant, for announcements
    async fn list_participants(&self, chat_id: ChatId) -> ModerationResult<Vec<String>>;
}

/// Kick = ban without revoking history, then lift the ban so the user may rejoin
pub async fn kick_member(
    provider: &dyn ChatProvider,
    chat_id: ChatId,
    user_id: UserId,
) -> ModerationResult<()> {
    provider.ban_member(chat_id, user_id, false).await?;
    provider.unban_member(chat_id, user_id).await
}
