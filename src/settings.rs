//! Per-chat feature toggles
//!
//! Settings are always read fresh from the store. Toggles are a plain
//! read-then-write: two concurrent toggles of the same chat can both read the
//! old value and write the same new one.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::moderation::{
    ChatId, ChatProvider, ModerationResult, ModerationStore, RetryPolicy, with_rate_limit,
};

/// Feature flags of one chat
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSettings {
    pub chat_id: ChatId,
    /// Delete messages containing banned words
    #[serde(default = "enabled")]
    pub filter_enabled: bool,
    /// Greet new members
    #[serde(default = "enabled")]
    pub welcome_enabled: bool,
}

const fn enabled() -> bool {
    true
}

impl ChatSettings {
    #[must_use]
    pub fn new(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            filter_enabled: true,
            welcome_enabled: true,
        }
    }
}

/// Flip the word filter for `chat_id`; returns the new value
///
/// # Errors
///
/// Returns an error if the store read or write fails.
pub async fn toggle_filter(store: &dyn ModerationStore, chat_id: ChatId) -> ModerationResult<bool> {
    let enabled = !store.get_filter_enabled(chat_id).await?;
    store.set_filter_enabled(chat_id, enabled).await?;
    info!(chat_id, enabled, "Toggled word filter");
    Ok(enabled)
}

/// Flip welcome messages for `chat_id`; returns the new value
///
/// # Errors
///
/// Returns an error if the store read or write fails.
pub async fn toggle_welcome(store: &dyn ModerationStore, chat_id: ChatId) -> ModerationResult<bool> {
    let enabled = !store.get_welcome_enabled(chat_id).await?;
    store.set_welcome_enabled(chat_id, enabled).await?;
    info!(chat_id, enabled, "Toggled welcome messages");
    Ok(enabled)
}

/// Make sure every administered chat has a settings row
///
/// Existing rows are left untouched. Returns the chats that got new rows.
///
/// # Errors
///
/// Returns an error if the administered chats cannot be listed.
pub async fn sync_chat_settings(
    provider: &dyn ChatProvider,
    store: &dyn ModerationStore,
    policy: RetryPolicy,
) -> ModerationResult<Vec<ChatId>> {
    let chats = with_rate_limit(policy, "list_administered_chats", move || {
        provider.list_administered_chats()
    })
    .await?;

    let mut added = Vec::new();
    for chat_id in chats {
        match store.ensure_chat_settings(chat_id).await {
            Ok(true) => added.push(chat_id),
            Ok(false) => {}
            Err(e) => warn!(chat_id, error = %e, "Failed to create chat settings"),
        }
    }

    info!(added = added.len(), "Synchronised chat settings");
    Ok(added)
}
