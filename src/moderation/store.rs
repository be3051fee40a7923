//! Persistence capability
//!
//! The pipeline only talks to [`ModerationStore`]. [`MemoryStore`] is the
//! in-process implementation, snapshotted to disk by [`crate::data`].

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::moderation::escalation::WARNING_THRESHOLD;
use crate::moderation::{
    BanRecord, ChatId, ModerationResult, PunishmentEntry, UserId, WarningRecord,
};
use crate::settings::ChatSettings;

/// Persistence operations consumed by the handlers
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Increment the warning count, creating the record at 1; returns the new count
    async fn upsert_warning(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<u32>;

    /// Decrement the warning count, deleting the record at 0
    ///
    /// Returns the remaining count. A record that just hit zero and a record
    /// that never existed both return 0.
    async fn remove_warning(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<u32>;

    async fn get_warning_count(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<u32>;

    async fn upsert_ban(&self, user_id: UserId, chat_id: ChatId, reason: &str)
    -> ModerationResult<()>;

    async fn remove_ban(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<()>;

    async fn get_ban(&self, user_id: UserId, chat_id: ChatId)
    -> ModerationResult<Option<BanRecord>>;

    async fn append_punishment(&self, entry: PunishmentEntry) -> ModerationResult<()>;

    /// Punishment history of a user in one chat, newest first
    async fn query_punishments(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> ModerationResult<Vec<PunishmentEntry>>;

    /// Defaults to enabled for chats without settings
    async fn get_filter_enabled(&self, chat_id: ChatId) -> ModerationResult<bool>;

    async fn set_filter_enabled(&self, chat_id: ChatId, enabled: bool) -> ModerationResult<()>;

    /// Defaults to enabled for chats without settings
    async fn get_welcome_enabled(&self, chat_id: ChatId) -> ModerationResult<bool>;

    async fn set_welcome_enabled(&self, chat_id: ChatId, enabled: bool) -> ModerationResult<()>;

    /// Insert default settings for a chat; returns false if a row already existed
    async fn ensure_chat_settings(&self, chat_id: ChatId) -> ModerationResult<bool>;

    /// Chats that have a settings row
    async fn known_chats(&self) -> ModerationResult<Vec<ChatId>>;
}

/// In-process store backed by concurrent maps
#[derive(Clone, Default)]
pub struct MemoryStore {
    pub(crate) warnings: Arc<DashMap<(UserId, ChatId), u32>>,
    pub(crate) bans: Arc<DashMap<(UserId, ChatId), String>>,
    pub(crate) punishments: Arc<RwLock<Vec<PunishmentEntry>>>,
    pub(crate) settings: Arc<DashMap<ChatId, ChatSettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every punishment entry in insertion order
    pub async fn punishments(&self) -> Vec<PunishmentEntry> {
        self.punishments.read().await.clone()
    }

    pub fn warning_records(&self) -> Vec<WarningRecord> {
        self.warnings
            .iter()
            .map(|entry| {
                let (user_id, chat_id) = *entry.key();
                WarningRecord {
                    user_id,
                    chat_id,
                    count: *entry.value(),
                }
            })
            .collect()
    }

    pub fn ban_records(&self) -> Vec<BanRecord> {
        self.bans
            .iter()
            .map(|entry| {
                let (user_id, chat_id) = *entry.key();
                BanRecord {
                    user_id,
                    chat_id,
                    reason: entry.value().clone(),
                }
            })
            .collect()
    }

    fn settings_or_default(&self, chat_id: ChatId) -> ChatSettings {
        self.settings
            .get(&chat_id)
            .map_or_else(|| ChatSettings::new(chat_id), |entry| entry.value().clone())
    }
}

#[async_trait]
impl ModerationStore for MemoryStore {
    async fn upsert_warning(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<u32> {
        let mut count = self.warnings.entry((user_id, chat_id)).or_insert(0);
        *count = (*count + 1).min(WARNING_THRESHOLD);
        Ok(*count)
    }

    async fn remove_warning(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<u32> {
        match self.warnings.entry((user_id, chat_id)) {
            Entry::Occupied(mut entry) => {
                let remaining = entry.get().saturating_sub(1);
                if remaining == 0 {
                    entry.remove();
                } else {
                    *entry.get_mut() = remaining;
                }
                Ok(remaining)
            }
            Entry::Vacant(_) => Ok(0),
        }
    }

    async fn get_warning_count(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<u32> {
        Ok(self
            .warnings
            .get(&(user_id, chat_id))
            .map_or(0, |count| *count))
    }

    async fn upsert_ban(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        reason: &str,
    ) -> ModerationResult<()> {
        self.bans.insert((user_id, chat_id), reason.to_string());
        Ok(())
    }

    async fn remove_ban(&self, user_id: UserId, chat_id: ChatId) -> ModerationResult<()> {
        self.bans.remove(&(user_id, chat_id));
        Ok(())
    }

    async fn get_ban(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> ModerationResult<Option<BanRecord>> {
        Ok(self.bans.get(&(user_id, chat_id)).map(|reason| BanRecord {
            user_id,
            chat_id,
            reason: reason.clone(),
        }))
    }

    async fn append_punishment(&self, entry: PunishmentEntry) -> ModerationResult<()> {
        self.punishments.write().await.push(entry);
        Ok(())
    }

    async fn query_punishments(
        &self,
        user_id: UserId,
        chat_id: ChatId,
    ) -> ModerationResult<Vec<PunishmentEntry>> {
        let log = self.punishments.read().await;
        Ok(log
            .iter()
            .rev()
            .filter(|entry| entry.user_id == user_id && entry.chat_id == chat_id)
            .cloned()
            .collect())
    }

    async fn get_filter_enabled(&self, chat_id: ChatId) -> ModerationResult<bool> {
        Ok(self.settings_or_default(chat_id).filter_enabled)
    }

    async fn set_filter_enabled(&self, chat_id: ChatId, enabled: bool) -> ModerationResult<()> {
        self.settings
            .entry(chat_id)
            .or_insert_with(|| ChatSettings::new(chat_id))
            .filter_enabled = enabled;
        Ok(())
    }

    async fn get_welcome_enabled(&self, chat_id: ChatId) -> ModerationResult<bool> {
        Ok(self.settings_or_default(chat_id).welcome_enabled)
    }

    async fn set_welcome_enabled(&self, chat_id: ChatId, enabled: bool) -> ModerationResult<()> {
        self.settings
            .entry(chat_id)
            .or_insert_with(|| ChatSettings::new(chat_id))
            .welcome_enabled = enabled;
        Ok(())
    }

    async fn ensure_chat_settings(&self, chat_id: ChatId) -> ModerationResult<bool> {
        match self.settings.entry(chat_id) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(ChatSettings::new(chat_id));
                Ok(true)
            }
        }
    }

    async fn known_chats(&self) -> ModerationResult<Vec<ChatId>> {
        let mut chats: Vec<_> = self.settings.iter().map(|entry| *entry.key()).collect();
        chats.sort_unstable();
        Ok(chats)
    }
}
