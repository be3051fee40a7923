//! Forbidden-word filter
//!
//! Incoming messages are checked against a word list when the chat has its
//! filter enabled. A match mutes the sender for a day, logs the mute without a
//! moderator and deletes the message. The chat setting is read from the store
//! for every message.

use chrono::Utc;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{error, info, warn};

use crate::moderation::handler::{HandlerContext, failed};
use crate::moderation::{
    ChatId, MessageId, Notice, PunishmentEntry, PunishmentKind, Restriction, TaskType, UserId,
};
use crate::{AUDIT_TARGET, ERROR_TARGET};

/// Length of the automatic mute
pub const FILTER_MUTE_MINUTES: u32 = 24 * 60;

/// Lowercased forbidden words, matched as substrings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForbiddenWords {
    words: BTreeSet<String>,
}

impl ForbiddenWords {
    pub fn new<S: AsRef<str>>(words: impl IntoIterator<Item = S>) -> Self {
        let words = words
            .into_iter()
            .map(|word| word.as_ref().trim().to_lowercase())
            .filter(|word| !word.is_empty())
            .collect();
        Self { words }
    }

    /// Read one word per line; a missing or unreadable file gives an empty list
    pub async fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                let words = Self::new(content.lines());
                info!(path = %path.display(), words = words.len(), "Loaded forbidden words");
                words
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "Forbidden word list not found, filter has no words");
                Self::default()
            }
            Err(e) => {
                error!(target: ERROR_TARGET, path = %path.display(), error = %e, "Failed to read forbidden words");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// First forbidden word contained in `text`, ignoring case
    #[must_use]
    pub fn find(&self, text: &str) -> Option<&str> {
        let text = text.to_lowercase();
        self.words
            .iter()
            .find(|word| text.contains(word.as_str()))
            .map(String::as_str)
    }
}

/// A message posted in a moderated chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub user_id: UserId,
    pub username: Option<String>,
    /// Absent for media without a caption
    pub text: Option<String>,
}

impl ChatMessage {
    fn mention(&self) -> String {
        match self.username.as_deref() {
            Some(name) if !name.is_empty() => format!("@{}", name.trim_start_matches('@')),
            _ => format!("ID:{}", self.user_id),
        }
    }
}

/// What the filter did with a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterHit {
    pub word: String,
    /// Whether the mute went through
    pub muted: bool,
}

/// Check `message` and punish the sender on a forbidden word
///
/// Returns `None` when the filter is off, the message has no text or nothing
/// matched. Provider and store failures are logged and never returned; a store
/// that cannot be read leaves the filter on.
pub async fn filter_message(
    ctx: &HandlerContext,
    words: &ForbiddenWords,
    message: &ChatMessage,
) -> Option<FilterHit> {
    let chat_id = message.chat_id;
    let user_id = message.user_id;

    let enabled = match ctx.store.get_filter_enabled(chat_id).await {
        Ok(enabled) => enabled,
        Err(e) => {
            error!(target: ERROR_TARGET, chat_id, error = %e, "Failed to read filter setting");
            true
        }
    };
    if !enabled {
        return None;
    }

    let word = words.find(message.text.as_deref()?)?.to_string();
    info!(target: AUDIT_TARGET, user_id, chat_id, %word, "Forbidden word detected");

    let until = Utc::now() + chrono::Duration::minutes(i64::from(FILTER_MUTE_MINUTES));
    let muted = match ctx
        .provider
        .restrict_member(chat_id, user_id, Restriction::Muted { until })
        .await
    {
        Ok(()) => {
            ctx.record(
                PunishmentEntry::new(
                    user_id,
                    chat_id,
                    PunishmentKind::Mute,
                    format!("forbidden word: {word}"),
                )
                .with_duration(Some(FILTER_MUTE_MINUTES)),
            )
            .await;
            ctx.notify(
                chat_id,
                &Notice::Filtered {
                    mention: message.mention(),
                    minutes: FILTER_MUTE_MINUTES,
                },
            )
            .await;
            true
        }
        Err(e) => {
            warn!(user_id, chat_id, error = %e, "Filter mute failed");
            ctx.notify(chat_id, &failed(TaskType::Mute, &e)).await;
            false
        }
    };

    if let Err(e) = ctx.provider.delete_message(chat_id, message.message_id).await {
        warn!(chat_id, message_id = message.message_id, error = %e, "Failed to delete filtered message");
    }

    Some(FilterHit { word, muted })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::testing::{Call, DownStore, FakeChat};
    use crate::moderation::{MemoryStore, ModerationError};
    use crate::settings::toggle_filter;
    use std::sync::Arc;

    fn message(text: &str) -> ChatMessage {
        ChatMessage {
            chat_id: -1,
            message_id: 500,
            user_id: 42,
            username: Some("bob".into()),
            text: Some(text.into()),
        }
    }

    fn words() -> ForbiddenWords {
        ForbiddenWords::new(["Casino", "  ", "spam link"])
    }

    #[test]
    fn test_words_match_ignoring_case() {
        let words = words();
        assert_eq!(words.len(), 2);
        assert_eq!(words.find("Visit my CASINO now"), Some("casino"));
        assert_eq!(words.find("here is a Spam Link"), Some("spam link"));
        assert_eq!(words.find("hello there"), None);
    }

    #[tokio::test]
    async fn test_load_reads_one_word_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("words.txt");
        tokio::fs::write(&path, "Casino\n\n  scam \n").await.unwrap();

        let words = ForbiddenWords::load(&path).await;
        assert_eq!(words, ForbiddenWords::new(["casino", "scam"]));
        assert!(ForbiddenWords::load(dir.path().join("absent.txt")).await.is_empty());
    }

    #[tokio::test]
    async fn test_match_mutes_for_a_day_and_deletes() {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = HandlerContext::new(chat.clone(), store.clone());

        let hit = filter_message(&ctx, &words(), &message("cheap casino"))
            .await
            .unwrap();
        assert_eq!(hit, FilterHit { word: "casino".into(), muted: true });

        let log = store.punishments().await;
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].kind, PunishmentKind::Mute);
        assert_eq!(log[0].reason, "forbidden word: casino");
        assert_eq!(log[0].duration_minutes, Some(FILTER_MUTE_MINUTES));
        assert_eq!(log[0].moderator_id, None);

        assert!(matches!(
            chat.calls()[0],
            Call::Restrict { chat_id: -1, user_id: 42, restriction: Restriction::Muted { .. } }
        ));
        assert_eq!(chat.messages_to(-1), vec![
            "@bob was muted for 24 hours for using a forbidden word.".to_string()
        ]);
        assert!(chat.calls().contains(&Call::Delete { chat_id: -1, message_id: 500 }));
    }

    #[tokio::test]
    async fn test_disabled_chat_is_left_alone() {
        let chat = Arc::new(FakeChat::new());
        let store = Arc::new(MemoryStore::new());
        let ctx = HandlerContext::new(chat.clone(), store.clone());

        assert!(!toggle_filter(store.as_ref(), -1).await.unwrap());
        assert!(filter_message(&ctx, &words(), &message("casino")).await.is_none());

        assert!(toggle_filter(store.as_ref(), -1).await.unwrap());
        assert!(filter_message(&ctx, &words(), &message("casino")).await.is_some());
        assert_eq!(store.punishments().await.len(), 1);
    }

    #[tokio::test]
    async fn test_clean_or_textless_messages_pass() {
        let chat = Arc::new(FakeChat::new());
        let ctx = HandlerContext::new(chat.clone(), Arc::new(MemoryStore::new()));

        assert!(filter_message(&ctx, &words(), &message("good morning")).await.is_none());
        let media = ChatMessage { text: None, ..message("") };
        assert!(filter_message(&ctx, &words(), &media).await.is_none());
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_mute_still_deletes_message() {
        let chat = Arc::new(FakeChat::new());
        chat.fail_actions_in(-1, ModerationError::permission(-1, "not enough rights"));
        let store = Arc::new(MemoryStore::new());
        let ctx = HandlerContext::new(chat.clone(), store.clone());

        let hit = filter_message(&ctx, &words(), &message("casino")).await.unwrap();
        assert!(!hit.muted);
        assert!(store.punishments().await.is_empty());
        assert!(chat.messages_to(-1)[0].starts_with("Could not mute"));
        assert!(chat.calls().contains(&Call::Delete { chat_id: -1, message_id: 500 }));
    }

    #[tokio::test]
    async fn test_unreadable_setting_keeps_filter_on() {
        let chat = Arc::new(FakeChat::new());
        let ctx = HandlerContext::new(chat.clone(), Arc::new(DownStore));

        let hit = filter_message(&ctx, &words(), &message("casino")).await.unwrap();
        assert!(hit.muted);
        assert_eq!(chat.messages_to(-1).len(), 1);
    }
}
