//! Recording chat provider and an unreachable store for tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use crate::moderation::{
    BanRecord, ChatId, ChatProvider, MemberStatus, MessageId, ModerationError, ModerationResult,
    ModerationStore, PunishmentEntry, Restriction, UserId,
};

/// Provider call, in the order it was made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Restrict {
        chat_id: ChatId,
        user_id: UserId,
        restriction: Restriction,
    },
    Ban {
        chat_id: ChatId,
        user_id: UserId,
        revoke_messages: bool,
    },
    Unban {
        chat_id: ChatId,
        user_id: UserId,
    },
    Status {
        chat_id: ChatId,
        user_id: UserId,
    },
    ListChats,
    Probe {
        chat_id: ChatId,
        user_id: UserId,
    },
    Send {
        chat_id: ChatId,
        text: String,
    },
    Audio {
        chat_id: ChatId,
        path: PathBuf,
    },
    Pin {
        chat_id: ChatId,
        message_id: MessageId,
    },
    Delete {
        chat_id: ChatId,
        message_id: MessageId,
    },
    Resolve {
        username: String,
    },
    Title {
        chat_id: ChatId,
    },
    Participants {
        chat_id: ChatId,
    },
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    chats: Vec<ChatId>,
    members: HashSet<(ChatId, UserId)>,
    statuses: HashMap<(ChatId, UserId), MemberStatus>,
    titles: HashMap<ChatId, String>,
    usernames: HashMap<String, UserId>,
    participants: HashMap<ChatId, Vec<String>>,
    failing_chats: HashMap<ChatId, ModerationError>,
    failing_sends: HashSet<ChatId>,
    listing_limits: u32,
    listing_retry_after: Duration,
    next_message_id: MessageId,
}

/// In-memory chat platform that records every call
#[derive(Default)]
pub struct FakeChat {
    state: Mutex<State>,
}

impl FakeChat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_chats(self, chats: impl IntoIterator<Item = ChatId>) -> Self {
        self.state.lock().unwrap().chats.extend(chats);
        self
    }

    pub fn with_member(self, chat_id: ChatId, user_id: UserId) -> Self {
        self.state.lock().unwrap().members.insert((chat_id, user_id));
        self
    }

    pub fn with_status(self, chat_id: ChatId, user_id: UserId, status: MemberStatus) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            if status.is_present() {
                state.members.insert((chat_id, user_id));
            }
            state.statuses.insert((chat_id, user_id), status);
        }
        self
    }

    pub fn with_title(self, chat_id: ChatId, title: &str) -> Self {
        self.state.lock().unwrap().titles.insert(chat_id, title.to_string());
        self
    }

    pub fn with_username(self, username: &str, user_id: UserId) -> Self {
        self.state
            .lock()
            .unwrap()
            .usernames
            .insert(username.to_string(), user_id);
        self
    }

    pub fn with_participants(self, chat_id: ChatId, mentions: &[&str]) -> Self {
        self.state
            .lock()
            .unwrap()
            .participants
            .insert(chat_id, mentions.iter().map(|m| (*m).to_string()).collect());
        self
    }

    /// Make restrict, ban and unban fail in `chat_id`
    pub fn fail_actions_in(&self, chat_id: ChatId, error: ModerationError) {
        self.state.lock().unwrap().failing_chats.insert(chat_id, error);
    }

    pub fn fail_sends_in(&self, chat_id: ChatId) {
        self.state.lock().unwrap().failing_sends.insert(chat_id);
    }

    /// Answer the next `times` chat listings with a rate-limit signal
    pub fn rate_limit_listing(&self, times: u32, retry_after: Duration) {
        let mut state = self.state.lock().unwrap();
        state.listing_limits = times;
        state.listing_retry_after = retry_after;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn bans(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Ban { .. }))
            .collect()
    }

    pub fn messages_to(&self, chat_id: ChatId) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Send { chat_id: to, text } if to == chat_id => Some(text),
                _ => None,
            })
            .collect()
    }

    fn act(&self, call: Call, chat_id: ChatId) -> ModerationResult<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call);
        match state.failing_chats.get(&chat_id) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ChatProvider for FakeChat {
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        restriction: Restriction,
    ) -> ModerationResult<()> {
        self.act(
            Call::Restrict {
                chat_id,
                user_id,
                restriction,
            },
            chat_id,
        )
    }

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        revoke_messages: bool,
    ) -> ModerationResult<()> {
        self.act(
            Call::Ban {
                chat_id,
                user_id,
                revoke_messages,
            },
            chat_id,
        )?;
        self.state.lock().unwrap().members.remove(&(chat_id, user_id));
        Ok(())
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> ModerationResult<()> {
        self.act(Call::Unban { chat_id, user_id }, chat_id)
    }

    async fn get_member_status(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> ModerationResult<MemberStatus> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Status { chat_id, user_id });
        if let Some(status) = state.statuses.get(&(chat_id, user_id)) {
            return Ok(*status);
        }
        if state.members.contains(&(chat_id, user_id)) {
            Ok(MemberStatus::Member)
        } else {
            Ok(MemberStatus::Left)
        }
    }

    async fn list_administered_chats(&self) -> ModerationResult<Vec<ChatId>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::ListChats);
        if state.listing_limits > 0 {
            state.listing_limits -= 1;
            return Err(ModerationError::RateLimited {
                retry_after: state.listing_retry_after,
            });
        }
        Ok(state.chats.clone())
    }

    async fn probe_membership(&self, chat_id: ChatId, user_id: UserId) -> ModerationResult<bool> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Probe { chat_id, user_id });
        Ok(state.members.contains(&(chat_id, user_id)))
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> ModerationResult<MessageId> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Send {
            chat_id,
            text: text.to_string(),
        });
        if state.failing_sends.contains(&chat_id) {
            return Err(ModerationError::Provider("chat write forbidden".into()));
        }
        state.next_message_id += 1;
        Ok(state.next_message_id)
    }

    async fn send_audio(
        &self,
        chat_id: ChatId,
        path: &Path,
        _caption: &str,
    ) -> ModerationResult<MessageId> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Audio {
            chat_id,
            path: path.to_path_buf(),
        });
        state.next_message_id += 1;
        Ok(state.next_message_id)
    }

    async fn pin_message(&self, chat_id: ChatId, message_id: MessageId) -> ModerationResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Pin { chat_id, message_id });
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ModerationResult<()> {
        self.state
            .lock()
            .unwrap()
            .calls
            .push(Call::Delete { chat_id, message_id });
        Ok(())
    }

    async fn resolve_username(&self, username: &str) -> ModerationResult<Option<UserId>> {
        let mut state = self.state.lock().unwrap();
        let username = username.trim_start_matches('@').to_string();
        let resolved = state.usernames.get(&username).copied();
        state.calls.push(Call::Resolve { username });
        Ok(resolved)
    }

    async fn chat_title(&self, chat_id: ChatId) -> ModerationResult<Option<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Title { chat_id });
        Ok(state.titles.get(&chat_id).cloned())
    }

    async fn list_participants(&self, chat_id: ChatId) -> ModerationResult<Vec<String>> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Participants { chat_id });
        Ok(state.participants.get(&chat_id).cloned().unwrap_or_default())
    }
}

/// Store whose every operation fails, as when the database is down
pub struct DownStore;

fn down<T>() -> ModerationResult<T> {
    Err(ModerationError::Persistence("down".into()))
}

#[async_trait]
impl ModerationStore for DownStore {
    async fn upsert_warning(&self, _user_id: UserId, _chat_id: ChatId) -> ModerationResult<u32> {
        down()
    }
    async fn remove_warning(&self, _user_id: UserId, _chat_id: ChatId) -> ModerationResult<u32> {
        down()
    }
    async fn get_warning_count(&self, _user_id: UserId, _chat_id: ChatId) -> ModerationResult<u32> {
        down()
    }
    async fn upsert_ban(&self, _user_id: UserId, _chat_id: ChatId, _reason: &str) -> ModerationResult<()> {
        down()
    }
    async fn remove_ban(&self, _user_id: UserId, _chat_id: ChatId) -> ModerationResult<()> {
        down()
    }
    async fn get_ban(&self, _user_id: UserId, _chat_id: ChatId) -> ModerationResult<Option<BanRecord>> {
        down()
    }
    async fn append_punishment(&self, _entry: PunishmentEntry) -> ModerationResult<()> {
        down()
    }
    async fn query_punishments(
        &self,
        _user_id: UserId,
        _chat_id: ChatId,
    ) -> ModerationResult<Vec<PunishmentEntry>> {
        down()
    }
    async fn get_filter_enabled(&self, _chat_id: ChatId) -> ModerationResult<bool> {
        down()
    }
    async fn set_filter_enabled(&self, _chat_id: ChatId, _enabled: bool) -> ModerationResult<()> {
        down()
    }
    async fn get_welcome_enabled(&self, _chat_id: ChatId) -> ModerationResult<bool> {
        down()
    }
    async fn set_welcome_enabled(&self, _chat_id: ChatId, _enabled: bool) -> ModerationResult<()> {
        down()
    }
    async fn ensure_chat_settings(&self, _chat_id: ChatId) -> ModerationResult<bool> {
        down()
    }
    async fn known_chats(&self) -> ModerationResult<Vec<ChatId>> {
        down()
    }
}
