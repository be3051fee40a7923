use async_trait::async_trait;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use warden_daemon::filter::{ChatMessage, ForbiddenWords, filter_message};
use warden_daemon::logging::log_console;
use warden_daemon::moderation::{
    ChatId, ChatProvider, MemberStatus, MessageId, ModerationResult, Restriction, UserId,
};
use warden_daemon::{MemoryStore, Task, TaskType, Warden, WardenConfig};

/// Prints every call instead of talking to a chat platform
struct ConsoleChat {
    chats: Vec<ChatId>,
    members: HashSet<(ChatId, UserId)>,
    next_message: AtomicI64,
}

#[async_trait]
impl ChatProvider for ConsoleChat {
    async fn restrict_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        restriction: Restriction,
    ) -> ModerationResult<()> {
        println!("  [{chat_id}] restrict {user_id}: {restriction:?}");
        Ok(())
    }

    async fn ban_member(
        &self,
        chat_id: ChatId,
        user_id: UserId,
        revoke_messages: bool,
    ) -> ModerationResult<()> {
        println!("  [{chat_id}] ban {user_id} (revoke messages: {revoke_messages})");
        Ok(())
    }

    async fn unban_member(&self, chat_id: ChatId, user_id: UserId) -> ModerationResult<()> {
        println!("  [{chat_id}] unban {user_id}");
        Ok(())
    }

    async fn get_member_status(
        &self,
        chat_id: ChatId,
        user_id: UserId,
    ) -> ModerationResult<MemberStatus> {
        if self.members.contains(&(chat_id, user_id)) {
            Ok(MemberStatus::Member)
        } else {
            Ok(MemberStatus::Left)
        }
    }

    async fn list_administered_chats(&self) -> ModerationResult<Vec<ChatId>> {
        Ok(self.chats.clone())
    }

    async fn probe_membership(&self, chat_id: ChatId, user_id: UserId) -> ModerationResult<bool> {
        Ok(self.members.contains(&(chat_id, user_id)))
    }

    async fn send_message(&self, chat_id: ChatId, text: &str) -> ModerationResult<MessageId> {
        println!("  [{chat_id}] say: {text}");
        Ok(self.next_message.fetch_add(1, Ordering::SeqCst))
    }

    async fn send_audio(
        &self,
        chat_id: ChatId,
        path: &Path,
        caption: &str,
    ) -> ModerationResult<MessageId> {
        println!("  [{chat_id}] play {}: {caption}", path.display());
        Ok(self.next_message.fetch_add(1, Ordering::SeqCst))
    }

    async fn pin_message(&self, chat_id: ChatId, message_id: MessageId) -> ModerationResult<()> {
        println!("  [{chat_id}] pin {message_id}");
        Ok(())
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ModerationResult<()> {
        println!("  [{chat_id}] delete {message_id}");
        Ok(())
    }

    async fn resolve_username(&self, username: &str) -> ModerationResult<Option<UserId>> {
        Ok((username.trim_start_matches('@') == "spammer").then_some(42))
    }

    async fn chat_title(&self, chat_id: ChatId) -> ModerationResult<Option<String>> {
        Ok(Some(format!("Chat {}", chat_id.unsigned_abs())))
    }

    async fn list_participants(&self, _chat_id: ChatId) -> ModerationResult<Vec<String>> {
        Ok(vec!["@alice".into(), "@bob".into()])
    }
}

#[tokio::main]
async fn main() -> Result<(), warden_daemon::Error> {
    warden_daemon::logging::init()?;
    log_console("Moderation queue pipeline demo".to_string());

    let mut config = WardenConfig::from_env();
    config.worker.pop_timeout = Duration::from_millis(200);
    config.worker.idle_sleep = Duration::from_millis(100);
    config.propagation.notify_delay = Duration::from_millis(100);
    config.propagation.info_probe_delay = Duration::from_millis(50);

    let origin: ChatId = -1001;
    let chat = Arc::new(ConsoleChat {
        chats: vec![origin, -1002, -1003],
        members: [(origin, 42), (-1002, 42)].into_iter().collect(),
        next_message: AtomicI64::new(1),
    });
    let store = Arc::new(MemoryStore::load(&config.data_dir).await);

    let warden = Warden::from_config(chat, store.clone(), config.clone())?;

    // Messages are filtered inline, outside the queue
    let mut words = ForbiddenWords::load(&config.forbidden_words).await;
    if words.is_empty() {
        words = ForbiddenWords::new(["casino"]);
    }
    let message = ChatMessage {
        chat_id: origin,
        message_id: 900,
        user_id: 43,
        username: Some("gambler".into()),
        text: Some("Best CASINO bonus here".into()),
    };
    if let Some(hit) = filter_message(warden.context(), &words, &message).await {
        println!("Filtered message for word {:?}", hit.word);
    }

    // Three warnings escalate to a kick in the origin chat
    for _ in 0..3 {
        let warn = Task::new(TaskType::Warn, origin, 7)
            .with_user(42)
            .with_username("spammer")
            .with_reason("spam links");
        println!("Queued warn at position {}", warden.submit(&warn).await?);
    }

    let ban = Task::new(TaskType::Ban, origin, 7)
        .with_user(42)
        .with_username("spammer")
        .with_reason("came back");
    println!("Queued ban at position {}", warden.submit(&ban).await?);

    let info = Task::new(TaskType::Info, origin, 7).with_username("@spammer");
    println!("Queued info at position {}", warden.submit(&info).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = warden.worker().spawn(shutdown_rx);

    let drained = async {
        while warden.pending().await? > 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<(), warden_daemon::Error>(())
    };
    tokio::select! {
        result = drained => result?,
        _ = tokio::signal::ctrl_c() => log_console("Interrupted, shutting down".to_string()),
    }
    shutdown_tx.send(true)?;
    handle.await?;

    store.save(&config.data_dir).await?;
    log_console(format!("Saved store snapshot to {}", config.data_dir.display()));

    println!("\nPunishment log:");
    for entry in store.punishments().await {
        println!(
            "  {} user={} chat={} reason={}",
            entry.kind, entry.user_id, entry.chat_id, entry.reason
        );
    }

    Ok(())
}
