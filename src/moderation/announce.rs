//! Pinned announcements that mention every participant

use tracing::info;

use crate::moderation::handler::HandlerContext;
use crate::moderation::{ChatId, MessageId, ModerationError, ModerationResult, send_text, with_rate_limit};

/// Mentions per message
pub const MENTION_CHUNK: usize = 50;

/// What an announcement produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// The pinned message carrying the text and the first mentions
    pub message_id: MessageId,
    /// Messages sent in total, including the pinned one
    pub messages: usize,
    pub mentioned: usize,
}

/// Send `text` with mentions of every participant and pin it
///
/// The first message carries the text and up to [`MENTION_CHUNK`] mentions.
/// Remaining mentions follow in chunks spaced by the announce delay.
///
/// # Errors
///
/// Returns `NotFound` when the chat has no listable participants, or the
/// provider error of the first failed send or pin.
pub async fn announce(
    ctx: &HandlerContext,
    chat_id: ChatId,
    text: &str,
) -> ModerationResult<Announcement> {
    let provider = ctx.provider.as_ref();

    let participants = with_rate_limit(ctx.retry, "list_participants", move || {
        provider.list_participants(chat_id)
    })
    .await?;
    if participants.is_empty() {
        return Err(ModerationError::NotFound(format!(
            "no participants listed for chat {chat_id}"
        )));
    }

    let mut chunks = participants.chunks(MENTION_CHUNK);
    let first = chunks.next().map(|chunk| chunk.join(" ")).unwrap_or_default();
    let message_id = send_text(
        provider,
        ctx.retry,
        chat_id,
        &format!("Announcement:\n{text}\n\n{first}"),
    )
    .await?;

    with_rate_limit(ctx.retry, "pin_message", move || {
        provider.pin_message(chat_id, message_id)
    })
    .await?;

    let mut messages = 1;
    for chunk in chunks {
        tokio::time::sleep(ctx.propagation.announce_chunk_delay).await;
        send_text(provider, ctx.retry, chat_id, &chunk.join(" ")).await?;
        messages += 1;
    }

    info!(chat_id, messages, mentioned = participants.len(), "Announcement sent");

    Ok(Announcement {
        message_id,
        messages,
        mentioned: participants.len(),
    })
}
