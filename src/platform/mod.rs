//! The chat-platform boundary.
//!
//! Everything the core needs from Discord goes through [`ChatPlatform`]:
//! paging counting-channel history, reading the bot's recent posts in the log
//! channel, and sending or editing report messages. Each call is one atomic
//! request/response step.

pub mod discord;
#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, MessageId, Timestamp};
use thiserror::Error;

pub use discord::DiscordPlatform;

/// Discord caps message list requests at 100.
pub const MAX_PAGE_SIZE: u8 = 100;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("channel {0} could not be resolved")]
    ChannelUnresolvable(ChannelId),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("message {0} no longer exists")]
    MessageNotFound(MessageId),

    #[error("platform request failed: {0}")]
    Request(String),
}

/// One message from counting-channel history.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryMessage {
    pub id: MessageId,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Any message in a channel, as seen when clearing it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: MessageId,
    /// Posted by this bot.
    pub own: bool,
}

/// Second-resolution UTC time of a Discord message. Timestamps outside
/// chrono's range map to the Unix epoch.
pub fn message_time(timestamp: &Timestamp) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_default()
}

/// A message the bot itself posted in the log channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PostedMessage {
    pub id: MessageId,
    pub content: String,
}

#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Up to `limit` messages strictly after `after` (or from the start of the
    /// channel when `None`), oldest first.
    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, PlatformError>;

    /// The bot's own messages among the newest `limit` in `channel`, newest first.
    async fn recent_own_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<PostedMessage>, PlatformError>;

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageId, PlatformError>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<(), PlatformError>;

    /// Up to `limit` messages strictly before `before` (or the newest when
    /// `None`), newest first.
    async fn page_before(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>, PlatformError>;

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError>;
}
