use super::{message_time, ChannelMessage, ChatPlatform, HistoryMessage, PlatformError, PostedMessage};
use async_trait::async_trait;
use serenity::all::{ChannelId, CreateMessage, EditMessage, GetMessages, Message, MessageId, UserId};
use serenity::http::Http;
use std::sync::Arc;
use tracing::debug;

/// [`ChatPlatform`] over serenity's HTTP client.
pub struct DiscordPlatform {
    http: Arc<Http>,
    bot_id: UserId,
}

impl DiscordPlatform {
    pub fn new(http: Arc<Http>, bot_id: UserId) -> Self {
        Self { http, bot_id }
    }
}

/// Map a serenity failure onto the core's taxonomy. A 404 means different
/// things per call, so the caller supplies it.
fn classify(err: serenity::Error, not_found: PlatformError) -> PlatformError {
    if let serenity::Error::Http(http_err) = &err {
        match http_err.status_code().map(|s| s.as_u16()) {
            Some(403) => return PlatformError::Forbidden(err.to_string()),
            Some(404) => return not_found,
            _ => {}
        }
    }
    PlatformError::Request(err.to_string())
}

fn to_history(message: Message) -> HistoryMessage {
    HistoryMessage {
        id: message.id,
        author_is_bot: message.author.bot,
        timestamp: message_time(&message.timestamp),
        content: message.content,
    }
}

#[async_trait]
impl ChatPlatform for DiscordPlatform {
    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        // Snowflakes are non-zero, so "after 1" starts at the channel's first message.
        let cursor = after.unwrap_or(MessageId::new(1));
        let mut page = channel
            .messages(&self.http, GetMessages::new().after(cursor).limit(limit))
            .await
            .map_err(|e| classify(e, PlatformError::ChannelUnresolvable(channel)))?;
        page.sort_by_key(|m| m.id);

        debug!(
            "Fetched {} history messages from channel {} after {}",
            page.len(),
            channel,
            cursor
        );
        Ok(page.into_iter().map(to_history).collect())
    }

    async fn recent_own_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<PostedMessage>, PlatformError> {
        let page = channel
            .messages(&self.http, GetMessages::new().limit(limit))
            .await
            .map_err(|e| classify(e, PlatformError::ChannelUnresolvable(channel)))?;

        Ok(page
            .into_iter()
            .filter(|m| m.author.id == self.bot_id)
            .map(|m| PostedMessage {
                id: m.id,
                content: m.content,
            })
            .collect())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageId, PlatformError> {
        let message = channel
            .send_message(&self.http, CreateMessage::new().content(content))
            .await
            .map_err(|e| classify(e, PlatformError::ChannelUnresolvable(channel)))?;
        Ok(message.id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<(), PlatformError> {
        channel
            .edit_message(&self.http, message, EditMessage::new().content(content))
            .await
            .map_err(|e| classify(e, PlatformError::MessageNotFound(message)))?;
        Ok(())
    }

    async fn page_before(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>, PlatformError> {
        let mut request = GetMessages::new().limit(limit);
        if let Some(before) = before {
            request = request.before(before);
        }
        let mut page = channel
            .messages(&self.http, request)
            .await
            .map_err(|e| classify(e, PlatformError::ChannelUnresolvable(channel)))?;
        page.sort_by_key(|m| std::cmp::Reverse(m.id));

        Ok(page
            .into_iter()
            .map(|m| ChannelMessage {
                id: m.id,
                own: m.author.id == self.bot_id,
            })
            .collect())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        channel
            .delete_message(&self.http, message)
            .await
            .map_err(|e| classify(e, PlatformError::MessageNotFound(message)))
    }
}
