//! In-process [`ChatPlatform`] used by tests.

use super::{ChannelMessage, ChatPlatform, HistoryMessage, PlatformError, PostedMessage};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::all::{ChannelId, MessageId};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Clone)]
struct StoredMessage {
    id: MessageId,
    own: bool,
    author_is_bot: bool,
    content: String,
    timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    channels: HashMap<ChannelId, Vec<StoredMessage>>,
    forbidden: HashSet<ChannelId>,
    unreadable: HashSet<ChannelId>,
    next_id: u64,
    sends: usize,
    edits: usize,
    deletes: usize,
    history_requests: usize,
}

impl Inner {
    fn allocate(&mut self) -> MessageId {
        self.next_id += 1;
        MessageId::new(1000 + self.next_id)
    }

    fn channel(&mut self, channel: ChannelId) -> Result<&mut Vec<StoredMessage>, PlatformError> {
        self.channels
            .get_mut(&channel)
            .ok_or(PlatformError::ChannelUnresolvable(channel))
    }
}

#[derive(Default)]
pub struct MemoryPlatform {
    inner: Mutex<Inner>,
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_channel(&self, channel: ChannelId) {
        self.inner
            .lock()
            .unwrap()
            .channels
            .entry(channel)
            .or_default();
    }

    pub fn forbid(&self, channel: ChannelId) {
        self.inner.lock().unwrap().forbidden.insert(channel);
    }

    /// Make reads of the bot's recent posts in `channel` fail.
    pub fn fail_recent_reads(&self, channel: ChannelId) {
        self.inner.lock().unwrap().unreadable.insert(channel);
    }

    fn push(
        &self,
        channel: ChannelId,
        content: &str,
        timestamp: DateTime<Utc>,
        own: bool,
        author_is_bot: bool,
    ) -> MessageId {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.allocate();
        inner.channels.entry(channel).or_default().push(StoredMessage {
            id,
            own,
            author_is_bot,
            content: content.to_string(),
            timestamp,
        });
        id
    }

    pub fn push_user_message(
        &self,
        channel: ChannelId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> MessageId {
        self.push(channel, content, timestamp, false, false)
    }

    pub fn push_bot_message(
        &self,
        channel: ChannelId,
        content: &str,
        timestamp: DateTime<Utc>,
    ) -> MessageId {
        self.push(channel, content, timestamp, false, true)
    }

    /// A message this bot posted earlier.
    pub fn push_own_message(&self, channel: ChannelId, content: &str) -> MessageId {
        self.push(channel, content, Utc::now(), true, true)
    }

    /// Remove a message as if someone else had deleted it.
    pub fn remove_message(&self, channel: ChannelId, id: MessageId) {
        if let Some(messages) = self.inner.lock().unwrap().channels.get_mut(&channel) {
            messages.retain(|m| m.id != id);
        }
    }

    /// The bot's posts in `channel`, oldest first.
    pub fn own_messages(&self, channel: ChannelId) -> Vec<PostedMessage> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .get(&channel)
            .map(|messages| {
                messages
                    .iter()
                    .filter(|m| m.own)
                    .map(|m| PostedMessage {
                        id: m.id,
                        content: m.content.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn sends(&self) -> usize {
        self.inner.lock().unwrap().sends
    }

    pub fn edits(&self) -> usize {
        self.inner.lock().unwrap().edits
    }

    pub fn deletes(&self) -> usize {
        self.inner.lock().unwrap().deletes
    }

    /// Ids of every message left in `channel`, oldest first.
    pub fn message_ids(&self, channel: ChannelId) -> Vec<MessageId> {
        self.inner
            .lock()
            .unwrap()
            .channels
            .get(&channel)
            .map(|messages| messages.iter().map(|m| m.id).collect())
            .unwrap_or_default()
    }

    pub fn history_requests(&self) -> usize {
        self.inner.lock().unwrap().history_requests
    }
}

#[async_trait]
impl ChatPlatform for MemoryPlatform {
    async fn history_page(
        &self,
        channel: ChannelId,
        after: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<HistoryMessage>, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        inner.history_requests += 1;
        let messages = inner.channel(channel)?;
        Ok(messages
            .iter()
            .filter(|m| after.map_or(true, |after| m.id > after))
            .take(limit as usize)
            .map(|m| HistoryMessage {
                id: m.id,
                author_is_bot: m.author_is_bot,
                content: m.content.clone(),
                timestamp: m.timestamp,
            })
            .collect())
    }

    async fn recent_own_messages(
        &self,
        channel: ChannelId,
        limit: u8,
    ) -> Result<Vec<PostedMessage>, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.unreadable.contains(&channel) {
            return Err(PlatformError::Request(format!("cannot read {channel}")));
        }
        let messages = inner.channel(channel)?;
        Ok(messages
            .iter()
            .rev()
            .take(limit as usize)
            .filter(|m| m.own)
            .map(|m| PostedMessage {
                id: m.id,
                content: m.content.clone(),
            })
            .collect())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        content: &str,
    ) -> Result<MessageId, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.forbidden.contains(&channel) {
            return Err(PlatformError::Forbidden(format!("cannot send in {channel}")));
        }
        inner.channel(channel)?;
        inner.sends += 1;
        let id = inner.allocate();
        inner.channel(channel)?.push(StoredMessage {
            id,
            own: true,
            author_is_bot: true,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        content: &str,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.forbidden.contains(&channel) {
            return Err(PlatformError::Forbidden(format!("cannot edit in {channel}")));
        }
        let stored = inner
            .channel(channel)?
            .iter_mut()
            .find(|m| m.id == message && m.own)
            .ok_or(PlatformError::MessageNotFound(message))?;
        stored.content = content.to_string();
        inner.edits += 1;
        Ok(())
    }

    async fn page_before(
        &self,
        channel: ChannelId,
        before: Option<MessageId>,
        limit: u8,
    ) -> Result<Vec<ChannelMessage>, PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        let messages = inner.channel(channel)?;
        Ok(messages
            .iter()
            .rev()
            .filter(|m| before.map_or(true, |before| m.id < before))
            .take(limit as usize)
            .map(|m| ChannelMessage {
                id: m.id,
                own: m.own,
            })
            .collect())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.forbidden.contains(&channel) {
            return Err(PlatformError::Forbidden(format!("cannot delete in {channel}")));
        }
        let messages = inner.channel(channel)?;
        let before = messages.len();
        messages.retain(|m| m.id != message);
        if messages.len() == before {
            return Err(PlatformError::MessageNotFound(message));
        }
        inner.deletes += 1;
        Ok(())
    }
}
