//! Turns one inbound chat message into (at most) one ledger update.
//!
//! Live ingestion and history rebuild deliberately accept numbers differently:
//!
//! - live messages only need to *parse* as an integer, so surrounding
//!   whitespace and a leading `+` are fine (`" +12 "` records 12);
//! - rebuild requires the content to be nothing but ASCII digits (`"12"` only).
//!
//! A message such as `"+12"` therefore counts when it arrives live but is
//! skipped by the next relog. Both rules are kept as they are until the
//! intended behaviour is settled. Negative integers parse on the live path
//! but are not valid watermarks and are ignored.

use crate::platform::message_time;
use crate::store::{local_date, GuildConfig, GuildConfigStore, LedgerStore, StoreError};
use chrono::{DateTime, NaiveDate, Utc};
use serenity::all::{ChannelId, GuildId, Message};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    pub guild_id: Option<GuildId>,
    pub channel_id: ChannelId,
    pub author_is_bot: bool,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    pub fn from_message(message: &Message) -> Self {
        Self {
            guild_id: message.guild_id,
            channel_id: message.channel_id,
            author_is_bot: message.author.bot,
            content: message.content.clone(),
            timestamp: message_time(&message.timestamp),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    BotAuthor,
    NoGuild,
    NotConfigured,
    OtherChannel,
    NotAnInteger,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Recorded {
        guild_id: GuildId,
        date: NaiveDate,
        value: u64,
        /// Whether the day's watermark moved.
        raised: bool,
    },
    Ignored(IgnoreReason),
}

/// Live-path number check: anything `i64::from_str` accepts after trimming.
pub fn parse_live_count(content: &str) -> Result<u64, IgnoreReason> {
    let value: i64 = content
        .trim()
        .parse()
        .map_err(|_| IgnoreReason::NotAnInteger)?;
    u64::try_from(value).map_err(|_| IgnoreReason::Negative)
}

/// Rebuild-path number check: non-empty and ASCII digits only.
pub fn parse_rebuild_count(content: &str) -> Option<u64> {
    if content.is_empty() || !content.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    content.parse().ok()
}

/// Decide whether `event` qualifies, without touching the ledger.
pub fn qualify(
    event: &MessageEvent,
    config: Option<GuildConfig>,
) -> Result<(GuildId, NaiveDate, u64), IgnoreReason> {
    if event.author_is_bot {
        return Err(IgnoreReason::BotAuthor);
    }
    let guild_id = event.guild_id.ok_or(IgnoreReason::NoGuild)?;
    let config = config.ok_or(IgnoreReason::NotConfigured)?;
    if event.channel_id != config.counting_channel_id {
        return Err(IgnoreReason::OtherChannel);
    }
    let value = parse_live_count(&event.content)?;
    Ok((guild_id, local_date(event.timestamp), value))
}

/// Apply one live message to the ledger.
pub fn ingest(
    ledger: &mut LedgerStore,
    guilds: &GuildConfigStore,
    event: &MessageEvent,
) -> Result<IngestOutcome, StoreError> {
    let config = event.guild_id.and_then(|guild_id| guilds.get(guild_id));
    let (guild_id, date, value) = match qualify(event, config) {
        Ok(accepted) => accepted,
        Err(reason) => return Ok(IngestOutcome::Ignored(reason)),
    };

    let raised = ledger.upsert_max(guild_id, date, value)?;
    debug!(
        "Ingest: guild {} day {} value {} (raised: {})",
        guild_id, date, value, raised
    );

    Ok(IngestOutcome::Recorded {
        guild_id,
        date,
        value,
        raised,
    })
}
