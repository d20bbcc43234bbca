//! Recomputes one guild's ledger slice from counting-channel history.
//!
//! History is folded into a staged slice and then installed with a single
//! clear-and-replace, so the result depends only on the filtered history and
//! a failed page fetch leaves the previous slice untouched.

use crate::ingest::parse_rebuild_count;
use crate::platform::{ChatPlatform, HistoryMessage, PlatformError};
use crate::store::{local_date, LedgerStore, StoreError};
use chrono::NaiveDate;
use serenity::all::{ChannelId, GuildId, MessageId};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebuildSummary {
    pub guild_id: GuildId,
    pub scanned: usize,
    pub accepted: usize,
    pub days: usize,
}

/// A rebuild in progress: messages fed oldest to newest.
pub struct Rebuild {
    guild_id: GuildId,
    days: BTreeMap<NaiveDate, u64>,
    scanned: usize,
    accepted: usize,
}

impl Rebuild {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            days: BTreeMap::new(),
            scanned: 0,
            accepted: 0,
        }
    }

    /// Fold one historical message in. Returns whether it counted.
    pub fn feed(&mut self, message: &HistoryMessage) -> bool {
        self.scanned += 1;
        if message.author_is_bot {
            return false;
        }
        let Some(value) = parse_rebuild_count(&message.content) else {
            return false;
        };

        let slot = self.days.entry(local_date(message.timestamp)).or_insert(value);
        *slot = (*slot).max(value);
        self.accepted += 1;
        true
    }

    /// Clear the guild's slice and install the folded one.
    pub fn commit(self, ledger: &mut LedgerStore) -> Result<RebuildSummary, StoreError> {
        let summary = RebuildSummary {
            guild_id: self.guild_id,
            scanned: self.scanned,
            accepted: self.accepted,
            days: self.days.len(),
        };
        ledger.replace_guild(self.guild_id, self.days)?;
        Ok(summary)
    }
}

/// Rebuild `guild_id` from an already materialized history.
pub fn rebuild_guild<'a>(
    ledger: &mut LedgerStore,
    guild_id: GuildId,
    history: impl IntoIterator<Item = &'a HistoryMessage>,
) -> Result<RebuildSummary, StoreError> {
    let mut rebuild = Rebuild::new(guild_id);
    for message in history {
        rebuild.feed(message);
    }
    rebuild.commit(ledger)
}

/// Page through the whole of `channel`, oldest first, folding every message.
/// The result still has to be committed.
pub async fn fold_channel_history(
    platform: &dyn ChatPlatform,
    guild_id: GuildId,
    channel: ChannelId,
    page_size: u8,
) -> Result<Rebuild, PlatformError> {
    let page_size = page_size.max(1);
    let mut rebuild = Rebuild::new(guild_id);
    let mut after: Option<MessageId> = None;

    loop {
        let page = platform.history_page(channel, after, page_size).await?;
        let Some(last) = page.last().map(|m| m.id) else {
            break;
        };
        for message in &page {
            rebuild.feed(message);
        }

        // A cursor that does not advance would loop forever.
        if page.len() < page_size as usize || after.is_some_and(|a| last <= a) {
            break;
        }
        after = Some(last);
    }

    debug!(
        "Rebuild: guild {} scanned {} messages from channel {}",
        guild_id, rebuild.scanned, channel
    );
    Ok(rebuild)
}
