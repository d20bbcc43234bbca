//! Clearing report posts out of a log channel.

use crate::platform::{ChatPlatform, PlatformError};
use serenity::all::{ChannelId, MessageId};
use tracing::{debug, warn};

/// The most a single purge may be asked to delete.
pub const MAX_PURGE: usize = 500;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PurgeSummary {
    pub scanned: usize,
    pub deleted: usize,
    pub failed: usize,
}

/// Walk `channel` from newest to oldest deleting the bot's own posts, or
/// every post when `include_users` is set, stopping after `limit` deletions.
pub async fn purge_channel(
    platform: &dyn ChatPlatform,
    channel: ChannelId,
    limit: Option<usize>,
    include_users: bool,
    page_size: u8,
) -> Result<PurgeSummary, PlatformError> {
    let page_size = page_size.max(1);
    let mut summary = PurgeSummary::default();
    let mut before: Option<MessageId> = None;

    'pages: loop {
        let page = platform.page_before(channel, before, page_size).await?;
        let Some(oldest) = page.last().map(|m| m.id) else {
            break;
        };

        for message in &page {
            if limit.is_some_and(|limit| summary.deleted >= limit) {
                break 'pages;
            }
            summary.scanned += 1;
            if !message.own && !include_users {
                continue;
            }

            match platform.delete_message(channel, message.id).await {
                Ok(()) => summary.deleted += 1,
                Err(PlatformError::MessageNotFound(_)) => {}
                Err(e @ PlatformError::ChannelUnresolvable(_)) => return Err(e),
                Err(e) => {
                    warn!("Purge: could not delete message {}: {}", message.id, e);
                    summary.failed += 1;
                }
            }
        }

        if page.len() < page_size as usize || before.is_some_and(|b| oldest >= b) {
            break;
        }
        before = Some(oldest);
    }

    debug!(
        "Purge: channel {} scanned {}, deleted {}, failed {}",
        channel, summary.scanned, summary.deleted, summary.failed
    );
    Ok(summary)
}
