//! Maps rendered chunks onto already-posted report messages.
//!
//! For each chunk, in order:
//! 1. the message recorded for `(year, part)` in the log index is edited;
//! 2. otherwise the bot's newest `window_size` posts in the log channel are
//!    searched for the chunk's header tag, and a match is edited and indexed;
//! 3. otherwise a new message is sent and indexed.
//!
//! Re-running with an unchanged ledger sends nothing new. Step 2 only sees a
//! bounded window, so a chunk that is neither indexed nor among the newest
//! `window_size` posts gets posted again. An index entry whose message was
//! deleted is dropped and the chunk falls through to steps 2 and 3.
//!
//! When the recent posts cannot be read, steps 2 and 3 are skipped and the
//! unindexed chunks count as failed until a later pass can see the channel.

use crate::platform::{ChatPlatform, PlatformError, PostedMessage};
use crate::report::ReportChunk;
use serenity::all::{ChannelId, MessageId};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub edited: usize,
    pub appended: usize,
    pub failed: usize,
}

impl ReconcileSummary {
    pub fn absorb(&mut self, other: ReconcileSummary) {
        self.edited += other.edited;
        self.appended += other.appended;
        self.failed += other.failed;
    }
}

enum Attempt {
    Done,
    Gone,
    Failed,
}

enum Window {
    Unread,
    Unavailable,
    Read(Vec<PostedMessage>),
}

pub struct Reconciler<'a> {
    platform: &'a dyn ChatPlatform,
    channel: ChannelId,
    window_size: u8,
}

impl<'a> Reconciler<'a> {
    pub fn new(platform: &'a dyn ChatPlatform, channel: ChannelId, window_size: u8) -> Self {
        Self {
            platform,
            channel,
            window_size: window_size.max(1),
        }
    }

    /// Reconcile one year's chunks. `known` maps part → message for that year
    /// and is updated to reflect where every chunk now lives; parts that were
    /// not rendered this time are dropped from it.
    ///
    /// Only an unresolvable log channel is an error. Other failed reads, sends
    /// and edits are logged and counted as failed.
    pub async fn reconcile(
        &self,
        chunks: &[ReportChunk],
        known: &mut BTreeMap<u32, MessageId>,
    ) -> Result<ReconcileSummary, PlatformError> {
        let mut summary = ReconcileSummary::default();
        let mut window = Window::Unread;
        let mut claimed: HashSet<MessageId> = known.values().copied().collect();

        for chunk in chunks {
            if let Some(&id) = known.get(&chunk.part) {
                match self.edit(id, chunk).await? {
                    Attempt::Done => {
                        summary.edited += 1;
                        continue;
                    }
                    Attempt::Failed => {
                        summary.failed += 1;
                        continue;
                    }
                    Attempt::Gone => {
                        debug!(
                            "Reconcile: indexed message {} for {} is gone",
                            id, chunk.header_tag
                        );
                        known.remove(&chunk.part);
                    }
                }
            }

            if matches!(window, Window::Unread) {
                window = self.fetch_window().await?;
            }
            let Window::Read(posts) = &window else {
                summary.failed += 1;
                continue;
            };
            let found = posts
                .iter()
                .find(|m| !claimed.contains(&m.id) && m.content.contains(&chunk.header_tag))
                .map(|m| m.id);

            if let Some(id) = found {
                match self.edit(id, chunk).await? {
                    Attempt::Done => {
                        debug!("Reconcile: adopted message {} for {}", id, chunk.header_tag);
                        known.insert(chunk.part, id);
                        claimed.insert(id);
                        summary.edited += 1;
                        continue;
                    }
                    Attempt::Failed => {
                        summary.failed += 1;
                        continue;
                    }
                    Attempt::Gone => {}
                }
            }

            match self.platform.send_message(self.channel, &chunk.body).await {
                Ok(id) => {
                    debug!("Reconcile: posted message {} for {}", id, chunk.header_tag);
                    known.insert(chunk.part, id);
                    claimed.insert(id);
                    summary.appended += 1;
                }
                Err(e @ PlatformError::ChannelUnresolvable(_)) => return Err(e),
                Err(e) => {
                    warn!(
                        "Reconcile: could not post {} in channel {}: {}",
                        chunk.header_tag, self.channel, e
                    );
                    summary.failed += 1;
                }
            }
        }

        known.retain(|part, _| chunks.iter().any(|c| c.part == *part));
        Ok(summary)
    }

    async fn edit(&self, id: MessageId, chunk: &ReportChunk) -> Result<Attempt, PlatformError> {
        match self
            .platform
            .edit_message(self.channel, id, &chunk.body)
            .await
        {
            Ok(()) => Ok(Attempt::Done),
            Err(PlatformError::MessageNotFound(_)) => Ok(Attempt::Gone),
            Err(e @ PlatformError::ChannelUnresolvable(_)) => Err(e),
            Err(e) => {
                warn!(
                    "Reconcile: could not edit message {} for {}: {}",
                    id, chunk.header_tag, e
                );
                Ok(Attempt::Failed)
            }
        }
    }

    async fn fetch_window(&self) -> Result<Window, PlatformError> {
        match self
            .platform
            .recent_own_messages(self.channel, self.window_size)
            .await
        {
            Ok(posts) => Ok(Window::Read(posts)),
            Err(e @ PlatformError::ChannelUnresolvable(_)) => Err(e),
            Err(e) => {
                warn!(
                    "Reconcile: could not read recent posts in channel {}, not posting: {}",
                    self.channel, e
                );
                Ok(Window::Unavailable)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryPlatform;
    use crate::report::render;
    use chrono::{Duration, NaiveDate};

    const LOG: u64 = 20;

    fn chunks(days: usize) -> Vec<ReportChunk> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let counts = (0..days)
            .map(|i| (start + Duration::days(i as i64), i as u64 + 1))
            .collect();
        render(2025, &counts)
    }

    fn platform() -> MemoryPlatform {
        let platform = MemoryPlatform::new();
        platform.add_channel(ChannelId::new(LOG));
        platform
    }

    #[tokio::test]
    async fn test_second_pass_only_edits() {
        let platform = platform();
        let reconciler = Reconciler::new(&platform, ChannelId::new(LOG), 100);
        let rendered = chunks(120);
        let mut known = BTreeMap::new();

        let first = reconciler.reconcile(&rendered, &mut known).await.unwrap();
        assert_eq!(first.appended, 3);
        assert_eq!(known.len(), 3);

        let second = reconciler.reconcile(&rendered, &mut known).await.unwrap();
        assert_eq!(
            second,
            ReconcileSummary {
                edited: 3,
                appended: 0,
                failed: 0
            }
        );
        assert_eq!(platform.sends(), 3);
        assert_eq!(platform.edits(), 3);
    }

    #[tokio::test]
    async fn test_header_search_adopts_prior_posts() {
        let platform = platform();
        let log = ChannelId::new(LOG);
        let rendered = chunks(60);
        for chunk in &rendered {
            platform.push_own_message(log, &format!("stale {}", chunk.header_tag));
        }
        let reconciler = Reconciler::new(&platform, log, 100);

        for _ in 0..2 {
            // no index at all: the window alone must resolve every chunk
            let mut known = BTreeMap::new();
            let summary = reconciler.reconcile(&rendered, &mut known).await.unwrap();
            assert_eq!(summary.appended, 0);
            assert_eq!(summary.edited, 2);
        }
        assert_eq!(platform.sends(), 0);

        let posts = platform.own_messages(log);
        assert_eq!(posts[0].content, rendered[0].body);
        assert_eq!(posts[1].content, rendered[1].body);
    }

    #[tokio::test]
    async fn test_deleted_indexed_message_is_reposted() {
        let platform = platform();
        let log = ChannelId::new(LOG);
        let reconciler = Reconciler::new(&platform, log, 100);
        let rendered = chunks(10);
        let mut known = BTreeMap::new();

        reconciler.reconcile(&rendered, &mut known).await.unwrap();
        let old = known[&1];
        platform.remove_message(log, old);

        let summary = reconciler.reconcile(&rendered, &mut known).await.unwrap();
        assert_eq!(summary.appended, 1);
        assert_ne!(known[&1], old);
    }

    #[tokio::test]
    async fn test_window_limit_duplicates_unseen_chunks() {
        let platform = platform();
        let log = ChannelId::new(LOG);
        let rendered = chunks(60);
        platform.push_own_message(log, &rendered[0].body);
        platform.push_own_message(log, &rendered[1].body);

        // only the newest post (part 2) is visible
        let reconciler = Reconciler::new(&platform, log, 1);
        let mut known = BTreeMap::new();
        let summary = reconciler.reconcile(&rendered, &mut known).await.unwrap();
        assert_eq!(summary.edited, 1);
        assert_eq!(summary.appended, 1);
        assert_eq!(platform.own_messages(log).len(), 3);
    }

    #[tokio::test]
    async fn test_forbidden_channel_is_counted_not_fatal() {
        let platform = platform();
        let log = ChannelId::new(LOG);
        platform.forbid(log);
        let reconciler = Reconciler::new(&platform, log, 100);
        let mut known = BTreeMap::new();

        let summary = reconciler.reconcile(&chunks(60), &mut known).await.unwrap();
        assert_eq!(summary.failed, 2);
        assert!(known.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_window_never_appends() {
        let platform = platform();
        let log = ChannelId::new(LOG);
        let rendered = chunks(60);
        for chunk in &rendered {
            platform.push_own_message(log, &format!("old {}", chunk.header_tag));
        }
        platform.fail_recent_reads(log);
        let reconciler = Reconciler::new(&platform, log, 100);

        let mut known = BTreeMap::new();
        let summary = reconciler.reconcile(&rendered, &mut known).await.unwrap();
        assert_eq!(
            summary,
            ReconcileSummary {
                edited: 0,
                appended: 0,
                failed: 2
            }
        );
        assert_eq!(platform.sends(), 0);
        assert!(known.is_empty());

        // indexed chunks do not need the window
        let posts = platform.own_messages(log);
        let mut indexed = BTreeMap::from([(1, posts[0].id), (2, posts[1].id)]);
        let summary = reconciler.reconcile(&rendered, &mut indexed).await.unwrap();
        assert_eq!(summary.edited, 2);
        assert_eq!(summary.failed, 0);
    }

    #[tokio::test]
    async fn test_unresolvable_channel_aborts() {
        let platform = MemoryPlatform::new();
        let reconciler = Reconciler::new(&platform, ChannelId::new(404), 100);
        let mut known = BTreeMap::new();

        let result = reconciler.reconcile(&chunks(3), &mut known).await;
        assert!(matches!(result, Err(PlatformError::ChannelUnresolvable(_))));
    }

    #[tokio::test]
    async fn test_parts_no_longer_rendered_are_pruned() {
        let platform = platform();
        let log = ChannelId::new(LOG);
        let reconciler = Reconciler::new(&platform, log, 100);
        let mut known = BTreeMap::new();

        reconciler.reconcile(&chunks(120), &mut known).await.unwrap();
        assert_eq!(known.len(), 3);
        reconciler.reconcile(&chunks(40), &mut known).await.unwrap();
        assert_eq!(known.keys().copied().collect::<Vec<_>>(), vec![1]);
    }
}
