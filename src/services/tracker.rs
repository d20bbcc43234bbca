use crate::ingest::{self, IngestOutcome, MessageEvent};
use crate::platform::{ChatPlatform, PlatformError};
use crate::purge::{purge_channel, PurgeSummary};
use crate::rebuild::{fold_channel_history, RebuildSummary};
use crate::reconcile::{ReconcileSummary, Reconciler};
use crate::report::render;
use crate::store::{local_date, GuildConfig, GuildConfigStore, LedgerStore, LogIndex, StoreError};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serenity::all::GuildId;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("guild {0} has no counting setup")]
    NotConfigured(GuildId),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelogSummary {
    pub rebuild: RebuildSummary,
    pub years: usize,
    pub reconcile: ReconcileSummary,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickSummary {
    pub guilds: usize,
    pub skipped: usize,
    pub reconcile: ReconcileSummary,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide counting state: the three stores plus one async lock per
/// guild. A guild's lock is held for each live ingest and for the whole of a
/// relog or report pass, so those never interleave for the same guild.
pub struct CountTracker {
    ledger: Mutex<LedgerStore>,
    guilds: RwLock<GuildConfigStore>,
    index: Mutex<LogIndex>,
    guild_locks: Mutex<HashMap<GuildId, Arc<tokio::sync::Mutex<()>>>>,
    window_size: u8,
    page_size: u8,
}

impl CountTracker {
    pub fn new(
        ledger: LedgerStore,
        guilds: GuildConfigStore,
        index: LogIndex,
        window_size: u8,
        page_size: u8,
    ) -> Self {
        Self {
            ledger: Mutex::new(ledger),
            guilds: RwLock::new(guilds),
            index: Mutex::new(index),
            guild_locks: Mutex::new(HashMap::new()),
            window_size,
            page_size,
        }
    }

    fn guild_lock(&self, guild_id: GuildId) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.guild_locks)
            .entry(guild_id)
            .or_default()
            .clone()
    }

    pub fn guild_config(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.guilds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(guild_id)
    }

    pub fn configured_guilds(&self) -> Vec<GuildId> {
        self.guilds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .guild_ids()
    }

    pub fn configured_count(&self) -> usize {
        self.guilds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn count_on(&self, guild_id: GuildId, date: NaiveDate) -> Option<u64> {
        lock(&self.ledger).get(guild_id, date)
    }

    /// Number of days currently on record for `guild_id`.
    pub fn tracked_days(&self, guild_id: GuildId) -> usize {
        lock(&self.ledger).guild_len(guild_id)
    }

    pub fn setup(&self, guild_id: GuildId, config: GuildConfig) -> Result<(), TrackerError> {
        self.guilds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(guild_id, config)?;
        info!(
            "Guild {} configured: counting {} → log {}",
            guild_id, config.counting_channel_id, config.log_channel_id
        );
        Ok(())
    }

    /// Forget everything about `guild_id`. Posted report messages stay where
    /// they are.
    pub async fn reset(&self, guild_id: GuildId) -> Result<Option<GuildConfig>, TrackerError> {
        let guard = self.guild_lock(guild_id);
        let _held = guard.lock().await;

        let removed = self
            .guilds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(guild_id)?;
        let days = lock(&self.ledger).clear_guild(guild_id)?;
        lock(&self.index).remove_guild(guild_id)?;

        lock(&self.guild_locks).remove(&guild_id);

        info!("Guild {} reset ({} days dropped)", guild_id, days);
        Ok(removed)
    }

    /// Feed one live message through the ingest filter.
    pub async fn ingest(&self, event: &MessageEvent) -> Result<IngestOutcome, TrackerError> {
        // Unconfigured guilds are ignored by the filter and need no lock.
        let guard = event
            .guild_id
            .filter(|guild_id| self.guild_config(*guild_id).is_some())
            .map(|guild_id| self.guild_lock(guild_id));
        let _held = match &guard {
            Some(guard) => Some(guard.lock().await),
            None => None,
        };

        let guilds = self.guilds.read().unwrap_or_else(PoisonError::into_inner);
        let mut ledger = lock(&self.ledger);
        Ok(ingest::ingest(&mut ledger, &guilds, event)?)
    }

    pub fn flush(&self) -> Result<(), TrackerError> {
        Ok(lock(&self.ledger).flush()?)
    }

    /// Rebuild `guild_id` from its counting channel, then render and
    /// reconcile every year on record.
    pub async fn relog(
        &self,
        platform: &dyn ChatPlatform,
        guild_id: GuildId,
    ) -> Result<RelogSummary, TrackerError> {
        let guard = self.guild_lock(guild_id);
        let _held = guard.lock().await;

        let config = self
            .guild_config(guild_id)
            .ok_or(TrackerError::NotConfigured(guild_id))?;

        let rebuild = fold_channel_history(
            platform,
            guild_id,
            config.counting_channel_id,
            self.page_size,
        )
        .await?;
        let (rebuild, years) = {
            let mut ledger = lock(&self.ledger);
            let summary = rebuild.commit(&mut ledger)?;
            (summary, ledger.years(guild_id))
        };

        let mut reconcile = ReconcileSummary::default();
        for &year in &years {
            reconcile.absorb(self.report_year_locked(platform, guild_id, config, year).await?);
        }

        info!(
            "Relog: guild {} rebuilt {} days across {} years ({} edited, {} posted, {} failed)",
            guild_id,
            rebuild.days,
            years.len(),
            reconcile.edited,
            reconcile.appended,
            reconcile.failed
        );

        Ok(RelogSummary {
            rebuild,
            years: years.len(),
            reconcile,
        })
    }

    /// Relog every configured guild in turn. A guild that fails is logged and
    /// skipped. Returns how many succeeded.
    pub async fn relog_all(&self, platform: &dyn ChatPlatform) -> usize {
        let mut done = 0;
        for guild_id in self.configured_guilds() {
            match self.relog(platform, guild_id).await {
                Ok(_) => done += 1,
                Err(e) => warn!("Relog: skipping guild {}: {}", guild_id, e),
            }
        }
        done
    }

    /// Render and reconcile a single year for `guild_id`.
    pub async fn report_year(
        &self,
        platform: &dyn ChatPlatform,
        guild_id: GuildId,
        year: i32,
    ) -> Result<ReconcileSummary, TrackerError> {
        let guard = self.guild_lock(guild_id);
        let _held = guard.lock().await;

        let config = self
            .guild_config(guild_id)
            .ok_or(TrackerError::NotConfigured(guild_id))?;
        self.report_year_locked(platform, guild_id, config, year).await
    }

    /// One periodic pass at the current time.
    pub async fn report_tick(&self, platform: &dyn ChatPlatform) -> TickSummary {
        self.report_tick_at(platform, Utc::now()).await
    }

    /// Flush the ledger, then for each configured guild reconcile the current
    /// local year and every year ingestion touched since the previous pass.
    pub async fn report_tick_at(
        &self,
        platform: &dyn ChatPlatform,
        now: DateTime<Utc>,
    ) -> TickSummary {
        if let Err(e) = self.flush() {
            error!("Report tick: ledger flush failed: {}", e);
        }

        let current_year = local_date(now).year();
        let mut summary = TickSummary::default();

        for guild_id in self.configured_guilds() {
            let guard = self.guild_lock(guild_id);
            let _held = guard.lock().await;

            // Reset may have raced us between listing and locking.
            let Some(config) = self.guild_config(guild_id) else {
                continue;
            };

            let mut years: BTreeSet<i32> = lock(&self.ledger).take_touched_years(guild_id);
            years.insert(current_year);

            // Years not fully reported go back for the next tick.
            let mut unreported = BTreeSet::new();
            let mut skipped = false;
            for &year in &years {
                if skipped {
                    unreported.insert(year);
                    continue;
                }
                match self
                    .report_year_locked(platform, guild_id, config, year)
                    .await
                {
                    Ok(reconciled) => {
                        if reconciled.failed > 0 {
                            unreported.insert(year);
                        }
                        summary.reconcile.absorb(reconciled);
                    }
                    Err(e) => {
                        warn!(
                            "Report tick: skipping guild {} year {}: {}",
                            guild_id, year, e
                        );
                        unreported.insert(year);
                        skipped = true;
                    }
                }
            }
            lock(&self.ledger).restore_touched_years(guild_id, unreported);

            if skipped {
                summary.skipped += 1;
            } else {
                summary.guilds += 1;
            }
        }

        debug!(
            "Report tick: {} guilds reported, {} skipped",
            summary.guilds, summary.skipped
        );
        summary
    }

    /// Delete the bot's posts (and user posts with `include_users`) from the
    /// guild's log channel, newest first, then forget the posted-report index
    /// so the next pass posts fresh reports.
    pub async fn purge_log(
        &self,
        platform: &dyn ChatPlatform,
        guild_id: GuildId,
        limit: Option<usize>,
        include_users: bool,
    ) -> Result<PurgeSummary, TrackerError> {
        let guard = self.guild_lock(guild_id);
        let _held = guard.lock().await;

        let config = self
            .guild_config(guild_id)
            .ok_or(TrackerError::NotConfigured(guild_id))?;
        let result = purge_channel(
            platform,
            config.log_channel_id,
            limit,
            include_users,
            self.page_size,
        )
        .await;

        lock(&self.index).remove_guild(guild_id)?;
        let summary = result?;
        info!(
            "Purge: guild {} deleted {} messages from log channel {}",
            guild_id, summary.deleted, config.log_channel_id
        );
        Ok(summary)
    }

    async fn report_year_locked(
        &self,
        platform: &dyn ChatPlatform,
        guild_id: GuildId,
        config: GuildConfig,
        year: i32,
    ) -> Result<ReconcileSummary, TrackerError> {
        let chunks = render(year, &lock(&self.ledger).year_slice(guild_id, year));
        if chunks.is_empty() {
            return Ok(ReconcileSummary::default());
        }

        let mut known = lock(&self.index).year(guild_id, year);
        let reconciler = Reconciler::new(platform, config.log_channel_id, self.window_size);
        let result = reconciler.reconcile(&chunks, &mut known).await;

        // Whatever got posted before a failure is still worth remembering.
        lock(&self.index).set_year(guild_id, year, known)?;
        Ok(result?)
    }
}
