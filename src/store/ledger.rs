//! Per-guild, per-day count watermarks.

use super::{read_json, write_json_atomic, CommitPolicy, StoreError};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serenity::all::GuildId;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Every ledger day is a calendar day at this fixed offset from UTC.
pub const LEDGER_UTC_OFFSET_HOURS: i64 = 9;

const DATE_FORMAT: &str = "%Y/%m/%d";

/// Normalize a UTC instant to its ledger day.
pub fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    (ts.naive_utc() + Duration::hours(LEDGER_UTC_OFFSET_HOURS)).date()
}

/// Identifies one watermark. Ordered by guild first, so every guild's
/// entries form one contiguous range of the map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LedgerKey {
    pub guild_id: GuildId,
    pub date: NaiveDate,
}

impl LedgerKey {
    pub fn new(guild_id: GuildId, date: NaiveDate) -> Self {
        Self { guild_id, date }
    }

    /// Persisted form: `"<guildID>:<YYYY/MM/DD>"`.
    pub fn to_storage_key(&self) -> String {
        format!("{}:{}", self.guild_id, self.date.format(DATE_FORMAT))
    }

    pub fn parse_storage_key(raw: &str) -> Result<Self, String> {
        let (guild, date) = raw
            .split_once(':')
            .ok_or_else(|| format!("key '{raw}' has no ':' separator"))?;
        let guild: u64 = guild
            .parse()
            .map_err(|_| format!("key '{raw}' has an invalid guild id"))?;
        if guild == 0 {
            return Err(format!("key '{raw}' has a zero guild id"));
        }
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
            .map_err(|_| format!("key '{raw}' has an invalid date"))?;
        Ok(Self::new(GuildId::new(guild), date))
    }

    fn guild_range(guild_id: GuildId) -> std::ops::RangeInclusive<LedgerKey> {
        LedgerKey::new(guild_id, NaiveDate::MIN)..=LedgerKey::new(guild_id, NaiveDate::MAX)
    }
}

pub struct LedgerStore {
    entries: BTreeMap<LedgerKey, u64>,
    path: Option<PathBuf>,
    policy: CommitPolicy,
    pending: usize,
    touched: BTreeMap<GuildId, BTreeSet<i32>>,
}

impl LedgerStore {
    /// A ledger that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            entries: BTreeMap::new(),
            path: None,
            policy: CommitPolicy::Immediate,
            pending: 0,
            touched: BTreeMap::new(),
        }
    }

    /// Load the ledger file at `path`; a missing file is an empty ledger.
    pub fn load(path: impl AsRef<Path>, policy: CommitPolicy) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw: BTreeMap<String, u64> = read_json(path)?.unwrap_or_default();

        let mut entries = BTreeMap::new();
        for (key, count) in raw {
            let key =
                LedgerKey::parse_storage_key(&key).map_err(|e| StoreError::malformed(path, e))?;
            entries.insert(key, count);
        }

        info!(
            "Ledger: loaded {} entries from {}",
            entries.len(),
            path.display()
        );

        Ok(Self {
            entries,
            path: Some(path.to_path_buf()),
            policy,
            pending: 0,
            touched: BTreeMap::new(),
        })
    }

    /// Raise the watermark for `(guild_id, date)` to `value`, creating it if
    /// absent. Returns whether the stored value changed.
    pub fn upsert_max(
        &mut self,
        guild_id: GuildId,
        date: NaiveDate,
        value: u64,
    ) -> Result<bool, StoreError> {
        let changed = match self.entries.entry(LedgerKey::new(guild_id, date)) {
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
            Entry::Occupied(mut slot) if *slot.get() < value => {
                slot.insert(value);
                true
            }
            Entry::Occupied(_) => false,
        };

        if !changed {
            return Ok(false);
        }

        self.touched.entry(guild_id).or_default().insert(date.year());
        self.pending += 1;
        self.maybe_commit()?;
        Ok(true)
    }

    /// Remove every entry belonging to `guild_id`. Returns how many were removed.
    pub fn clear_guild(&mut self, guild_id: GuildId) -> Result<usize, StoreError> {
        let removed = self.remove_guild_entries(guild_id);
        self.touched.remove(&guild_id);
        if removed > 0 {
            self.pending += 1;
            self.maybe_commit()?;
        }
        Ok(removed)
    }

    /// Clear `guild_id` and install `days` as its full slice, committing once.
    pub fn replace_guild(
        &mut self,
        guild_id: GuildId,
        days: BTreeMap<NaiveDate, u64>,
    ) -> Result<(), StoreError> {
        let removed = self.remove_guild_entries(guild_id);
        let inserted = days.len();
        for (date, count) in days {
            self.entries.insert(LedgerKey::new(guild_id, date), count);
        }
        self.touched.remove(&guild_id);
        debug!(
            "Ledger: replaced guild {} slice ({} removed, {} inserted)",
            guild_id, removed, inserted
        );
        self.pending += 1;
        self.flush()
    }

    /// All entries for `guild_id` within `year`, ascending by date.
    pub fn year_slice(&self, guild_id: GuildId, year: i32) -> BTreeMap<NaiveDate, u64> {
        let (Some(first), Some(last)) = (
            NaiveDate::from_ymd_opt(year, 1, 1),
            NaiveDate::from_ymd_opt(year, 12, 31),
        ) else {
            return BTreeMap::new();
        };

        self.entries
            .range(LedgerKey::new(guild_id, first)..=LedgerKey::new(guild_id, last))
            .map(|(key, count)| (key.date, *count))
            .collect()
    }

    /// Every year that has at least one entry for `guild_id`.
    pub fn years(&self, guild_id: GuildId) -> BTreeSet<i32> {
        self.entries
            .range(LedgerKey::guild_range(guild_id))
            .map(|(key, _)| key.date.year())
            .collect()
    }

    pub fn get(&self, guild_id: GuildId, date: NaiveDate) -> Option<u64> {
        self.entries.get(&LedgerKey::new(guild_id, date)).copied()
    }

    pub fn guild_len(&self, guild_id: GuildId) -> usize {
        self.entries.range(LedgerKey::guild_range(guild_id)).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Years mutated by `upsert_max` since the last call, for this guild.
    pub fn take_touched_years(&mut self, guild_id: GuildId) -> BTreeSet<i32> {
        self.touched.remove(&guild_id).unwrap_or_default()
    }

    /// Put back years handed out by `take_touched_years` that were not
    /// reported after all.
    pub fn restore_touched_years(
        &mut self,
        guild_id: GuildId,
        years: impl IntoIterator<Item = i32>,
    ) {
        let mut years = years.into_iter().peekable();
        if years.peek().is_some() {
            self.touched.entry(guild_id).or_default().extend(years);
        }
    }

    /// Write outstanding mutations regardless of the commit policy.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending == 0 {
            return Ok(());
        }
        if let Some(path) = &self.path {
            let raw: BTreeMap<String, u64> = self
                .entries
                .iter()
                .map(|(key, count)| (key.to_storage_key(), *count))
                .collect();
            write_json_atomic(path, &raw)?;
            debug!("Ledger: committed {} pending mutations", self.pending);
        }
        self.pending = 0;
        Ok(())
    }

    pub fn pending(&self) -> usize {
        self.pending
    }

    fn maybe_commit(&mut self) -> Result<(), StoreError> {
        if self.policy.should_commit(self.pending) {
            self.flush()
        } else {
            Ok(())
        }
    }

    fn remove_guild_entries(&mut self, guild_id: GuildId) -> usize {
        let keys: Vec<LedgerKey> = self
            .entries
            .range(LedgerKey::guild_range(guild_id))
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        keys.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_local_date_uses_fixed_plus_nine() {
        let before = Utc.with_ymd_and_hms(2025, 6, 15, 14, 59, 59).unwrap();
        let after = Utc.with_ymd_and_hms(2025, 6, 15, 15, 0, 0).unwrap();
        assert_eq!(local_date(before), day(2025, 6, 15));
        assert_eq!(local_date(after), day(2025, 6, 16));
    }

    #[test]
    fn test_upsert_max_keeps_watermark() {
        let mut ledger = LedgerStore::in_memory();
        let g1 = GuildId::new(1);

        for value in [5, 3, 10] {
            ledger.upsert_max(g1, day(2025, 6, 16), value).unwrap();
        }
        ledger.upsert_max(g1, day(2025, 6, 17), 8).unwrap();

        assert_eq!(ledger.get(g1, day(2025, 6, 16)), Some(10));
        assert_eq!(ledger.get(g1, day(2025, 6, 17)), Some(8));
        assert!(!ledger.upsert_max(g1, day(2025, 6, 16), 9).unwrap());
    }

    #[test]
    fn test_clear_guild_leaves_other_guilds() {
        let mut ledger = LedgerStore::in_memory();
        let (g1, g2) = (GuildId::new(1), GuildId::new(2));
        ledger.upsert_max(g1, day(2024, 12, 31), 4).unwrap();
        ledger.upsert_max(g1, day(2025, 1, 1), 7).unwrap();
        ledger.upsert_max(g2, day(2025, 1, 1), 3).unwrap();

        assert_eq!(ledger.clear_guild(g1).unwrap(), 2);
        assert_eq!(ledger.guild_len(g1), 0);
        assert_eq!(ledger.get(g2, day(2025, 1, 1)), Some(3));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_year_slice_is_bounded_and_ordered() {
        let mut ledger = LedgerStore::in_memory();
        let g1 = GuildId::new(1);
        ledger.upsert_max(g1, day(2025, 12, 31), 30).unwrap();
        ledger.upsert_max(g1, day(2025, 1, 1), 10).unwrap();
        ledger.upsert_max(g1, day(2024, 12, 31), 5).unwrap();
        ledger.upsert_max(g1, day(2026, 1, 1), 40).unwrap();
        ledger.upsert_max(GuildId::new(2), day(2025, 6, 1), 99).unwrap();

        let slice: Vec<_> = ledger.year_slice(g1, 2025).into_iter().collect();
        assert_eq!(slice, vec![(day(2025, 1, 1), 10), (day(2025, 12, 31), 30)]);
        assert_eq!(
            ledger.years(g1).into_iter().collect::<Vec<_>>(),
            vec![2024, 2025, 2026]
        );
    }

    #[test]
    fn test_touched_years_are_drained() {
        let mut ledger = LedgerStore::in_memory();
        let g1 = GuildId::new(1);
        ledger.upsert_max(g1, day(2024, 12, 31), 5).unwrap();
        ledger.upsert_max(g1, day(2025, 1, 1), 6).unwrap();

        let touched: Vec<_> = ledger.take_touched_years(g1).into_iter().collect();
        assert_eq!(touched, vec![2024, 2025]);
        assert!(ledger.take_touched_years(g1).is_empty());
    }

    #[test]
    fn test_restored_years_merge_with_new_ones() {
        let mut ledger = LedgerStore::in_memory();
        let g1 = GuildId::new(1);
        ledger.upsert_max(g1, day(2024, 12, 31), 5).unwrap();
        let taken = ledger.take_touched_years(g1);

        ledger.upsert_max(g1, day(2025, 1, 1), 6).unwrap();
        ledger.restore_touched_years(g1, taken);
        ledger.restore_touched_years(GuildId::new(2), []);

        let touched: Vec<_> = ledger.take_touched_years(g1).into_iter().collect();
        assert_eq!(touched, vec![2024, 2025]);
        assert!(ledger.take_touched_years(GuildId::new(2)).is_empty());
    }

    #[test]
    fn test_persisted_key_format_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let g1 = GuildId::new(123);

        let mut ledger = LedgerStore::load(&path, CommitPolicy::Immediate).unwrap();
        ledger.upsert_max(g1, day(2025, 6, 16), 10).unwrap();

        let raw: BTreeMap<String, u64> =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.get("123:2025/06/16"), Some(&10));

        let reloaded = LedgerStore::load(&path, CommitPolicy::Immediate).unwrap();
        assert_eq!(reloaded.get(g1, day(2025, 6, 16)), Some(10));
    }

    #[test]
    fn test_batched_policy_defers_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        let g1 = GuildId::new(1);

        let mut ledger =
            LedgerStore::load(&path, CommitPolicy::Batched { max_pending: 3 }).unwrap();
        ledger.upsert_max(g1, day(2025, 1, 1), 1).unwrap();
        ledger.upsert_max(g1, day(2025, 1, 2), 2).unwrap();
        assert!(!path.exists());
        assert_eq!(ledger.pending(), 2);

        ledger.upsert_max(g1, day(2025, 1, 3), 3).unwrap();
        assert!(path.exists());
        assert_eq!(ledger.pending(), 0);

        ledger.upsert_max(g1, day(2025, 1, 4), 4).unwrap();
        ledger.flush().unwrap();
        let reloaded = LedgerStore::load(&path, CommitPolicy::Immediate).unwrap();
        assert_eq!(reloaded.guild_len(g1), 4);
    }

    #[test]
    fn test_malformed_key_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"123-2025/06/16": 4}"#).unwrap();

        let result = LedgerStore::load(&path, CommitPolicy::Immediate);
        assert!(matches!(result, Err(StoreError::Malformed { .. })));
    }
}
