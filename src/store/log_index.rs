//! Which posted message holds each rendered report chunk.

use super::{read_json, write_json_atomic, StoreError};
use serenity::all::{GuildId, MessageId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// On-disk shape: `{"<guild>": {"<year>": {"<part>": <message id>}}}`.
type RawIndex = BTreeMap<u64, BTreeMap<i32, BTreeMap<u32, u64>>>;

/// `(guild, year, part) → message id` for report chunks already posted.
pub struct LogIndex {
    entries: BTreeMap<(GuildId, i32), BTreeMap<u32, MessageId>>,
    path: Option<PathBuf>,
}

impl LogIndex {
    pub fn in_memory() -> Self {
        Self {
            entries: BTreeMap::new(),
            path: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw: RawIndex = read_json(path)?.unwrap_or_default();

        let mut entries = BTreeMap::new();
        for (guild, years) in raw {
            if guild == 0 {
                return Err(StoreError::malformed(path, "zero guild id"));
            }
            for (year, parts) in years {
                let mut year_parts = BTreeMap::new();
                for (part, message) in parts {
                    if message == 0 {
                        return Err(StoreError::malformed(
                            path,
                            format!("guild {guild} year {year} part {part} has a zero message id"),
                        ));
                    }
                    year_parts.insert(part, MessageId::new(message));
                }
                entries.insert((GuildId::new(guild), year), year_parts);
            }
        }

        Ok(Self {
            entries,
            path: Some(path.to_path_buf()),
        })
    }

    /// Known message ids for one guild-year, by part.
    pub fn year(&self, guild_id: GuildId, year: i32) -> BTreeMap<u32, MessageId> {
        self.entries
            .get(&(guild_id, year))
            .cloned()
            .unwrap_or_default()
    }

    /// Replace the parts recorded for one guild-year and persist.
    pub fn set_year(
        &mut self,
        guild_id: GuildId,
        year: i32,
        parts: BTreeMap<u32, MessageId>,
    ) -> Result<(), StoreError> {
        if parts.is_empty() {
            self.entries.remove(&(guild_id, year));
        } else {
            self.entries.insert((guild_id, year), parts);
        }
        self.save()
    }

    pub fn remove_guild(&mut self, guild_id: GuildId) -> Result<(), StoreError> {
        let before = self.entries.len();
        self.entries.retain(|(guild, _), _| *guild != guild_id);
        if self.entries.len() != before {
            self.save()?;
        }
        Ok(())
    }

    fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut raw = RawIndex::new();
        for ((guild, year), parts) in &self.entries {
            raw.entry(guild.get()).or_default().insert(
                *year,
                parts.iter().map(|(part, id)| (*part, id.get())).collect(),
            );
        }
        write_json_atomic(path, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log_index.json");
        let g1 = GuildId::new(7);

        let mut index = LogIndex::load(&path).unwrap();
        let parts = BTreeMap::from([(1, MessageId::new(1001)), (2, MessageId::new(1002))]);
        index.set_year(g1, 2025, parts.clone()).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["7"]["2025"]["2"], 1002);

        let reloaded = LogIndex::load(&path).unwrap();
        assert_eq!(reloaded.year(g1, 2025), parts);
        assert!(reloaded.year(g1, 2024).is_empty());
    }

    #[test]
    fn test_remove_guild_only_drops_that_guild() {
        let mut index = LogIndex::in_memory();
        let (g1, g2) = (GuildId::new(1), GuildId::new(2));
        index
            .set_year(g1, 2025, BTreeMap::from([(1, MessageId::new(10))]))
            .unwrap();
        index
            .set_year(g2, 2025, BTreeMap::from([(1, MessageId::new(20))]))
            .unwrap();

        index.remove_guild(g1).unwrap();
        assert!(index.year(g1, 2025).is_empty());
        assert_eq!(index.year(g2, 2025).len(), 1);
    }
}
