use super::{read_json, write_json_atomic, StoreError};
use serde::{Deserialize, Serialize};
use serenity::all::{ChannelId, GuildId};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::info;

/// Channels a guild has designated for counting and for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuildConfig {
    pub log_channel_id: ChannelId,
    pub counting_channel_id: ChannelId,
}

/// On-disk shape: plain integers, as written by the setup command.
#[derive(Serialize, Deserialize)]
struct StoredGuildConfig {
    log_channel_id: u64,
    counting_channel_id: u64,
}

impl From<&GuildConfig> for StoredGuildConfig {
    fn from(config: &GuildConfig) -> Self {
        Self {
            log_channel_id: config.log_channel_id.get(),
            counting_channel_id: config.counting_channel_id.get(),
        }
    }
}

pub struct GuildConfigStore {
    configs: HashMap<GuildId, GuildConfig>,
    path: Option<PathBuf>,
}

impl GuildConfigStore {
    pub fn in_memory() -> Self {
        Self {
            configs: HashMap::new(),
            path: None,
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let raw: HashMap<String, StoredGuildConfig> = read_json(path)?.unwrap_or_default();

        let mut configs = HashMap::with_capacity(raw.len());
        for (guild, stored) in raw {
            let guild_id = guild
                .parse::<u64>()
                .ok()
                .filter(|id| *id != 0)
                .map(GuildId::new)
                .ok_or_else(|| StoreError::malformed(path, format!("invalid guild id '{guild}'")))?;
            if stored.log_channel_id == 0 || stored.counting_channel_id == 0 {
                return Err(StoreError::malformed(
                    path,
                    format!("guild {guild} has a zero channel id"),
                ));
            }
            configs.insert(
                guild_id,
                GuildConfig {
                    log_channel_id: ChannelId::new(stored.log_channel_id),
                    counting_channel_id: ChannelId::new(stored.counting_channel_id),
                },
            );
        }

        info!(
            "Guild config: loaded {} guilds from {}",
            configs.len(),
            path.display()
        );

        Ok(Self {
            configs,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn get(&self, guild_id: GuildId) -> Option<GuildConfig> {
        self.configs.get(&guild_id).copied()
    }

    pub fn set(&mut self, guild_id: GuildId, config: GuildConfig) -> Result<(), StoreError> {
        self.configs.insert(guild_id, config);
        self.save()
    }

    pub fn remove(&mut self, guild_id: GuildId) -> Result<Option<GuildConfig>, StoreError> {
        let removed = self.configs.remove(&guild_id);
        if removed.is_some() {
            self.save()?;
        }
        Ok(removed)
    }

    /// Configured guilds in ascending id order, so startup relogs run in a
    /// stable sequence.
    pub fn guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self.configs.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }

    fn save(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw: BTreeMap<String, StoredGuildConfig> = self
            .configs
            .iter()
            .map(|(guild_id, config)| (guild_id.to_string(), config.into()))
            .collect();
        write_json_atomic(path, &raw)
    }
}
