use crate::platform::MAX_PAGE_SIZE;
use crate::store::CommitPolicy;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub discord_token: String,
    pub owner_id: Option<u64>,
    pub dev_guild_id: Option<u64>,
    pub ledger_path: String,
    pub guild_config_path: String,
    pub log_index_path: String,
    pub report_interval: Duration,
    pub log_window_size: u8,
    pub history_page_size: u8,
    pub ledger_commit_batch: usize,
    pub status_message: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();
        Self::build()
    }

    fn build() -> anyhow::Result<Self> {
        Ok(Config {
            discord_token: env::var("DISCORD_TOKEN")
                .map_err(|_| anyhow::anyhow!("DISCORD_TOKEN must be set"))?,
            owner_id: env::var("OWNER_ID").ok().and_then(|id| id.parse().ok()),
            dev_guild_id: env::var("DEV_GUILD_ID").ok().and_then(|id| id.parse().ok()),
            ledger_path: env::var("LEDGER_PATH").unwrap_or_else(|_| "data/data.json".to_string()),
            guild_config_path: env::var("GUILD_CONFIG_PATH")
                .unwrap_or_else(|_| "data/config.json".to_string()),
            log_index_path: env::var("LOG_INDEX_PATH")
                .unwrap_or_else(|_| "data/log_index.json".to_string()),
            report_interval: humantime::parse_duration(
                &env::var("REPORT_INTERVAL").unwrap_or_else(|_| "5m".to_string()),
            )
            .map_err(|e| anyhow::anyhow!("REPORT_INTERVAL is not a valid duration: {}", e))?,
            log_window_size: Self::page_limit("LOG_WINDOW_SIZE"),
            history_page_size: Self::page_limit("HISTORY_PAGE_SIZE"),
            ledger_commit_batch: env::var("LEDGER_COMMIT_BATCH")
                .unwrap_or_else(|_| "0".to_string())
                .parse()
                .unwrap_or(0),
            status_message: env::var("STATUS_MESSAGE")
                .unwrap_or_else(|_| "In Counting Channel With You! 💙".to_string()),
        })
    }

    /// A Discord list-request size, clamped to 1..=100.
    fn page_limit(var: &str) -> u8 {
        env::var(var)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(MAX_PAGE_SIZE as u64)
            .clamp(1, MAX_PAGE_SIZE as u64) as u8
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy::from_batch_size(self.ledger_commit_batch)
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("discord_token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("dev_guild_id", &self.dev_guild_id)
            .field("ledger_path", &self.ledger_path)
            .field("guild_config_path", &self.guild_config_path)
            .field("log_index_path", &self.log_index_path)
            .field("report_interval", &self.report_interval)
            .field("log_window_size", &self.log_window_size)
            .field("history_page_size", &self.history_page_size)
            .field("ledger_commit_batch", &self.ledger_commit_batch)
            .field("status_message", &self.status_message)
            .finish()
    }
}

/// Discord message limit is 2000 characters
pub const DISCORD_MESSAGE_LIMIT: usize = 2000;
