pub mod commands;
pub mod config;
pub mod ingest;
pub mod platform;
pub mod purge;
pub mod rebuild;
pub mod reconcile;
pub mod report;
pub mod scheduler;
pub mod services;
pub mod store;

/// Custom data passed to all commands
pub struct Data {
    pub config: config::Config,
    pub tracker: std::sync::Arc<services::CountTracker>,
    pub platform: std::sync::Arc<dyn platform::ChatPlatform>,
    /// When the bot finished connecting, for `/ping`
    pub started_at: chrono::DateTime<chrono::Utc>,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;
