use countlogger::commands::{help, message, ping, relog, setup};
use countlogger::ingest::MessageEvent;
use countlogger::platform::{ChatPlatform, DiscordPlatform};
use countlogger::scheduler::ReportScheduler;
use countlogger::services::CountTracker;
use countlogger::store::{GuildConfigStore, LedgerStore, LogIndex};
use countlogger::{config::Config, Data};
use poise::serenity_prelude as serenity;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    // Load configuration
    let config = Config::from_env()?;
    let discord_token = config.discord_token.clone();

    // Load persisted state; a malformed file stops startup
    let ledger = LedgerStore::load(&config.ledger_path, config.commit_policy())?;
    let guilds = GuildConfigStore::load(&config.guild_config_path)?;
    let index = LogIndex::load(&config.log_index_path)?;
    info!("{} guilds configured", guilds.len());

    let tracker = Arc::new(CountTracker::new(
        ledger,
        guilds,
        index,
        config.log_window_size,
        config.history_page_size,
    ));

    let shutdown_tracker = tracker.clone();

    let mut owners = HashSet::new();
    if let Some(owner_id) = config.owner_id {
        owners.insert(serenity::UserId::new(owner_id));
    }

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                setup::setup(),
                relog::relog(),
                message::message(),
                help::help(),
                ping::ping(),
            ],
            owners,
            skip_checks_for_owners: true,
            event_handler: |_ctx, event, _framework, data| {
                Box::pin(async move {
                    if let serenity::FullEvent::Message { new_message } = event {
                        let message = MessageEvent::from_message(new_message);
                        if let Err(e) = data.tracker.ingest(&message).await {
                            error!("Failed to record message {}: {}", new_message.id, e);
                        }
                    }
                    Ok(())
                })
            },
            ..Default::default()
        })
        .setup(move |ctx, ready, framework| {
            Box::pin(async move {
                info!("Bot is ready as {}!", ready.user.name);
                let commands = &framework.options().commands;
                match config.dev_guild_id {
                    Some(guild_id) => {
                        poise::builtins::register_in_guild(
                            ctx,
                            commands,
                            serenity::GuildId::new(guild_id),
                        )
                        .await?
                    }
                    None => poise::builtins::register_globally(ctx, commands).await?,
                }

                // Set bot status
                ctx.set_activity(Some(serenity::ActivityData::custom(&config.status_message)));

                let platform: Arc<dyn ChatPlatform> =
                    Arc::new(DiscordPlatform::new(ctx.http.clone(), ready.user.id));

                let scheduler = ReportScheduler::new(
                    tracker.clone(),
                    platform.clone(),
                    config.report_interval,
                );
                tokio::spawn(scheduler.run());

                Ok(Data {
                    config,
                    tracker,
                    platform,
                    started_at: chrono::Utc::now(),
                })
            })
        })
        .build();

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT;

    let mut client = serenity::ClientBuilder::new(&discord_token, intents)
        .framework(framework)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create client: {}", e))?;

    info!("Starting bot...");
    if let Err(why) = client.start().await {
        error!("Client error: {:?}", why);
    }

    // Persist anything a batched commit policy was still holding
    shutdown_tracker.flush()?;
    Ok(())
}
