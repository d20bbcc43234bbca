use crate::{Context, Error};
use chrono::Utc;
use std::time::Duration;

/// Check latency and uptime
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn ping(ctx: Context<'_>) -> Result<(), Error> {
    let latency = ctx.ping().await;
    let uptime = (Utc::now() - ctx.data().started_at)
        .to_std()
        .unwrap_or_default();
    let uptime = humantime::format_duration(Duration::from_secs(uptime.as_secs()));

    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "🏓 Pong! Gateway latency `{}ms`, up for `{}`, tracking `{}` servers.",
                latency.as_millis(),
                uptime,
                ctx.data().tracker.configured_count()
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
