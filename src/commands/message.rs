use crate::purge::MAX_PURGE;
use crate::services::TrackerError;
use crate::{Context, Error};

/// Manage messages in the log channel
#[poise::command(
    slash_command,
    subcommands("purge"),
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn message(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Delete the bot's messages from the log channel
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn purge(
    ctx: Context<'_>,
    #[description = "Most messages to delete"]
    #[min = 1]
    #[max = 500]
    total_messages: Option<usize>,
    #[description = "Also delete other users' messages"]
    include_users: Option<bool>,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer_ephemeral().await?;

    let limit = total_messages.map(|n| n.min(MAX_PURGE));
    let data = ctx.data();
    let content = match data
        .tracker
        .purge_log(
            data.platform.as_ref(),
            guild_id,
            limit,
            include_users.unwrap_or(false),
        )
        .await
    {
        Ok(summary) if summary.failed > 0 => format!(
            "⚠️ Deleted **{}** messages, **{}** could not be deleted.",
            summary.deleted, summary.failed
        ),
        Ok(summary) => format!("✅ Deleted **{}** messages.", summary.deleted),
        Err(TrackerError::NotConfigured(_)) => {
            "ℹ️ This server is not set up yet. Use `/setup channels`.".to_string()
        }
        Err(TrackerError::Platform(e)) => format!("❌ Purge stopped: {}", e),
        Err(e) => return Err(e.into()),
    };

    ctx.say(content).await?;
    Ok(())
}
