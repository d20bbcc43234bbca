use crate::services::TrackerError;
use crate::{Context, Error};

/// Rebuild the count log from the counting channel's full history
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn relog(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    ctx.defer_ephemeral().await?;

    let data = ctx.data();
    let content = match data.tracker.relog(data.platform.as_ref(), guild_id).await {
        Ok(summary) => format!(
            "✅ Scanned **{}** messages, kept **{}** counts over **{}** days in **{}** years.\n\
             Log messages: {} edited, {} posted, {} failed.",
            summary.rebuild.scanned,
            summary.rebuild.accepted,
            summary.rebuild.days,
            summary.years,
            summary.reconcile.edited,
            summary.reconcile.appended,
            summary.reconcile.failed
        ),
        Err(TrackerError::NotConfigured(_)) => {
            "ℹ️ This server is not set up yet. Use `/setup channels`.".to_string()
        }
        Err(TrackerError::Platform(e)) => format!("❌ Relog stopped: {}", e),
        Err(e) => return Err(e.into()),
    };

    ctx.say(content).await?;
    Ok(())
}
