use crate::{Context, Error};

const HELP_TEXT: &str = "\
## 📊 Count Log
Tracks the highest number posted in your counting channel each day (UTC+9) \
and keeps a yearly log of those numbers in a log channel.

**Commands** (administrators only)
`/setup channels` pick the log channel and the counting channel
`/setup info` show the current setup
`/setup reset` forget the setup and every recorded count
`/relog` rebuild the log from the counting channel's full history
`/message purge` delete the bot's messages from the log channel
`/ping` check that the bot is alive

**How counting works**
Only messages made of a whole number count. Each day keeps its highest number, \
and the log shows how much it changed from the day before. The log is refreshed \
every few minutes.";

/// How the count log works
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn help(ctx: Context<'_>) -> Result<(), Error> {
    ctx.send(
        poise::CreateReply::default()
            .content(HELP_TEXT)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
