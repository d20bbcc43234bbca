use crate::store::GuildConfig;
use crate::{Context, Error};
use poise::serenity_prelude as serenity;

/// Configure the counting and log channels for this server
#[poise::command(
    slash_command,
    subcommands("channels", "info", "reset"),
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn setup(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Set the log channel and the counting channel
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn channels(
    ctx: Context<'_>,
    #[description = "Channel where the count log is posted"]
    #[channel_types("Text")]
    log_channel: serenity::GuildChannel,
    #[description = "Channel people count in"]
    #[channel_types("Text")]
    counting_channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    if log_channel.guild_id != guild_id || counting_channel.guild_id != guild_id {
        ctx.send(
            poise::CreateReply::default()
                .content("❌ Both channels must belong to this server.")
                .ephemeral(true),
        )
        .await?;
        return Ok(());
    }

    ctx.data().tracker.setup(
        guild_id,
        GuildConfig {
            log_channel_id: log_channel.id,
            counting_channel_id: counting_channel.id,
        },
    )?;

    ctx.send(
        poise::CreateReply::default()
            .content(format!(
                "✅ Counting in <#{}>, logging to <#{}>. Run `/relog` to build the log from history.",
                counting_channel.id, log_channel.id
            ))
            .ephemeral(true),
    )
    .await?;
    Ok(())
}

/// Show the current setup
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn info(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;
    let tracker = &ctx.data().tracker;

    let reply = match tracker.guild_config(guild_id) {
        Some(config) => {
            let embed = serenity::CreateEmbed::new()
                .title("📊 Count Log Setup")
                .field(
                    "Counting channel",
                    format!("<#{}>", config.counting_channel_id),
                    true,
                )
                .field("Log channel", format!("<#{}>", config.log_channel_id), true)
                .field(
                    "Days on record",
                    format!("`{}`", tracker.tracked_days(guild_id)),
                    true,
                )
                .color(0x5865F2);
            poise::CreateReply::default().embed(embed)
        }
        None => poise::CreateReply::default()
            .content("ℹ️ This server is not set up yet. Use `/setup channels`."),
    };

    ctx.send(reply.ephemeral(true)).await?;
    Ok(())
}

/// Forget this server's setup and recorded counts
#[poise::command(
    slash_command,
    required_permissions = "ADMINISTRATOR",
    guild_only
)]
pub async fn reset(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be run in a guild")?;

    let content = match ctx.data().tracker.reset(guild_id).await? {
        Some(_) => "🗑️ Setup and recorded counts removed. Posted log messages were left in place.",
        None => "ℹ️ This server was not set up.",
    };

    ctx.send(
        poise::CreateReply::default()
            .content(content)
            .ephemeral(true),
    )
    .await?;
    Ok(())
}
