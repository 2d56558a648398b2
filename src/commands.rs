use crate::duration::parse_duration;
use crate::scheduler::ReversalKey;
use crate::{Data, Error};
use poise::serenity_prelude as serenity;
use poise::{Context, command};

/// Basic ping command
/// This command is used to check if the bot is responsive.
#[command(prefix_command, slash_command, guild_only)]
pub async fn ping(ctx: Context<'_, Data, Error>) -> Result<(), Error> {
    ctx.say("Pong!").await?;
    Ok(())
}

/// Render a duration like "1h 30m" for confirmation messages
fn format_span(span: chrono::Duration) -> String {
    let mut seconds = span.num_seconds().max(0);
    let mut parts = Vec::new();

    for (unit, size) in [("d", 86400), ("h", 3600), ("m", 60), ("s", 1)] {
        let count = seconds / size;
        if count > 0 {
            parts.push(format!("{count}{unit}"));
            seconds -= count * size;
        }
    }

    if parts.is_empty() {
        "0s".to_string()
    } else {
        parts.join(" ")
    }
}

fn require_guild(ctx: &Context<'_, Data, Error>) -> Result<serenity::GuildId, Error> {
    ctx.guild_id()
        .ok_or_else(|| Error::from("this command only works in a guild"))
}

/// Mute a user for a duration; the mute lifts automatically when it expires
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn tempmute(
    ctx: Context<'_, Data, Error>,
    #[description = "User to mute"] user: serenity::User,
    #[description = "Duration such as 30m, 1h or 2d"] duration: String,
    #[description = "Reason for the mute"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = require_guild(&ctx)?;
    let Some(span) = parse_duration(&duration) else {
        ctx.say(format!("Could not parse duration `{duration}`. Try 30m, 1h or 2d."))
            .await?;
        return Ok(());
    };

    // Discord caps timeouts at 28 days; the scheduled reversal still fires
    // at the requested expiry and resolves idempotently.
    let timeout_until = chrono::Utc::now() + span.min(chrono::Duration::days(28));
    let mut member = guild_id.member(ctx.http(), user.id).await?;
    member
        .disable_communication_until_datetime(ctx.http(), timeout_until.into())
        .await?;

    ctx.data()
        .scheduler
        .schedule(ReversalKey::unmute(guild_id.get(), user.id.get()), span)
        .await?;

    let reason = reason.unwrap_or_else(|| "no reason given".to_string());
    ctx.say(format!(
        "Muted {} for {} ({reason}).",
        user.name,
        format_span(span)
    ))
    .await?;
    Ok(())
}

/// Lift a user's mute before it expires
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MODERATE_MEMBERS"
)]
pub async fn unmute(
    ctx: Context<'_, Data, Error>,
    #[description = "User to unmute"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = require_guild(&ctx)?;

    let mut member = guild_id.member(ctx.http(), user.id).await?;
    member.enable_communication(ctx.http()).await?;

    ctx.data()
        .scheduler
        .cancel(ReversalKey::unmute(guild_id.get(), user.id.get()))
        .await?;

    ctx.say(format!("Unmuted {}.", user.name)).await?;
    Ok(())
}

/// Ban a user for a duration; the ban lifts automatically when it expires
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn tempban(
    ctx: Context<'_, Data, Error>,
    #[description = "User to ban"] user: serenity::User,
    #[description = "Duration such as 1d or 7d"] duration: String,
    #[description = "Reason for the ban"] reason: Option<String>,
) -> Result<(), Error> {
    let guild_id = require_guild(&ctx)?;
    let Some(span) = parse_duration(&duration) else {
        ctx.say(format!("Could not parse duration `{duration}`. Try 30m, 1h or 2d."))
            .await?;
        return Ok(());
    };

    let reason = reason.unwrap_or_else(|| format!("Temporary ban for {}", format_span(span)));
    guild_id
        .ban_with_reason(ctx.http(), user.id, 0, &reason)
        .await?;

    ctx.data()
        .scheduler
        .schedule(ReversalKey::unban(guild_id.get(), user.id.get()), span)
        .await?;

    ctx.say(format!(
        "Banned {} for {} ({reason}).",
        user.name,
        format_span(span)
    ))
    .await?;
    Ok(())
}

/// Lift a user's ban before it expires
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "BAN_MEMBERS"
)]
pub async fn unban(
    ctx: Context<'_, Data, Error>,
    #[description = "User to unban"] user: serenity::User,
) -> Result<(), Error> {
    let guild_id = require_guild(&ctx)?;

    ctx.http()
        .remove_ban(guild_id, user.id, Some("Ban lifted by moderator"))
        .await?;

    ctx.data()
        .scheduler
        .cancel(ReversalKey::unban(guild_id.get(), user.id.get()))
        .await?;

    ctx.say(format!("Unbanned {}.", user.name)).await?;
    Ok(())
}

/// Grant a role for a duration; the role is removed automatically when it
/// expires
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES"
)]
pub async fn temprole(
    ctx: Context<'_, Data, Error>,
    #[description = "User to grant the role to"] user: serenity::User,
    #[description = "Role to grant"] role: serenity::Role,
    #[description = "Duration such as 1h or 7d"] duration: String,
) -> Result<(), Error> {
    let guild_id = require_guild(&ctx)?;
    let Some(span) = parse_duration(&duration) else {
        ctx.say(format!("Could not parse duration `{duration}`. Try 30m, 1h or 2d."))
            .await?;
        return Ok(());
    };

    ctx.http()
        .add_member_role(guild_id, user.id, role.id, Some("Timed role grant"))
        .await?;

    ctx.data()
        .scheduler
        .schedule(
            ReversalKey::remove_role(guild_id.get(), user.id.get(), role.id.get()),
            span,
        )
        .await?;

    ctx.say(format!(
        "Granted {} to {} for {}.",
        role.name,
        user.name,
        format_span(span)
    ))
    .await?;
    Ok(())
}

/// Remove a timed role grant before it expires
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_ROLES"
)]
pub async fn removerole(
    ctx: Context<'_, Data, Error>,
    #[description = "User to remove the role from"] user: serenity::User,
    #[description = "Role to remove"] role: serenity::Role,
) -> Result<(), Error> {
    let guild_id = require_guild(&ctx)?;

    ctx.http()
        .remove_member_role(guild_id, user.id, role.id, Some("Role removed by moderator"))
        .await?;

    ctx.data()
        .scheduler
        .cancel(ReversalKey::remove_role(
            guild_id.get(),
            user.id.get(),
            role.id.get(),
        ))
        .await?;

    ctx.say(format!("Removed {} from {}.", role.name, user.name))
        .await?;
    Ok(())
}

/// Set the channel where resolved sanctions are reported
#[command(
    prefix_command,
    slash_command,
    guild_only,
    required_permissions = "MANAGE_GUILD"
)]
pub async fn setlogchannel(
    ctx: Context<'_, Data, Error>,
    #[description = "Channel for sanction notices"] channel: serenity::GuildChannel,
) -> Result<(), Error> {
    let guild_id = require_guild(&ctx)?;

    ctx.data()
        .set_sanction_log_channel(guild_id, channel.id.get())
        .await?;

    ctx.say(format!("Sanction notices will be posted in #{}.", channel.name))
        .await?;
    Ok(())
}
