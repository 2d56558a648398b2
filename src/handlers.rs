use crate::EVENT_TARGET;
use poise::serenity_prelude::{self as serenity, Context, EventHandler, GuildId, Ready};
use tracing::{info, warn};

pub struct Handler;

#[serenity::async_trait]
impl EventHandler for Handler {
    /// Called when the bot is ready, but the cache may not be fully populated yet.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            target: EVENT_TARGET,
            user = %ready.user.name,
            shard = %ctx.shard_id,
            event = "ready",
            "Connected to Discord"
        );
    }

    /// Called when the cache is fully populated.
    async fn cache_ready(&self, ctx: Context, guilds: Vec<GuildId>) {
        let guild_count_cache = ctx.cache.guild_count();
        let guild_count = guilds.len();
        if guild_count != guild_count_cache {
            warn!(
                target: EVENT_TARGET,
                "Cache guild count mismatch: {guild_count_cache} (cache) vs {guild_count} (actual)"
            );
        }
        info!(
            target: EVENT_TARGET,
            guilds = guild_count,
            event = "cache_ready",
            "Cache ready"
        );
    }
}
