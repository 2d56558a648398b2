//! Reversal notice delivery
//!
//! The scheduler publishes a `ReversalNotice` after every resolved reversal;
//! this task consumes them and reports to the guild's configured sanction log
//! channel. Keeping the consumer here means the scheduler never formats or
//! delivers messages itself.

use crate::Data;
use crate::scheduler::{NoticeKind, ReversalNotice};
use poise::serenity_prelude::{ChannelId, Http};
use std::sync::Arc;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

/// Render one notice as a log line for moderators
fn format_notice(notice: &ReversalNotice) -> String {
    match notice.outcome {
        NoticeKind::Reversed => format!("Sanction expired: {}.", notice.key),
        NoticeKind::AlreadyResolved => {
            format!("Sanction already resolved when it expired: {}.", notice.key)
        }
        NoticeKind::Abandoned => format!(
            "Gave up reversing after {} failed attempts: {}. Manual action needed.",
            notice.attempts, notice.key
        ),
    }
}

/// Spawn the task draining reversal notices
pub fn start_notice_task(data: Data, http: Arc<Http>, mut rx: Receiver<ReversalNotice>) {
    tokio::spawn(async move {
        info!("Starting reversal notice task");

        while let Some(notice) = rx.recv().await {
            let guild_id =
                poise::serenity_prelude::GuildId::new(notice.key.guild_id);
            let Some(channel_id) = data
                .get_guild_config(guild_id)
                .and_then(|config| config.sanction_log_channel_id)
            else {
                debug!(key = %notice.key, "No sanction log channel configured, notice dropped");
                continue;
            };

            let message = format_notice(&notice);
            if let Err(e) = ChannelId::new(channel_id).say(&*http, &message).await {
                warn!(
                    key = %notice.key,
                    channel_id,
                    error = %e,
                    "Failed to deliver reversal notice"
                );
            }
        }

        info!("Reversal notice task shut down");
    });
}
