//! Gateway to the platform-side reversal primitives
//!
//! The scheduler core never talks to Discord directly; it goes through this
//! trait so that dispatch outcomes can be classified uniformly and tests can
//! substitute a mock. The classification is what makes dispatch idempotent:
//! a reversal whose target condition is already satisfied comes back as
//! `NotFound` and is treated as success.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serenity::Error as SerenityError;
use serenity::http::{Http, HttpError};
use serenity::model::id::{GuildId, RoleId, UserId};
use std::sync::Arc;
use tracing::info;

/// Classified result of one reversal call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// The reversal was applied
    Success,
    /// Guild, user, role or ban no longer exists, or the condition is
    /// already satisfied. Terminal success for the scheduler.
    NotFound,
    /// The bot lacks permission or loses to role hierarchy. May change
    /// later, so retried on a long fixed interval.
    Forbidden,
    /// The platform asked us to slow down
    RateLimited,
    /// Anything else; treated as transient
    Failed(String),
}

/// The three reversal primitives the scheduler can invoke
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ActionGateway: Send + Sync {
    /// Clear a communication timeout
    async fn remove_mute(&self, guild_id: u64, user_id: u64) -> GatewayOutcome;

    /// Lift a ban
    async fn remove_ban(&self, guild_id: u64, user_id: u64) -> GatewayOutcome;

    /// Remove a granted role
    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> GatewayOutcome;
}

/// Map a Discord API error onto the scheduler's outcome taxonomy
fn classify_api_error(err: &SerenityError) -> GatewayOutcome {
    if let SerenityError::Http(HttpError::UnsuccessfulRequest(response)) = err {
        return match response.status_code.as_u16() {
            404 => GatewayOutcome::NotFound,
            403 => GatewayOutcome::Forbidden,
            429 => GatewayOutcome::RateLimited,
            _ => GatewayOutcome::Failed(err.to_string()),
        };
    }
    GatewayOutcome::Failed(err.to_string())
}

fn classify(result: Result<(), SerenityError>) -> GatewayOutcome {
    match result {
        Ok(()) => GatewayOutcome::Success,
        Err(e) => classify_api_error(&e),
    }
}

/// Production gateway backed by the Discord REST API
pub struct DiscordGateway {
    http: Arc<Http>,
}

impl DiscordGateway {
    #[must_use]
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl ActionGateway for DiscordGateway {
    async fn remove_mute(&self, guild_id: u64, user_id: u64) -> GatewayOutcome {
        let guild_id = GuildId::new(guild_id);
        let user_id = UserId::new(user_id);

        // Fetching the member can itself 404 when the user left the guild;
        // that classification already says there is nothing left to unmute.
        let mut member = match guild_id.member(&*self.http, user_id).await {
            Ok(member) => member,
            Err(e) => return classify_api_error(&e),
        };

        let outcome = classify(member.enable_communication(&*self.http).await);
        if outcome == GatewayOutcome::Success {
            info!(%guild_id, %user_id, "Cleared communication timeout");
        }
        outcome
    }

    async fn remove_ban(&self, guild_id: u64, user_id: u64) -> GatewayOutcome {
        let guild_id = GuildId::new(guild_id);
        let user_id = UserId::new(user_id);

        let outcome = classify(
            self.http
                .remove_ban(guild_id, user_id, Some("Temporary ban expired"))
                .await,
        );
        if outcome == GatewayOutcome::Success {
            info!(%guild_id, %user_id, "Lifted ban");
        }
        outcome
    }

    async fn remove_role(&self, guild_id: u64, user_id: u64, role_id: u64) -> GatewayOutcome {
        let guild_id = GuildId::new(guild_id);
        let user_id = UserId::new(user_id);
        let role_id = RoleId::new(role_id);

        let outcome = classify(
            self.http
                .remove_member_role(guild_id, user_id, role_id, Some("Timed role grant expired"))
                .await,
        );
        if outcome == GatewayOutcome::Success {
            info!(%guild_id, %user_id, %role_id, "Removed timed role");
        }
        outcome
    }
}
