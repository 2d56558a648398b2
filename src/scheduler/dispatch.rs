//! Dispatching one due reversal
//!
//! The dispatcher resolves a key to the concrete gateway call, classifies the
//! outcome, and reports a disposition: either the obligation is resolved (the
//! sweep deletes the record) or it must be re-armed at a later time. Every
//! outcome lands in one of those two buckets; a failed dispatch can never
//! leave a key permanently unarmed.

use crate::scheduler::{
    ActionGateway, Clock, GatewayOutcome, ReversalKey, ReversalKind, ReversalRecord,
    SchedulerConfig,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::mpsc::Sender;
use tracing::{error, info, warn};

/// What a resolved reversal turned out to be
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The reversal was applied
    Reversed,
    /// The target condition was already satisfied when we got there
    AlreadyResolved,
    /// The retry ceiling was exceeded and the obligation was dropped
    Abandoned,
}

/// Published after each resolved reversal so that notification formatting
/// stays outside the scheduler
#[derive(Debug, Clone)]
pub struct ReversalNotice {
    pub key: ReversalKey,
    pub outcome: NoticeKind,
    pub attempts: u32,
}

/// Outcome of one dispatch, as seen by the sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Delete the record; the obligation no longer exists
    Resolved,
    /// Re-arm the record at `execute_at` with an incremented attempt count
    Retry { execute_at: DateTime<Utc> },
}

/// Invokes the gateway for due records and classifies the result
pub struct Dispatcher {
    gateway: Arc<dyn ActionGateway>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    notices: Option<Sender<ReversalNotice>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(gateway: Arc<dyn ActionGateway>, clock: Arc<dyn Clock>, config: SchedulerConfig) -> Self {
        Self {
            gateway,
            clock,
            config,
            notices: None,
        }
    }

    /// Attach the observer channel notices are published to
    #[must_use]
    pub fn with_notices(mut self, tx: Sender<ReversalNotice>) -> Self {
        self.notices = Some(tx);
        self
    }

    /// Dispatch one claimed record
    pub async fn dispatch(&self, record: &ReversalRecord) -> Disposition {
        let key = record.key;

        let outcome = match key.kind {
            ReversalKind::Unmute => self.gateway.remove_mute(key.guild_id, key.user_id).await,
            ReversalKind::Unban => self.gateway.remove_ban(key.guild_id, key.user_id).await,
            ReversalKind::RemoveRole => {
                let Some(role_id) = key.role_id else {
                    // A RemoveRole key without a role cannot name any work;
                    // keeping it would retry forever.
                    error!(%key, "Role reversal record has no role id, dropping");
                    return Disposition::Resolved;
                };
                self.gateway
                    .remove_role(key.guild_id, key.user_id, role_id)
                    .await
            }
        };

        match outcome {
            GatewayOutcome::Success => {
                info!(%key, attempts = record.attempts, "Reversal applied");
                self.publish(key, NoticeKind::Reversed, record.attempts).await;
                Disposition::Resolved
            }
            GatewayOutcome::NotFound => {
                info!(%key, "Reversal target already resolved");
                self.publish(key, NoticeKind::AlreadyResolved, record.attempts)
                    .await;
                Disposition::Resolved
            }
            GatewayOutcome::Forbidden => {
                warn!(%key, attempts = record.attempts, "Reversal forbidden, will retry");
                self.retry_or_abandon(record, self.config.forbidden_retry)
                    .await
            }
            GatewayOutcome::RateLimited => {
                warn!(%key, attempts = record.attempts, "Reversal rate limited, backing off");
                self.retry_or_abandon(record, self.transient_backoff(record.attempts))
                    .await
            }
            GatewayOutcome::Failed(details) => {
                // Unexpected failures are retried rather than dropped; the
                // obligation outlives whatever went wrong here.
                error!(%key, attempts = record.attempts, error = %details, "Reversal failed unexpectedly, will retry");
                self.retry_or_abandon(record, self.config.forbidden_retry)
                    .await
            }
        }
    }

    fn transient_backoff(&self, attempts: u32) -> StdDuration {
        let factor = 2u32.saturating_pow(attempts.min(16));
        self.config
            .transient_backoff_base
            .saturating_mul(factor)
            .min(self.config.transient_backoff_cap)
    }

    async fn retry_or_abandon(&self, record: &ReversalRecord, delay: StdDuration) -> Disposition {
        if let Some(max) = self.config.max_attempts {
            if record.attempts + 1 >= max {
                error!(
                    key = %record.key,
                    attempts = record.attempts + 1,
                    "Retry ceiling reached, abandoning reversal"
                );
                self.publish(record.key, NoticeKind::Abandoned, record.attempts + 1)
                    .await;
                return Disposition::Resolved;
            }
        }

        let delay = chrono::Duration::from_std(delay)
            .unwrap_or_else(|_| chrono::Duration::seconds(3600));
        Disposition::Retry {
            execute_at: self.clock.now() + delay,
        }
    }

    async fn publish(&self, key: ReversalKey, outcome: NoticeKind, attempts: u32) {
        if let Some(tx) = &self.notices {
            let notice = ReversalNotice {
                key,
                outcome,
                attempts,
            };
            if tx.send(notice).await.is_err() {
                warn!(%key, "Notice receiver dropped, reversal notice lost");
            }
        }
    }
}
