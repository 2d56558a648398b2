//! Reversal records and their lifecycle
//!
//! A record is the durable form of one pending reversal. The sweep claims a
//! record by moving it `Pending -> InFlight` before dispatching; depending on
//! the outcome it is either requeued (`InFlight -> Pending` with a new
//! `execute_at` and an incremented attempt count) or completed and deleted.
//! `InFlight` is a purely transient state and must never survive a restart.

use crate::scheduler::{ReversalKey, SchedulerError, SchedulerResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle states of a reversal record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ReversalStatus {
    /// Waiting for its execution time
    #[default]
    Pending,
    /// Claimed by a running sweep; never persisted
    InFlight,
    /// Reversal confirmed; the record is about to be deleted
    Done,
}

impl std::fmt::Display for ReversalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::InFlight => write!(f, "InFlight"),
            Self::Done => write!(f, "Done"),
        }
    }
}

/// One pending scheduled reversal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalRecord {
    /// Identity of the reversal
    pub key: ReversalKey,
    /// When the reversal should run. May be in the past (e.g. loaded after
    /// downtime); that means "run at the next opportunity", never a negative
    /// delay.
    pub execute_at: DateTime<Utc>,
    /// How many dispatches have failed so far
    pub attempts: u32,
    /// Current lifecycle state
    pub status: ReversalStatus,
    /// When the record was created
    pub created_at: DateTime<Utc>,
}

impl ReversalRecord {
    /// Create a new pending record
    #[must_use]
    pub fn new(key: ReversalKey, execute_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            key,
            execute_at,
            attempts: 0,
            status: ReversalStatus::Pending,
            created_at: now,
        }
    }

    /// Whether the record is due at `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ReversalStatus::Pending && self.execute_at <= now
    }

    /// Claim the record for dispatch
    ///
    /// # Errors
    /// Returns an error if the record is not `Pending`.
    pub fn begin_dispatch(&mut self) -> SchedulerResult<()> {
        if self.status != ReversalStatus::Pending {
            return Err(SchedulerError::InvalidStateTransition);
        }
        self.status = ReversalStatus::InFlight;
        Ok(())
    }

    /// Return a failed dispatch to the queue with a new execution time
    ///
    /// # Errors
    /// Returns an error if the record is not `InFlight`.
    pub fn requeue(&mut self, execute_at: DateTime<Utc>) -> SchedulerResult<()> {
        if self.status != ReversalStatus::InFlight {
            return Err(SchedulerError::InvalidStateTransition);
        }
        self.status = ReversalStatus::Pending;
        self.execute_at = execute_at;
        self.attempts += 1;
        Ok(())
    }

    /// Mark the reversal as confirmed
    ///
    /// # Errors
    /// Returns an error if the record is not `InFlight`.
    pub fn complete(&mut self) -> SchedulerResult<()> {
        if self.status != ReversalStatus::InFlight {
            return Err(SchedulerError::InvalidStateTransition);
        }
        self.status = ReversalStatus::Done;
        Ok(())
    }
}
