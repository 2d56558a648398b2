//! Reversal kinds and keys
//!
//! A key identifies one pending scheduled reversal: which guild, which user,
//! which kind of sanction to undo, and (for role grants) which role.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of reversal the scheduler will perform when a sanction expires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReversalKind {
    /// Clear a communication timeout
    Unmute,
    /// Lift a server ban
    Unban,
    /// Remove a temporarily granted role
    RemoveRole,
}

impl fmt::Display for ReversalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unmute => write!(f, "Unmute"),
            Self::Unban => write!(f, "Unban"),
            Self::RemoveRole => write!(f, "Remove Role"),
        }
    }
}

/// Identity of one pending reversal.
///
/// `role_id` is part of the identity: a user may hold several independent
/// timed role grants in the same guild at once. It is `None` for every kind
/// except `RemoveRole`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReversalKey {
    pub guild_id: u64,
    pub user_id: u64,
    pub kind: ReversalKind,
    pub role_id: Option<u64>,
}

impl ReversalKey {
    /// Key for clearing a user's mute in a guild
    #[must_use]
    pub fn unmute(guild_id: u64, user_id: u64) -> Self {
        Self {
            guild_id,
            user_id,
            kind: ReversalKind::Unmute,
            role_id: None,
        }
    }

    /// Key for lifting a user's ban in a guild
    #[must_use]
    pub fn unban(guild_id: u64, user_id: u64) -> Self {
        Self {
            guild_id,
            user_id,
            kind: ReversalKind::Unban,
            role_id: None,
        }
    }

    /// Key for removing a timed role grant
    #[must_use]
    pub fn remove_role(guild_id: u64, user_id: u64, role_id: u64) -> Self {
        Self {
            guild_id,
            user_id,
            kind: ReversalKind::RemoveRole,
            role_id: Some(role_id),
        }
    }
}

impl fmt::Display for ReversalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role_id {
            Some(role_id) => write!(
                f,
                "{} for user {} in guild {} (role {})",
                self.kind, self.user_id, self.guild_id, role_id
            ),
            None => write!(
                f,
                "{} for user {} in guild {}",
                self.kind, self.user_id, self.guild_id
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_constructors() {
        let key = ReversalKey::unmute(1, 2);
        assert_eq!(key.kind, ReversalKind::Unmute);
        assert_eq!(key.role_id, None);

        let key = ReversalKey::unban(1, 2);
        assert_eq!(key.kind, ReversalKind::Unban);
        assert_eq!(key.role_id, None);

        let key = ReversalKey::remove_role(1, 2, 3);
        assert_eq!(key.kind, ReversalKind::RemoveRole);
        assert_eq!(key.role_id, Some(3));
    }

    #[test]
    fn test_role_id_is_part_of_identity() {
        let a = ReversalKey::remove_role(1, 2, 10);
        let b = ReversalKey::remove_role(1, 2, 20);
        assert_ne!(a, b);

        let c = ReversalKey::remove_role(1, 2, 10);
        assert_eq!(a, c);
    }

    #[test]
    fn test_key_display() {
        let key = ReversalKey::unban(100, 200);
        assert_eq!(key.to_string(), "Unban for user 200 in guild 100");

        let key = ReversalKey::remove_role(100, 200, 300);
        assert_eq!(
            key.to_string(),
            "Remove Role for user 200 in guild 100 (role 300)"
        );
    }

    #[test]
    fn test_key_serialization_round_trip() {
        let key = ReversalKey::remove_role(1, 2, 3);
        let yaml = serde_yaml::to_string(&key).expect("serialize");
        let back: ReversalKey = serde_yaml::from_str(&yaml).expect("deserialize");
        assert_eq!(key, back);
    }
}
