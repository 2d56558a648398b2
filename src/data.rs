use std::{ops::Deref, sync::Arc};

use crate::scheduler::SchedulerService;
use dashmap::DashMap;
use poise::serenity_prelude as serenity;
use serde::{Deserialize, Serialize};
use serenity::prelude::TypeMapKey;

/// Where guild configurations are persisted
pub const GUILD_CONFIG_FILE: &str = "data/guild_configs.yaml";
/// Where pending reversals are persisted
pub const REVERSALS_FILE: &str = "data/reversals.yaml";

/// Guild configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuildConfig {
    // The ID of the guild
    pub guild_id: u64,
    // Channel where resolved and abandoned reversals are reported
    pub sanction_log_channel_id: Option<u64>,
}

/// Centralized data structure for the bot
#[derive(Clone)]
pub struct Data(pub Arc<DataInner>);

// Implement TypeMapKey for Data to allow storing it in Serenity's data map
impl TypeMapKey for Data {
    type Value = Data;
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("guild_configs", &self.guild_configs)
            .finish_non_exhaustive()
    }
}

impl Deref for Data {
    type Target = DataInner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Data {
    /// Create a new Data instance with empty guild configuration
    #[must_use]
    pub fn new(scheduler: SchedulerService) -> Self {
        Self(Arc::new(DataInner::new(scheduler)))
    }

    /// Load guild configuration from the YAML file
    pub async fn load(scheduler: SchedulerService) -> Self {
        Self(Arc::new(DataInner::load(scheduler).await))
    }

    /// Get the guild configuration for a specific guild
    #[must_use]
    pub fn get_guild_config(&self, guild_id: serenity::GuildId) -> Option<GuildConfig> {
        self.0
            .guild_configs
            .get(&guild_id)
            .map(|entry| entry.value().clone())
    }

    /// Set the sanction log channel for a guild and persist the change
    ///
    /// # Errors
    /// Returns an error when the configuration file cannot be written.
    pub async fn set_sanction_log_channel(
        &self,
        guild_id: serenity::GuildId,
        channel_id: u64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut config = self
            .get_guild_config(guild_id)
            .unwrap_or_else(|| GuildConfig {
                guild_id: guild_id.get(),
                ..Default::default()
            });
        config.sanction_log_channel_id = Some(channel_id);
        self.0.guild_configs.insert(guild_id, config);
        self.save().await
    }

    /// Save guild configuration to the YAML file
    ///
    /// # Errors
    /// See [`DataInner::save`].
    pub async fn save(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.save().await
    }
}

/// Main centralized data structure for the bot
pub struct DataInner {
    // Map of guild_id -> guild configuration
    pub guild_configs: DashMap<serenity::GuildId, GuildConfig>,
    // Handle to the reversal scheduler
    pub scheduler: SchedulerService,
}

impl DataInner {
    #[must_use]
    pub fn new(scheduler: SchedulerService) -> Self {
        Self {
            guild_configs: DashMap::new(),
            scheduler,
        }
    }

    /// Load guild configuration from the YAML file
    ///
    /// If the file doesn't exist, an empty configuration is used.
    pub async fn load(scheduler: SchedulerService) -> Self {
        let data = Self::new(scheduler);

        if let Ok(file_content) = tokio::fs::read_to_string(GUILD_CONFIG_FILE).await {
            if let Ok(configs) = serde_yaml::from_str::<Vec<GuildConfig>>(&file_content) {
                for config in configs {
                    let guild_id = serenity::GuildId::new(config.guild_id);
                    data.guild_configs.insert(guild_id, config);
                }
            }
        }

        data
    }

    /// Save guild configuration to the YAML file
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The data directory cannot be created
    /// - The guild configurations cannot be serialized to YAML
    /// - The YAML data cannot be written to the config file
    pub async fn save(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if let Some(parent) = std::path::Path::new(GUILD_CONFIG_FILE).parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let configs: Vec<GuildConfig> = self
            .guild_configs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let yaml = serde_yaml::to_string(&configs)?;
        tokio::fs::write(GUILD_CONFIG_FILE, yaml).await?;

        Ok(())
    }
}

/// Tests for the data module
#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{SchedulerConfig, SystemClock, YamlReversalStore};

    async fn scheduler() -> SchedulerService {
        let path = std::env::temp_dir().join(format!(
            "warden-daemon-data-test-{}.yaml",
            std::process::id()
        ));
        let store = Arc::new(YamlReversalStore::load(path).await);
        SchedulerService::new(store, Arc::new(SystemClock), SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_data_new() {
        let data = Data::new(scheduler().await);
        assert_eq!(data.guild_configs.len(), 0);
    }

    #[test]
    fn test_guild_config_default() {
        let config = GuildConfig::default();
        assert_eq!(config.guild_id, 0);
        assert!(config.sanction_log_channel_id.is_none());
    }

    #[test]
    fn test_guild_config_serialization() {
        let config = GuildConfig {
            guild_id: 12345,
            sanction_log_channel_id: Some(54321),
        };

        // Test serialization
        let serialized = serde_yaml::to_string(&config).expect("Failed to serialize");
        assert!(serialized.contains("guild_id: 12345"));
        assert!(serialized.contains("sanction_log_channel_id: 54321"));

        // Test deserialization
        let deserialized: GuildConfig =
            serde_yaml::from_str(&serialized).expect("Failed to deserialize");
        assert_eq!(deserialized.guild_id, 12345);
        assert_eq!(deserialized.sanction_log_channel_id, Some(54321));
    }

    #[tokio::test]
    async fn test_get_guild_config() {
        let data = Data::new(scheduler().await);
        let guild_id = serenity::GuildId::new(42);

        assert!(data.get_guild_config(guild_id).is_none());

        data.guild_configs.insert(
            guild_id,
            GuildConfig {
                guild_id: 42,
                sanction_log_channel_id: Some(7),
            },
        );

        let config = data.get_guild_config(guild_id).expect("config present");
        assert_eq!(config.sanction_log_channel_id, Some(7));
    }

    #[tokio::test]
    async fn test_data_debug_impl() {
        let data = Data::new(scheduler().await);
        let debug_output = format!("{data:?}");
        assert!(debug_output.contains("Data"));
        assert!(debug_output.contains("guild_configs"));
    }
}
