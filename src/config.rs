//! Configuration management
//!
//! Loads configuration from config.toml with support for:
//! - Discord application id and request signing key
//! - Loyalteez brand (tenant) and API location
//! - Reward event identifiers used by the built-in commands
//! - Guild configuration store backend
//!
//! Environment variables take precedence over file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::parse_public_key;
use crate::commands::RewardSettings;

const DEFAULT_CONFIG: &str = include_str!("../config.toml");

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub discord: DiscordConfig,
    pub loyalteez: LoyalteezConfig,
    pub rewards: RewardsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub permissions: PermissionsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Discord application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Application id, used to address follow-up webhooks
    #[serde(default)]
    pub application_id: String,
    /// Hex-encoded ed25519 public key from the developer portal
    #[serde(default)]
    pub public_key: String,
    #[serde(default = "default_discord_api_base")]
    pub api_base: String,
}

/// Loyalteez ledger settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyalteezConfig {
    /// Brand id (tenant wallet address)
    #[serde(default)]
    pub brand_id: String,
    #[serde(default = "default_loyalteez_api_base")]
    pub api_base: String,
}

/// Event identifiers and links used by the slash commands
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardsConfig {
    pub join_event: String,
    /// Used by /daily when a guild has no binding of its own
    pub default_daily_event: String,
    pub marketplace_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Guild configuration store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            path: default_store_path(),
        }
    }
}

/// Local permission checks for admin commands
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Require Administrator or Manage Server for /daily-config and /drop
    #[serde(default)]
    pub enforce_admin: bool,
}

fn default_discord_api_base() -> String {
    "https://discord.com/api/v10".to_string()
}

fn default_loyalteez_api_base() -> String {
    "https://api.loyalteez.app/loyalteez-api".to_string()
}

fn default_store_path() -> String {
    "loyalteez-discord.db".to_string()
}

impl Config {
    /// Load from config.toml or use defaults
    pub fn load() -> Result<Self> {
        Self::load_from("config.toml")
    }

    /// Load from specific path, then apply environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config: Config = if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            // Use embedded default config
            toml::from_str(DEFAULT_CONFIG).context("Failed to parse default config")?
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Overlay values from `lookup` (normally the process environment).
    /// Empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("DISCORD_PUBLIC_KEY") {
            self.discord.public_key = v;
        }
        if let Some(v) = get("DISCORD_APPLICATION_ID") {
            self.discord.application_id = v;
        }
        if let Some(v) = get("DISCORD_API_BASE") {
            self.discord.api_base = v;
        }
        if let Some(v) = get("BRAND_ID") {
            self.loyalteez.brand_id = v;
        }
        if let Some(v) = get("LOYALTEEZ_API_URL") {
            self.loyalteez.api_base = v;
        }
        if let Some(v) = get("DEFAULT_DAILY_EVENT") {
            self.rewards.default_daily_event = v;
        }
        if let Some(v) = get("STORE_PATH") {
            self.store.path = v;
            self.store.backend = StoreBackend::Sqlite;
        }
    }

    /// Fail closed on anything the gateway cannot run without
    pub fn validate(&self) -> Result<()> {
        if self.discord.public_key.trim().is_empty() {
            anyhow::bail!("Discord public key not configured. Set DISCORD_PUBLIC_KEY.");
        }
        parse_public_key(&self.discord.public_key).context("Invalid Discord public key")?;

        if self.discord.application_id.trim().is_empty() {
            anyhow::bail!("Discord application id not configured. Set DISCORD_APPLICATION_ID.");
        }
        if self.loyalteez.brand_id.trim().is_empty() {
            anyhow::bail!("Loyalteez brand id not configured. Set BRAND_ID.");
        }
        if self.rewards.default_daily_event.trim().is_empty() {
            anyhow::bail!("rewards.default_daily_event must not be empty");
        }
        Ok(())
    }

    pub fn reward_settings(&self) -> RewardSettings {
        RewardSettings {
            join_event: self.rewards.join_event.clone(),
            default_daily_event: self.rewards.default_daily_event.clone(),
            marketplace_url: self.rewards.marketplace_url.clone(),
            enforce_admin: self.permissions.enforce_admin,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        // The embedded default config ships with the crate; the fallback
        // only guards against it being edited into an unparsable state.
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|_| Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            discord: DiscordConfig {
                application_id: String::new(),
                public_key: String::new(),
                api_base: default_discord_api_base(),
            },
            loyalteez: LoyalteezConfig {
                brand_id: String::new(),
                api_base: default_loyalteez_api_base(),
            },
            rewards: RewardsConfig {
                join_event: "discord_join".to_string(),
                default_daily_event: "daily_checkin".to_string(),
                marketplace_url: "https://marketplace.loyalteez.xyz".to_string(),
            },
            store: StoreConfig::default(),
            permissions: PermissionsConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const TEST_KEY: &str = "d75a980182b10ab7d54bfed3c964073a0ee172f3daa62325af021a68f707511a";

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_embedded_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.rewards.join_event, "discord_join");
        assert_eq!(config.rewards.default_daily_event, "daily_checkin");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.permissions.enforce_admin);
    }

    #[test]
    fn test_defaults_fail_validation() {
        // No key, no brand: must not start
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("DISCORD_PUBLIC_KEY", TEST_KEY),
            ("DISCORD_APPLICATION_ID", "123"),
            ("BRAND_ID", "0xbrand"),
            ("STORE_PATH", "/tmp/guilds.db"),
            ("LOYALTEEZ_API_URL", ""),
        ]));

        assert_eq!(config.discord.public_key, TEST_KEY);
        assert_eq!(config.loyalteez.brand_id, "0xbrand");
        assert_eq!(config.store.backend, StoreBackend::Sqlite);
        // Empty values do not clobber the file
        assert_eq!(
            config.loyalteez.api_base,
            "https://api.loyalteez.app/loyalteez-api"
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_brand_id() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("DISCORD_PUBLIC_KEY", TEST_KEY),
            ("DISCORD_APPLICATION_ID", "123"),
        ]));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("brand id"));
    }

    #[test]
    fn test_validate_rejects_bad_key() {
        let mut config = Config::default();
        config.apply_overrides(env(&[
            ("DISCORD_PUBLIC_KEY", "not-hex"),
            ("DISCORD_APPLICATION_ID", "123"),
            ("BRAND_ID", "0xbrand"),
        ]));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reward_settings_carry_daily_default() {
        let mut config = Config::default();
        config.apply_overrides(env(&[("DEFAULT_DAILY_EVENT", "weekday_checkin")]));
        let settings = config.reward_settings();
        assert_eq!(settings.default_daily_event, "weekday_checkin");
        assert_eq!(settings.join_event, "discord_join");
    }
}
