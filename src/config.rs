use nostr::RelayUrl;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::ConfigError;

/// Relay used when no relay is configured at all
pub const DEFAULT_RELAY: &str = "wss://relay.damus.io";

pub const DEFAULT_MAX_RELAYS: usize = 3;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 5_000;
pub const MAX_QUERY_TIMEOUT_MS: u64 = 300_000;

/// Configuration as stored in `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relays in priority order
    pub relays: Vec<String>,
    /// Relay every publish goes to
    pub active_relay: String,
    pub max_relays: usize,
    pub enable_deduplication: bool,
    pub query_timeout_ms: u64,
    /// Name of the preset overriding the relay settings above
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    pub presets: Vec<RelayPreset>,
}

/// A named bundle of relays and limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayPreset {
    pub name: String,
    pub relays: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_relay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_relays: Option<usize>,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Validate into a router snapshot, applying the selected preset
    pub fn router_config(&self) -> Result<RouterConfig, ConfigError> {
        match self.preset {
            Some(ref name) => self.preset_config(name),
            None => RouterConfig::from_parts(
                &self.relays,
                &self.active_relay,
                self.max_relays,
                self.enable_deduplication,
                self.query_timeout_ms,
            ),
        }
    }

    /// Validate the named preset into a router snapshot
    pub fn preset_config(&self, name: &str) -> Result<RouterConfig, ConfigError> {
        let preset = self
            .presets
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))?;

        RouterConfig::from_parts(
            &preset.relays,
            preset.active_relay.as_deref().unwrap_or(&self.active_relay),
            preset.max_relays.unwrap_or(self.max_relays),
            self.enable_deduplication,
            self.query_timeout_ms,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            relays: vec![
                "wss://relay.damus.io".to_string(),
                "wss://nos.lol".to_string(),
                "wss://relay.nostr.band".to_string(),
            ],
            active_relay: DEFAULT_RELAY.to_string(),
            max_relays: DEFAULT_MAX_RELAYS,
            enable_deduplication: true,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            preset: None,
            presets: vec![RelayPreset {
                name: "minimal".to_string(),
                relays: vec!["wss://nos.lol".to_string()],
                active_relay: Some("wss://nos.lol".to_string()),
                max_relays: Some(1),
            }],
        }
    }
}

/// Validated, immutable router settings.
///
/// Operations capture an `Arc` of this when they start, so replacing the
/// configuration never affects a call already in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    relays: Vec<RelayUrl>,
    active_relay: RelayUrl,
    max_relays: usize,
    enable_deduplication: bool,
    query_timeout: Duration,
}

impl RouterConfig {
    pub fn new(
        relays: Vec<RelayUrl>,
        active_relay: RelayUrl,
        max_relays: usize,
        enable_deduplication: bool,
        query_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        if max_relays == 0 {
            return Err(ConfigError::MaxRelays(max_relays));
        }

        let timeout_ms = query_timeout.as_millis();
        if timeout_ms == 0 || timeout_ms > u128::from(MAX_QUERY_TIMEOUT_MS) {
            return Err(ConfigError::QueryTimeout {
                value: u64::try_from(timeout_ms).unwrap_or(u64::MAX),
                max: MAX_QUERY_TIMEOUT_MS,
            });
        }

        Ok(Self {
            relays,
            active_relay,
            max_relays,
            enable_deduplication,
            query_timeout,
        })
    }

    /// Build from unvalidated values, as they come out of storage
    pub fn from_parts(
        relays: &[String],
        active_relay: &str,
        max_relays: usize,
        enable_deduplication: bool,
        query_timeout_ms: u64,
    ) -> Result<Self, ConfigError> {
        let relays = relays
            .iter()
            .map(|url| parse_relay_url(url))
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(
            relays,
            parse_relay_url(active_relay)?,
            max_relays,
            enable_deduplication,
            Duration::from_millis(query_timeout_ms),
        )
    }

    pub fn relays(&self) -> &[RelayUrl] {
        &self.relays
    }

    pub fn active_relay(&self) -> &RelayUrl {
        &self.active_relay
    }

    pub fn max_relays(&self) -> usize {
        self.max_relays
    }

    pub fn enable_deduplication(&self) -> bool {
        self.enable_deduplication
    }

    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Copy with deduplication switched on or off
    pub fn with_deduplication(mut self, enable: bool) -> Self {
        self.enable_deduplication = enable;
        self
    }
}

impl Default for RouterConfig {
    fn default() -> Self {
        // The hard-coded default is known to be valid
        let config = Config::default();
        let relays = config
            .relays
            .iter()
            .filter_map(|url| RelayUrl::parse(url).ok())
            .collect();
        let active_relay = RelayUrl::parse(DEFAULT_RELAY).expect("default relay url is valid");

        Self {
            relays,
            active_relay,
            max_relays: DEFAULT_MAX_RELAYS,
            enable_deduplication: true,
            query_timeout: Duration::from_millis(DEFAULT_QUERY_TIMEOUT_MS),
        }
    }
}

pub fn parse_relay_url(url: &str) -> Result<RelayUrl, ConfigError> {
    RelayUrl::parse(url.trim()).map_err(|e| ConfigError::InvalidRelayUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// Load and validate the router configuration, falling back to the default
/// configuration when the file is missing or invalid.
pub async fn load_router_config(path: impl AsRef<Path>) -> Arc<RouterConfig> {
    load_router_config_with_preset(path, None).await
}

/// Like [`load_router_config`], selecting `preset` instead of the preset
/// named in the file when given.
pub async fn load_router_config_with_preset(
    path: impl AsRef<Path>,
    preset: Option<&str>,
) -> Arc<RouterConfig> {
    let path = path.as_ref();

    let result = match Config::load(path).await {
        Ok(config) => match preset {
            Some(name) => config.preset_config(name),
            None => config.router_config(),
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(config) => {
            info!("[CONFIG] Loaded {} relays from {}", config.relays().len(), path.display());
            Arc::new(config)
        }
        Err(e) => {
            warn!("[CONFIG] Invalid configuration in {}, using defaults: {}", path.display(), e);
            Arc::new(RouterConfig::default())
        }
    }
}
