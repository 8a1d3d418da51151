use std::path::Path;
use std::time::Duration;
use serde::Deserialize;
use anyhow::{ensure, Context, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// How `LookupServerByName` compares names. Both modes ignore case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameMatch {
    #[default]
    Exact,
    Substring,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// A server is expired once its last heartbeat is older than this
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,
    /// Defaults to a quarter of the heartbeat timeout
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
    #[serde(default)]
    pub name_match: NameMatch,
    /// Whether LookupServerByAddress resolves servers that went offline
    #[serde(default = "default_offline_lookup")]
    pub offline_lookup: bool,
    /// How long offline servers stay resolvable by address. 0 keeps them forever.
    #[serde(default = "default_offline_retention")]
    pub offline_retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
}

/// Upper bound for any configured duration (100 years)
const MAX_DURATION_SECS: u64 = 100 * 365 * 24 * 3600;

fn default_heartbeat_timeout() -> u64 {
    90
}

fn default_offline_lookup() -> bool {
    true
}

fn default_offline_retention() -> u64 {
    7 * 24 * 3600
}

fn default_listen() -> String {
    "0.0.0.0:8120".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            sweep_interval_secs: None,
            name_match: NameMatch::default(),
            offline_lookup: default_offline_lookup(),
            offline_retention_secs: default_offline_retention(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

impl RegistryConfig {
    pub fn heartbeat_timeout(&self) -> chrono::Duration {
        saturating_seconds(self.heartbeat_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        let secs = self
            .sweep_interval_secs
            .unwrap_or(self.heartbeat_timeout_secs / 4)
            .max(1);
        Duration::from_secs(secs)
    }

    pub fn offline_retention(&self) -> Option<chrono::Duration> {
        (self.offline_retention_secs > 0)
            .then(|| saturating_seconds(self.offline_retention_secs))
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.heartbeat_timeout_secs > 0,
            "registry.heartbeat_timeout_secs must be greater than zero"
        );
        ensure!(
            self.heartbeat_timeout_secs <= MAX_DURATION_SECS,
            "registry.heartbeat_timeout_secs must be at most {}",
            MAX_DURATION_SECS
        );
        ensure!(
            self.offline_retention_secs <= MAX_DURATION_SECS,
            "registry.offline_retention_secs must be at most {}",
            MAX_DURATION_SECS
        );
        if let Some(interval) = self.sweep_interval_secs {
            ensure!(interval > 0, "registry.sweep_interval_secs must be greater than zero");
            ensure!(
                interval < self.heartbeat_timeout_secs,
                "registry.sweep_interval_secs ({}) must be shorter than the heartbeat timeout ({})",
                interval,
                self.heartbeat_timeout_secs
            );
        }
        Ok(())
    }
}

// Out-of-range values clamp instead of panicking inside the sweeper
fn saturating_seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.registry.validate()?;
        Ok(config)
    }
}
