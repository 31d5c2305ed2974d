use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use crate::clock::skew::DEFAULT_SKEW_THRESHOLD_SECS;
use crate::error::ErrorCode;
use crate::id::ReplicaId;

/// Environment variable that overrides `replica_id`.
pub const REPLICA_ID_ENV: &str = "ELGRAPH_REPLICA_ID";

/// Skew thresholds are capped at roughly a century.
const MAX_SKEW_THRESHOLD_SECS: u64 = 3_153_600_000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Fixed replica identity. A random one is drawn when absent.
    #[serde(default)]
    pub replica_id: Option<u64>,
    #[serde(default)]
    pub clock: ClockConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Remote stamps further than this from local wall time are logged.
    #[serde(default = "default_skew_threshold_secs")]
    pub skew_threshold_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            skew_threshold_secs: default_skew_threshold_secs(),
        }
    }
}

impl ReplicaConfig {
    /// The configured replica id, or a fresh random one.
    #[must_use]
    pub fn replica(&self) -> ReplicaId {
        self.replica_id.map_or_else(ReplicaId::random, ReplicaId)
    }

    #[must_use]
    pub fn skew_threshold(&self) -> Duration {
        let secs = self.clock.skew_threshold_secs.min(MAX_SKEW_THRESHOLD_SECS);
        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX / 1000))
    }
}

/// Load a replica config from a TOML file. A missing file yields defaults.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<ReplicaConfig> {
    if !path.exists() {
        return Ok(ReplicaConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<ReplicaConfig>(&content).with_context(|| {
        let code = ErrorCode::ConfigParseError;
        format!("{code}: {} in {}", code.message(), path.display())
    })
}

/// Load the config at `path` and apply environment overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or `ELGRAPH_REPLICA_ID`
/// is not an unsigned integer.
pub fn resolve_config(path: &Path) -> Result<ReplicaConfig> {
    let config = load_config(path)?;
    apply_replica_override(config, env::var(REPLICA_ID_ENV).ok())
}

fn apply_replica_override(
    mut config: ReplicaConfig,
    env_replica: Option<String>,
) -> Result<ReplicaConfig> {
    if let Some(raw) = env_replica {
        let id = raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{REPLICA_ID_ENV} must be an unsigned integer, got {raw:?}"))?;
        config.replica_id = Some(id);
    }
    Ok(config)
}

const fn default_skew_threshold_secs() -> u64 {
    DEFAULT_SKEW_THRESHOLD_SECS
}
