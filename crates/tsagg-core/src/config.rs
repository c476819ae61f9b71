//! Engine configuration
//!
//! Loaded from YAML; every section falls back to its defaults when omitted.
//!
//! ```yaml
//! pool:
//!   enabled: true
//!   max_arrays_per_capacity: 64
//! aggregation:
//!   max_groups: 10000
//! ```

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Complete engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Float array pool configuration
    pub pool: PoolSettings,
    /// Aggregation limits
    pub aggregation: AggregationSettings,
}

/// Float array pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Keep released arrays for reuse
    pub enabled: bool,
    /// Upper bound of free arrays kept per capacity
    pub max_arrays_per_capacity: usize,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_arrays_per_capacity: 64,
        }
    }
}

/// Aggregation settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationSettings {
    /// Maximum number of distinct groups per query, 0 for unlimited
    pub max_groups: usize,
}

impl EngineConfig {
    /// Parse configuration from a YAML string
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: EngineConfig = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::Configuration(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_yaml(&content)?;
        tracing::debug!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Serialize to YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}
