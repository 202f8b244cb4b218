//! Configuration for the transaction limiter.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::{Result, TollgateError};

/// Transaction limiting configuration, one parameter set per class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TollgateConfig {
    /// Limits applied to every transaction
    #[serde(default)]
    pub general: ClassLimitConfig,

    /// Limits for the backend's general API calls
    #[serde(default)]
    pub api_general: ClassLimitConfig,

    /// Limits for the backend's upload calls
    #[serde(default)]
    pub upload: ClassLimitConfig,
}

impl Default for TollgateConfig {
    fn default() -> Self {
        Self {
            general: ClassLimitConfig::default(),
            api_general: ClassLimitConfig::default(),
            upload: ClassLimitConfig::default(),
        }
    }
}

/// Rate and burst parameters for a single transaction class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassLimitConfig {
    /// Transactions per second; zero or negative leaves the class
    /// unthrottled
    #[serde(default)]
    pub rate: f64,

    /// Bucket capacity; coerced to at least 1 when the class is enabled
    #[serde(default = "default_burst")]
    pub burst: i32,
}

impl Default for ClassLimitConfig {
    fn default() -> Self {
        Self {
            rate: 0.0,
            burst: default_burst(),
        }
    }
}

fn default_burst() -> i32 {
    1
}

impl TollgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading transaction limit configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| {
            TollgateError::Config(format!("Failed to parse transaction limit config: {}", e))
        })
    }
}
