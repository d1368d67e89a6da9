//! RON configuration for the todo demo

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tether_core::DispatcherConfig;
use thiserror::Error;

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoConfig {
    /// Dispatcher settings
    pub dispatcher: DispatcherConfig,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: Option<String>,
    /// Delay before a deferred completion lands
    pub complete_after_ms: u64,
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            log_filter: None,
            complete_after_ms: 250,
        }
    }
}

impl TodoConfig {
    /// Load configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from RON text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(ron::from_str(content)?)
    }
}

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),
}
