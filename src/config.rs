use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Settings shared by the bootstrap, collector and dispatcher binaries.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Account identifiers (phone numbers), in rotation order.
    pub accounts: Vec<String>,
    pub api_id: i32,
    pub api_hash: String,
    pub group_source: String,
    pub group_target: String,
    pub members_to_add: usize,
    /// Inclusive bounds, in seconds, of the pause after each successful add.
    pub min_delay: u64,
    pub max_delay: u64,
    pub max_adds_per_day_per_account: u32,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        Self::parse(&data)
    }

    pub fn parse(data: &str) -> Result<Self, ConfigError> {
        let config = serde_json::from_str::<Config>(data)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::Invalid("`accounts` must not be empty".into()));
        }
        if self.api_hash.trim().is_empty() {
            return Err(ConfigError::Invalid("`api_hash` must not be empty".into()));
        }
        if self.min_delay > self.max_delay {
            return Err(ConfigError::Invalid(format!(
                "`min_delay` ({}) exceeds `max_delay` ({})",
                self.min_delay, self.max_delay
            )));
        }
        Ok(())
    }
}
