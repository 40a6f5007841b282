use std::env;
use std::path::{Path, PathBuf};

use guestmemo_cache::CacheOptions;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MEMOIZE_ENV: &str = "GUESTMEMO_MEMOIZE";
pub const INITIAL_CAPACITY_ENV: &str = "GUESTMEMO_INITIAL_CAPACITY";
pub const SHARDS_ENV: &str = "GUESTMEMO_SHARDS";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value `{value}` for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[cfg(feature = "toml-config")]
    #[error("failed to parse config file {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("config file {} requires the `toml-config` feature", .path.display())]
    TomlDisabled { path: PathBuf },
}

/// Settings for one cache scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoConfig {
    /// When false every memoized call goes straight to the guest. Handles
    /// are still interned.
    pub memoize: bool,
    pub cache: CacheOptions,
}

impl Default for MemoConfig {
    fn default() -> Self {
        Self {
            memoize: true,
            cache: CacheOptions::default(),
        }
    }
}

impl MemoConfig {
    /// Defaults, then an optional TOML file, then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "toml-config")]
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::from_toml_file(path)
    }

    #[cfg(not(feature = "toml-config"))]
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Err(ConfigError::TomlDisabled {
            path: path.to_path_buf(),
        })
    }

    #[cfg(feature = "toml-config")]
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(|key| env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps a variable name to its
    /// value. Unset variables leave the current value alone.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(MEMOIZE_ENV) {
            self.memoize = parse_flag(MEMOIZE_ENV, &value)?;
        }
        if let Some(value) = lookup(INITIAL_CAPACITY_ENV) {
            self.cache.initial_capacity = parse_count(INITIAL_CAPACITY_ENV, &value)?;
        }
        if let Some(value) = lookup(SHARDS_ENV) {
            self.cache.shard_amount = Some(parse_count(SHARDS_ENV, &value)?);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.cache.shard_amount {
            Some(shards) if !CacheOptions::shard_amount_is_valid(shards) => {
                Err(ConfigError::InvalidValue {
                    key: "cache.shard_amount",
                    value: shards.to_string(),
                    reason: "must be a power of two greater than one",
                })
            }
            _ => Ok(()),
        }
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a boolean",
        }),
    }
}

fn parse_count(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
            reason: "expected a non-negative integer",
        })
}
