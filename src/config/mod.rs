mod basic;
mod stores;

pub use basic::BasicConfig;
pub use stores::{RegistryConfig, RelayConfig, SessionsConfig};

use figment::{
    Figment,
    providers::{Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::LazyLock};

/// Application configuration managed by Figment.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    /// Core server configuration (see `basic` table in config.toml).
    #[serde(default)]
    pub basic: BasicConfig,

    /// Registry document location (see `registry` table).
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Credential relay tuning (see `relay` table).
    #[serde(default)]
    pub relay: RelayConfig,

    /// Session lifecycle settings (see `sessions` table).
    #[serde(default)]
    pub sessions: SessionsConfig,
}

const DEFAULT_CONFIG_FILE: &str = "config.toml";

impl Config {
    /// Builds a Figment that merges defaults and a config TOML file.
    pub fn figment() -> Figment {
        let figment = Figment::new().merge(Serialized::defaults(Config::default()));
        if PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            figment.merge(Toml::file(DEFAULT_CONFIG_FILE))
        } else {
            figment
        }
    }

    /// Loads configuration from the TOML file (with defaults) and validates required fields.
    pub fn from_toml() -> Self {
        if !PathBuf::from(DEFAULT_CONFIG_FILE).is_file() {
            panic!("config file not found: {}", DEFAULT_CONFIG_FILE);
        }
        let cfg: Self = Self::figment().extract().unwrap_or_else(|err| {
            panic!(
                "failed to extract configuration from {}: {err}",
                DEFAULT_CONFIG_FILE
            )
        });
        if cfg.basic.api_key.trim().is_empty() {
            panic!("basic.api_key must be set and non-empty");
        }
        cfg
    }
}

/// Global, lazily-initialized configuration instance. Panics on first access when
/// `config.toml` is missing or `basic.api_key` is empty.
pub static CONFIG: LazyLock<Config> = LazyLock::new(Config::from_toml);
