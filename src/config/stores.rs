use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Registry document location.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegistryConfig {
    /// Primary registry file. Backup and temp files live beside it.
    /// TOML: `registry.path`. Default: `data/registry.json`.
    #[serde(default = "default_registry_path")]
    pub path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
        }
    }
}

/// Credential relay tuning.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Hard upper bound on a binding's lifetime, in seconds, for requests that never clear.
    /// TOML: `relay.binding_ttl_secs`. Default: `900`.
    #[serde(default = "default_binding_ttl_secs")]
    pub binding_ttl_secs: u64,

    /// Maximum number of simultaneously bound identities.
    /// TOML: `relay.max_bindings`. Default: `10000`.
    #[serde(default = "default_max_bindings")]
    pub max_bindings: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            binding_ttl_secs: default_binding_ttl_secs(),
            max_bindings: default_max_bindings(),
        }
    }
}

/// Session lifecycle settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    /// Active sessions idle for longer than this are moved to `expired`. `0` disables the sweep.
    /// TOML: `sessions.idle_expiry_secs`. Default: `86400`.
    #[serde(default = "default_idle_expiry_secs")]
    pub idle_expiry_secs: u64,

    /// Interval between expiry sweeps, in seconds.
    /// TOML: `sessions.sweep_interval_secs`. Default: `300`.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_expiry_secs: default_idle_expiry_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("data/registry.json")
}

fn default_binding_ttl_secs() -> u64 {
    900
}

fn default_max_bindings() -> u64 {
    10_000
}

fn default_idle_expiry_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    300
}
