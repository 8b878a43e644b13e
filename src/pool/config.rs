// src/pool/config.rs
//! Pool configuration.

use crate::block::{MAX_POOL, USAGE_WINDOW};
use std::time::Duration;

/// Tunable pool parameters.
///
/// The defaults mirror the compile-time constants; most deployments only
/// ever toggle [`managed`](Self::managed), usually through the
/// `MANAGED_POOL` environment variable via [`PoolConfig::from_env`].
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Largest request served from the size-class bins. Bigger requests
    /// bypass the cache and are tracked only in the handle registry.
    pub max_pool: usize,
    /// Historic usage samples retained per class for age-weighted
    /// reclamation.
    pub usage_window: usize,
    /// Background reclaimer delay after a scan that observed activity.
    pub min_delay: Duration,
    /// Ceiling for the reclaimer's exponential back-off when idle.
    pub max_delay: Duration,
    /// Whether to spawn the background reclaimer. When false the pool is a
    /// pure cache: eviction happens only under allocation pressure.
    pub managed: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_pool: MAX_POOL,
            usage_window: USAGE_WINDOW,
            min_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            managed: true,
        }
    }
}

impl PoolConfig {
    /// Builds the default configuration with [`managed`](Self::managed)
    /// taken from the `MANAGED_POOL` environment variable.
    ///
    /// Unset, or any value other than `0` / `false` / `off`
    /// (case-insensitive), means the background reclaimer is enabled.
    pub fn from_env() -> Self {
        Self {
            managed: env_flag("MANAGED_POOL", true),
            ..Self::default()
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(value) => !matches!(value.to_ascii_lowercase().as_str(), "0" | "false" | "off"),
        Err(_) => default,
    }
}
