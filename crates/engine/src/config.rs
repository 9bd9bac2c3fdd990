//! Engine configuration loaded from environment variables.

use serde::Deserialize;
use std::time::Duration;

/// Engine limits and defaults loaded from environment variables.
///
/// Environment variables are prefixed with `FORMLOOM_`:
/// - `FORMLOOM_BLOCK_TIMEOUT_MS`: Default transform-block time budget (default: 2000)
/// - `FORMLOOM_MAX_BLOCK_TIMEOUT_MS`: Upper bound for per-block overrides (default: 10000)
/// - `FORMLOOM_SCRIPT_MAX_OPERATIONS`: Script interpreter operation cap (default: 1000000)
/// - `FORMLOOM_CONNECTION_CACHE_TTL_SECS`: Connection cache entry lifetime (default: 300)
/// - `FORMLOOM_CONNECTION_CACHE_CAPACITY`: Connection cache entry limit (default: 256)
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Default transform-block time budget in milliseconds
    #[serde(default = "default_block_timeout_ms")]
    pub block_timeout_ms: u64,

    /// Upper bound for per-block timeout overrides in milliseconds
    #[serde(default = "default_max_block_timeout_ms")]
    pub max_block_timeout_ms: u64,

    /// Operation cap for a single script evaluation
    #[serde(default = "default_script_max_operations")]
    pub script_max_operations: u64,

    /// Connection cache entry lifetime in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub connection_cache_ttl_secs: u64,

    /// Connection cache entry limit
    #[serde(default = "default_cache_capacity")]
    pub connection_cache_capacity: usize,
}

fn default_block_timeout_ms() -> u64 {
    2_000
}

fn default_max_block_timeout_ms() -> u64 {
    10_000
}

fn default_script_max_operations() -> u64 {
    1_000_000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_cache_capacity() -> usize {
    256
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables are prefixed with `FORMLOOM_`.
    pub fn from_env() -> Result<Self, envy::Error> {
        envy::prefixed("FORMLOOM_").from_env::<EngineConfig>()
    }

    /// Effective time budget for one transform block.
    ///
    /// Per-block overrides are clamped to `max_block_timeout_ms`; a zero
    /// override falls back to the default.
    pub fn block_timeout(&self, override_ms: Option<u64>) -> Duration {
        let ms = match override_ms {
            Some(0) | None => self.block_timeout_ms,
            Some(ms) => ms.min(self.max_block_timeout_ms),
        };
        Duration::from_millis(ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_timeout_ms: default_block_timeout_ms(),
            max_block_timeout_ms: default_max_block_timeout_ms(),
            script_max_operations: default_script_max_operations(),
            connection_cache_ttl_secs: default_cache_ttl_secs(),
            connection_cache_capacity: default_cache_capacity(),
        }
    }
}
