//! # Runtime Configuration Module
//!
//! Environment-driven tuning for the dispatch caches.
//!
//! ## Environment Variables
//!
//! ### `T2_RESOLUTION_CACHE_SIZE`
//!
//! Capacity of the resolution cache (`method ⧺ path` → pipeline). Accepts
//! decimal (`1024`) or hexadecimal (`0x400`). Default: `1024`.
//!
//! ### `T2_CONVENTION_CACHE_SIZE`
//!
//! Capacity of the convention cache (normalized path → controller/action).
//! Same format and default.
//!
//! ## Usage
//!
//! ```rust
//! use t2engine::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! assert!(config.resolution_cache_size > 0);
//! ```
//!
//! Each entry in the resolution cache pins a built middleware chain, so the
//! memory cost of a slot is roughly one `Arc` per middleware plus the handler.
//! Raising the limit only pays off for applications with many distinct paths.

use std::env;

use crate::cache::DEFAULT_CAPACITY;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Resolution cache capacity (default: 1024)
    pub resolution_cache_size: usize,
    /// Convention cache capacity (default: 1024)
    pub convention_cache_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            resolution_cache_size: DEFAULT_CAPACITY,
            convention_cache_size: DEFAULT_CAPACITY,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        RuntimeConfig {
            resolution_cache_size: size_var("T2_RESOLUTION_CACHE_SIZE"),
            convention_cache_size: size_var("T2_CONVENTION_CACHE_SIZE"),
        }
    }
}

fn size_var(name: &str) -> usize {
    match env::var(name) {
        Ok(val) => parse_size(&val).unwrap_or(DEFAULT_CAPACITY),
        Err(_) => DEFAULT_CAPACITY,
    }
}

fn parse_size(val: &str) -> Option<usize> {
    let val = val.trim();
    let parsed = if let Some(hex) = val.strip_prefix("0x") {
        usize::from_str_radix(hex, 16).ok()
    } else {
        val.parse().ok()
    };
    parsed.filter(|n| *n > 0)
}
