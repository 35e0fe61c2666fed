//! Storage backends for the proxy cache.
//!
//! The proxy requires a [`CacheBackend`] implementation to hold cache
//! records between requests. This module ships with:
//! - [`memory::InMemoryBackend`], a process-local map with no persistence,
//! - [`file::FileBackend`], a map mirrored to a single JSON file,
//! - [`redis::RedisBackend`], a distributed store with per-key write locks.
//!
//! One backend instance is selected from configuration at startup and held
//! for the process lifetime; [`from_config`] encodes the selection rule.

pub mod file;
pub mod memory;
pub mod redis;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::Config;
use crate::entry::CacheEntry;
use crate::error::CacheError;

/// Shared handle to the backend selected at startup.
pub type SharedBackend = Arc<dyn CacheBackend>;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Fetches a cached entry by key.
    ///
    /// Returns `Ok(None)` when the backend does not have a value (or, for
    /// the distributed backend, when it has expired server-side).
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Stores an entry under `key`, replacing any previous record wholesale.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;
}

/// Selects and constructs the backend named by the configuration.
///
/// A configured `REDIS_URL` picks the distributed backend; otherwise the
/// persisted-file backend is loaded from the configured cache file.
pub async fn from_config(config: &Config) -> Result<SharedBackend, CacheError> {
    if let Some(url) = &config.redis_url {
        let client = ::redis::Client::open(url.as_str())?;
        let manager = client.get_connection_manager().await?;
        info!("using redis cache");
        Ok(Arc::new(redis::RedisBackend::new(
            manager,
            config.max_cache_seconds,
        )))
    } else {
        info!(path = %config.cache_file().display(), "using local cache");
        Ok(Arc::new(file::FileBackend::load(config.cache_file()).await))
    }
}
