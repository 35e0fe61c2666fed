use async_trait::async_trait;
use dashmap::DashMap;

use super::CacheBackend;
use crate::entry::CacheEntry;
use crate::error::CacheError;

/// An in-memory [`CacheBackend`] with no persistence.
///
/// The map is unbounded and entries are never evicted. Concurrent writers
/// to the same key are last-writer-wins; there is no cross-writer
/// coordination, which makes this backend suitable for single-process
/// deployments (and for tests) only.
#[derive(Default)]
pub struct InMemoryBackend {
    store: DashMap<String, CacheEntry>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.store.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.store.insert(key.to_owned(), entry);
        Ok(())
    }
}
