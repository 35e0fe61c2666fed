use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{error, info, warn};

use super::CacheBackend;
use crate::entry::{CacheEntry, EncodedEntry};
use crate::error::CacheError;

/// A [`CacheBackend`] that mirrors an in-memory map to a single file.
///
/// Every `set` rewrites the whole file, one JSON document mapping cache key
/// to the encoded entry tuple. The layout is stable across restarts so a
/// warm cache survives a process restart.
///
/// Not safe under concurrent writer processes: simultaneous rewrites race
/// and the last writer wins.
pub struct FileBackend {
    path: PathBuf,
    store: DashMap<String, CacheEntry>,
}

impl FileBackend {
    /// Loads the backend from `path`.
    ///
    /// A missing file means a cold start. An unreadable or unparseable file
    /// is discarded and replaced with a fresh empty document; startup never
    /// fails because of the cache.
    pub async fn load(path: PathBuf) -> Self {
        let backend = Self {
            path,
            store: DashMap::new(),
        };

        match tokio::fs::read(&backend.path).await {
            Ok(bytes) => match parse_document(&bytes) {
                Ok(entries) => {
                    for (key, entry) in entries {
                        backend.store.insert(key, entry);
                    }
                }
                Err(err) => {
                    error!(error = %err, "could not load cache, removing and recreating");
                    if let Err(err) = backend.save().await {
                        error!(error = %err, "could not recreate cache file");
                    }
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                warn!("no existing cache detected, will create one");
            }
            Err(err) => {
                error!(error = %err, "could not read cache file, starting empty");
            }
        }

        info!(entries = backend.store.len(), "cache prepopulated");
        backend
    }

    async fn save(&self) -> Result<(), CacheError> {
        let document: BTreeMap<String, EncodedEntry> = self
            .store
            .iter()
            .map(|item| (item.key().clone(), item.value().encode()))
            .collect();
        let bytes =
            serde_json::to_vec(&document).map_err(|err| CacheError::Codec(err.to_string()))?;
        tokio::fs::write(&self.path, bytes).await?;
        Ok(())
    }
}

fn parse_document(bytes: &[u8]) -> Result<Vec<(String, CacheEntry)>, CacheError> {
    let document: BTreeMap<String, EncodedEntry> =
        serde_json::from_slice(bytes).map_err(|err| CacheError::Codec(err.to_string()))?;
    document
        .into_iter()
        .map(|(key, record)| Ok((key, CacheEntry::decode(record)?)))
        .collect()
}

#[async_trait]
impl CacheBackend for FileBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.store.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        self.store.insert(key.to_owned(), entry);
        if let Err(err) = self.save().await {
            error!(error = %err, "could not save cache, dumping store and regenerating");
            self.store.clear();
            self.save().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(url: &str) -> CacheEntry {
        CacheEntry {
            url: url.to_owned(),
            headers: BTreeMap::from([("content-type".to_owned(), "text/plain".to_owned())]),
            etag: Some("v1".to_owned()),
            expires: None,
            last_modified: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let backend = FileBackend::load(dir.path().join("proxy.cache")).await;
        assert!(backend.get("anything").await.expect("get succeeds").is_none());
    }

    #[tokio::test]
    async fn entries_survive_a_reload() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("proxy.cache");

        let backend = FileBackend::load(path.clone()).await;
        let stored = entry("http://a.test/");
        backend
            .set("http://a.test/", stored.clone())
            .await
            .expect("set succeeds");

        let reloaded = FileBackend::load(path).await;
        let found = reloaded
            .get("http://a.test/")
            .await
            .expect("get succeeds")
            .expect("entry survived restart");
        assert_eq!(found, stored);
    }

    #[tokio::test]
    async fn corrupt_file_is_discarded_and_rewritten() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("proxy.cache");
        tokio::fs::write(&path, b"{ not json").await.expect("write garbage");

        let backend = FileBackend::load(path.clone()).await;
        assert!(backend.get("anything").await.expect("get succeeds").is_none());

        // The rewritten file parses as an empty document.
        let bytes = tokio::fs::read(&path).await.expect("file recreated");
        assert!(parse_document(&bytes).expect("valid document").is_empty());
    }

    #[tokio::test]
    async fn set_rewrites_the_whole_document() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("proxy.cache");

        let backend = FileBackend::load(path.clone()).await;
        backend.set("a", entry("http://a.test/")).await.expect("set succeeds");
        backend.set("b", entry("http://b.test/")).await.expect("set succeeds");

        let bytes = tokio::fs::read(&path).await.expect("file exists");
        let document = parse_document(&bytes).expect("valid document");
        assert_eq!(document.len(), 2);
    }
}
