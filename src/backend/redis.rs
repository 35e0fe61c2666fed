use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use tokio::sync::Mutex;
use tracing::{debug, error};
use uuid::Uuid;

use super::CacheBackend;
use crate::entry::CacheEntry;
use crate::error::CacheError;

/// How long a writer will wait to acquire a key's write lock.
const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(6);
/// How long an acquired lock is held before the server expires it.
const DEFAULT_LOCK_HOLD: Duration = Duration::from_secs(2);
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Released only by the writer that acquired it; the token check prevents
/// deleting a lock that already expired and was re-acquired by another writer.
const RELEASE_LOCK_SCRIPT: &str =
    "if redis.call('get', KEYS[1]) == ARGV[1] then return redis.call('del', KEYS[1]) else return 0 end";

/// A distributed [`CacheBackend`] shared across proxy processes.
///
/// Every `set` runs under a per-key mutual-exclusion lock with a bounded
/// acquire wait and a bounded hold. A writer that cannot acquire the lock in
/// time skips its write and logs; the loss is never surfaced to the caller
/// and never retried. Entries are written with a server-side expiry equal to
/// the configured max age (no expiry when the max age is 0).
pub struct RedisBackend {
    connection: Arc<Mutex<ConnectionManager>>,
    ttl_seconds: u64,
    lock_wait: Duration,
    lock_hold: Duration,
}

impl RedisBackend {
    pub fn new(connection: ConnectionManager, ttl_seconds: u64) -> Self {
        Self {
            connection: Arc::new(Mutex::new(connection)),
            ttl_seconds,
            lock_wait: DEFAULT_LOCK_WAIT,
            lock_hold: DEFAULT_LOCK_HOLD,
        }
    }

    /// Overrides the lock acquire wait and hold windows.
    pub fn with_lock_timing(mut self, wait: Duration, hold: Duration) -> Self {
        self.lock_wait = wait;
        self.lock_hold = hold;
        self
    }

    fn lock_key(key: &str) -> String {
        format!("lock__{key}")
    }

    /// Polls `SET NX PX` until the lock is taken or the wait is exhausted.
    async fn acquire_lock(&self, lock_key: &str, token: &str) -> Result<bool, CacheError> {
        let deadline = tokio::time::Instant::now() + self.lock_wait;
        loop {
            let acquired: Option<String> = {
                let mut conn = self.connection.lock().await;
                redis::cmd("SET")
                    .arg(lock_key)
                    .arg(token)
                    .arg("NX")
                    .arg("PX")
                    .arg(self.lock_hold.as_millis() as u64)
                    .query_async(&mut *conn)
                    .await?
            };
            if acquired.is_some() {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
        }
    }

    async fn release_lock(&self, lock_key: &str, token: &str) {
        let mut conn = self.connection.lock().await;
        let released = Script::new(RELEASE_LOCK_SCRIPT)
            .key(lock_key)
            .arg(token)
            .invoke_async::<i64>(&mut *conn)
            .await;
        if let Err(err) = released {
            debug!(lock_key, error = %err, "could not release write lock");
        }
    }

    async fn write(&self, key: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let payload = entry.to_json()?;
        let mut conn = self.connection.lock().await;
        if self.ttl_seconds > 0 {
            let _: () = conn.set_ex(key, payload, self.ttl_seconds).await?;
        } else {
            let _: () = conn.set(key, payload).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let data: Option<Vec<u8>> = {
            let mut conn = self.connection.lock().await;
            conn.get(key).await?
        };
        data.map(|bytes| CacheEntry::from_json(&bytes)).transpose()
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        let lock_key = Self::lock_key(key);
        let token = Uuid::new_v4().to_string();

        if !self.acquire_lock(&lock_key, &token).await? {
            error!(key, "failed to acquire lock for key, skipping cache write");
            return Ok(());
        }

        let result = self.write(key, &entry).await;
        self.release_lock(&lock_key, &token).await;
        result
    }
}
