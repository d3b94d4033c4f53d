// src/storage/idempotency.rs
//! Idempotency cache keyed by partner-supplied external ids.
//!
//! A key lives until the next local midnight, so an external id can be used
//! once per calendar day. The pipeline reserves a key after the request's
//! signature has verified and releases it again when the response turns
//! out to be a server error.

use crate::models::error::SnapError;
use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

/// Errors a backing store can report.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key is already present.
    #[error("key already exists")]
    Conflict,

    #[error("idempotency backend failure: {0}")]
    Backend(String),
}

/// Capability surface of an idempotency backend.
///
/// `add` must be a single atomic add-if-absent; a read followed by a write
/// is not acceptable because several instances may share the backend.
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Stores `key` for `ttl`, failing with [`StoreError::Conflict`] if it
    /// already exists.
    async fn add(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;
}

/// Which backend to construct at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    /// In-process map. Single instance only; keys are lost on restart.
    #[default]
    Memory,
    /// Shared networked store (requires the `redis` cargo feature).
    Redis,
}

/// Seconds from `now` until the next midnight in `now`'s timezone, never
/// less than one.
pub fn seconds_until_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> u64 {
    let tomorrow = now.date_naive().checked_add_days(Days::new(1));
    let midnight = tomorrow
        .map(|day| day.and_time(NaiveTime::MIN))
        .and_then(|naive| now.timezone().from_local_datetime(&naive).earliest());

    match midnight {
        Some(midnight) => {
            let remaining = midnight.signed_duration_since(now.clone()).num_seconds();
            u64::try_from(remaining).unwrap_or(0).max(1)
        }
        // Midnight skipped by a DST transition: fall back to a full day.
        None => 86_400,
    }
}

/// The cache as the pipeline sees it: namespacing, TTL policy and the
/// mapping from store errors onto the error taxonomy.
#[derive(Clone)]
pub struct IdempotencyCache {
    store: Arc<dyn IdempotencyStore>,
    namespace: String,
    timeout: Duration,
}

impl IdempotencyCache {
    pub fn new(store: Arc<dyn IdempotencyStore>, namespace: impl Into<String>, timeout: Duration) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            timeout,
        }
    }

    /// Stored key for one partner's external id.
    pub fn key(&self, partner_id: &str, external_id: &str) -> String {
        format!("{}:{}:{}", self.namespace, partner_id, external_id)
    }

    /// Reserves `key` until local midnight.
    ///
    /// The store call runs on its own task so a dropped request cannot
    /// cancel it half way; the wait for it is bounded by the configured
    /// timeout. When the wait runs out the add keeps going, and a detached
    /// task deletes the key if that late add turns out to have written it.
    /// A late conflict means another request owns the key and it is left
    /// alone.
    ///
    /// # Errors
    /// - `TransactionConflict` when the key already exists
    /// - `TimeOut` when the store does not answer in time
    /// - `InternalServerError` for any other backend failure
    pub async fn reserve(&self, key: &str) -> Result<(), SnapError> {
        let ttl = Duration::from_secs(seconds_until_midnight(&Local::now()));
        let store = Arc::clone(&self.store);
        let owned_key = key.to_string();
        let mut task = tokio::spawn(async move { store.add(&owned_key, ttl).await });

        match tokio::time::timeout(self.timeout, &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(StoreError::Conflict))) => Err(SnapError::TransactionConflict),
            Ok(Ok(Err(StoreError::Backend(reason)))) => Err(SnapError::InternalServerError(reason)),
            Ok(Err(join_error)) => Err(SnapError::InternalServerError(join_error.to_string())),
            Err(_) => {
                self.release_late_add(key, task);
                Err(SnapError::TimeOut)
            }
        }
    }

    fn release_late_add(&self, key: &str, task: JoinHandle<Result<(), StoreError>>) {
        let store = Arc::clone(&self.store);
        let key = key.to_string();
        tokio::spawn(async move {
            match task.await {
                Ok(Ok(())) => match store.delete(&key).await {
                    Ok(()) => log::debug!("released late idempotency key {}", key),
                    Err(e) => log::warn!("failed to release late idempotency key {}: {}", key, e),
                },
                Ok(Err(e)) => log::debug!("late add of idempotency key {} did not write: {}", key, e),
                Err(e) => log::warn!("late add of idempotency key {} aborted: {}", key, e),
            }
        });
    }

    /// Releases `key`. Best effort: failures are logged and swallowed.
    pub async fn release(&self, key: &str) {
        match tokio::time::timeout(self.timeout, self.store.delete(key)).await {
            Ok(Ok(())) => log::debug!("released idempotency key {}", key),
            Ok(Err(e)) => log::warn!("failed to release idempotency key {}: {}", key, e),
            Err(_) => log::warn!("timed out releasing idempotency key {}", key),
        }
    }

    pub async fn exists(&self, key: &str) -> Result<bool, SnapError> {
        match tokio::time::timeout(self.timeout, self.store.exists(key)).await {
            Ok(result) => result.map_err(|e| SnapError::InternalServerError(e.to_string())),
            Err(_) => Err(SnapError::TimeOut),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;
    use chrono::{FixedOffset, NaiveDate};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StalledStore;

    #[async_trait]
    impl IdempotencyStore for StalledStore {
        async fn add(&self, _key: &str, _ttl: Duration) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection reset".to_string()))
        }

        async fn exists(&self, _key: &str) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    /// Memory store whose first `add` answers only after `delay`.
    struct SlowFirstAdd {
        inner: MemoryStore,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl SlowFirstAdd {
        fn new(delay: Duration) -> Self {
            Self {
                inner: MemoryStore::new(),
                delay,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl IdempotencyStore for SlowFirstAdd {
        async fn add(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.add(key, ttl).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }

        async fn exists(&self, key: &str) -> Result<bool, StoreError> {
            self.inner.exists(key).await
        }
    }

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(7 * 3600).unwrap();
        let naive = NaiveDate::from_ymd_opt(2025, 2, 1)
            .unwrap()
            .and_hms_opt(hour, min, sec)
            .unwrap();
        offset.from_local_datetime(&naive).unwrap()
    }

    #[test]
    fn test_seconds_until_midnight() {
        assert_eq!(seconds_until_midnight(&at(15, 30, 32)), 30_568);
        assert_eq!(seconds_until_midnight(&at(0, 0, 0)), 86_400);
        assert_eq!(seconds_until_midnight(&at(23, 59, 59)), 1);
    }

    #[test]
    fn test_ttl_never_exceeds_a_day() {
        let ttl = seconds_until_midnight(&Local::now());
        assert!((1..=86_400).contains(&ttl));
    }

    #[tokio::test]
    async fn test_reserve_conflict_release_cycle() {
        let cache = IdempotencyCache::new(Arc::new(MemoryStore::new()), "snap", Duration::from_secs(1));
        let key = cache.key("PARTNER01", "ext-1");
        assert_eq!(key, "snap:PARTNER01:ext-1");

        cache.reserve(&key).await.unwrap();
        assert!(matches!(cache.reserve(&key).await, Err(SnapError::TransactionConflict)));
        assert!(cache.exists(&key).await.unwrap());

        cache.release(&key).await;
        assert!(!cache.exists(&key).await.unwrap());
        cache.reserve(&key).await.unwrap();
    }

    #[tokio::test]
    async fn test_partners_do_not_share_keys() {
        let cache = IdempotencyCache::new(Arc::new(MemoryStore::new()), "snap", Duration::from_secs(1));
        cache.reserve(&cache.key("PARTNER01", "abc123")).await.unwrap();
        cache.reserve(&cache.key("PARTNER02", "abc123")).await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_store_times_out() {
        let cache = IdempotencyCache::new(Arc::new(StalledStore), "snap", Duration::from_millis(20));
        assert!(matches!(cache.reserve("snap:P:x").await, Err(SnapError::TimeOut)));
        // release swallows the backend error
        cache.release("snap:P:x").await;
    }

    #[tokio::test]
    async fn test_late_add_after_timeout_is_released() {
        let store = Arc::new(SlowFirstAdd::new(Duration::from_millis(100)));
        let cache = IdempotencyCache::new(store.clone(), "snap", Duration::from_millis(20));
        let key = cache.key("PARTNER01", "abc123");

        assert!(matches!(cache.reserve(&key).await, Err(SnapError::TimeOut)));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!store.inner.exists(&key).await.unwrap());
        tokio_test::assert_ok!(cache.reserve(&key).await);
    }

    #[tokio::test]
    async fn test_late_conflict_keeps_the_winners_key() {
        let store = Arc::new(SlowFirstAdd::new(Duration::from_millis(100)));
        let cache = IdempotencyCache::new(store.clone(), "snap", Duration::from_millis(20));
        let key = cache.key("PARTNER01", "abc123");

        assert!(matches!(cache.reserve(&key).await, Err(SnapError::TimeOut)));
        // The second add is fast and wins before the first one lands.
        store.inner.add(&key, Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(store.inner.exists(&key).await.unwrap());
    }
}
