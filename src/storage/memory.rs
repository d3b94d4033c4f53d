// src/storage/memory.rs
//! In-process idempotency backend.
//!
//! Keys live in a `HashMap` guarded by a mutex, with their expiry instant as
//! the value. A second index ordered by expiry lets every `add` drop the keys
//! that have run out, so the map only holds live keys plus whatever expired
//! since the last write. State is lost on restart and never shared between
//! instances.

use crate::storage::idempotency::{IdempotencyStore, StoreError};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Entries {
    expiries: HashMap<String, Instant>,
    // Mirrors `expiries`, ordered by expiry.
    by_expiry: BTreeSet<(Instant, String)>,
}

impl Entries {
    fn insert(&mut self, key: &str, expiry: Instant) {
        if let Some(previous) = self.expiries.insert(key.to_string(), expiry) {
            self.by_expiry.remove(&(previous, key.to_string()));
        }
        self.by_expiry.insert((expiry, key.to_string()));
    }

    fn remove(&mut self, key: &str) {
        if let Some(expiry) = self.expiries.remove(key) {
            self.by_expiry.remove(&(expiry, key.to_string()));
        }
    }

    fn purge_expired(&mut self, now: Instant) {
        while let Some((expiry, _)) = self.by_expiry.first() {
            if *expiry > now {
                break;
            }
            if let Some((_, key)) = self.by_expiry.pop_first() {
                self.expiries.remove(&key);
            }
        }
    }
}

#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        log::warn!("using the in-process idempotency store; keys are lost on restart and not shared between instances");
        MemoryStore {
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().expiries.values().filter(|expiry| **expiry > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // A poisoned map is still a consistent map: the two indexes are updated
    // together with no await or fallible call in between.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryStore {
    async fn add(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        entries.purge_expired(now);
        if entries.expiries.contains_key(key) {
            return Err(StoreError::Conflict);
        }
        entries.insert(key, now + ttl);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = self.lock();
        match entries.expiries.get(key) {
            Some(expiry) if *expiry > now => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_is_add_if_absent() {
        let store = MemoryStore::new();
        store.add("ext-1", Duration::from_secs(60)).await.unwrap();
        assert!(matches!(
            store.add("ext-1", Duration::from_secs(60)).await,
            Err(StoreError::Conflict)
        ));
        store.delete("ext-1").await.unwrap();
        store.add("ext-1", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_key_can_be_added_again() {
        let store = MemoryStore::new();
        store.add("ext-2", Duration::from_millis(10)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!store.exists("ext-2").await.unwrap());
        store.add("ext-2", Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_adds_have_one_winner() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add("race", Duration::from_secs(60)).await.is_ok()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_expired_keys_are_dropped_on_add() {
        let store = MemoryStore::new();
        for i in 0..1_000 {
            store.add(&format!("old-{}", i), Duration::from_millis(1)).await.unwrap();
        }
        store.add("kept", Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        store.add("fresh", Duration::from_secs(60)).await.unwrap();
        let entries = store.lock();
        assert_eq!(entries.expiries.len(), 2);
        assert_eq!(entries.by_expiry.len(), 2);
        assert!(entries.expiries.contains_key("kept"));
    }

    #[tokio::test]
    async fn test_readd_and_delete_keep_indexes_in_step() {
        let store = MemoryStore::new();
        store.add("ext-3", Duration::from_millis(1)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.add("ext-3", Duration::from_secs(60)).await.unwrap();
        store.add("ext-4", Duration::from_secs(60)).await.unwrap();
        store.delete("ext-4").await.unwrap();

        let entries = store.lock();
        assert_eq!(entries.expiries.len(), 1);
        assert_eq!(entries.by_expiry.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_key_is_ok() {
        let store = MemoryStore::new();
        tokio_test::assert_ok!(store.delete("never-added").await);
        assert!(store.is_empty());
    }
}
