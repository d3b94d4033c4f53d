// src/storage/mod.rs
pub mod idempotency;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;

use crate::storage::idempotency::{CacheBackend, IdempotencyStore};
use crate::storage::memory::MemoryStore;
use std::sync::Arc;

/// Builds the idempotency backend selected in configuration. Called once at
/// startup; switching backends means building a new store.
pub async fn build_store(
    backend: CacheBackend,
    redis_url: Option<&str>,
) -> anyhow::Result<Arc<dyn IdempotencyStore>> {
    match backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            let url = redis_url
                .ok_or_else(|| anyhow::anyhow!("cache.redis_url is required for the redis backend"))?;
            let store = redis_store::RedisStore::connect(url).await?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => {
            let _ = redis_url;
            anyhow::bail!("the redis backend requires building with the `redis` feature")
        }
    }
}
