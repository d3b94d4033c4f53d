// src/storage/redis_store.rs
//! Redis idempotency backend, shared by every instance of the service.
//!
//! `add` is a single `SET key 1 NX EX ttl` round trip, which is atomic on
//! the server.

use crate::storage::idempotency::{IdempotencyStore, StoreError};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
}

impl RedisStore {
    /// Connects to `url` (e.g. `redis://127.0.0.1:6379/0`).
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url).map_err(backend)?;
        let connection = ConnectionManager::new(client).await.map_err(backend)?;
        log::info!("connected to redis idempotency backend");
        Ok(Self { connection })
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl IdempotencyStore for RedisStore {
    async fn add(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut connection)
            .await
            .map_err(backend)?;

        match reply {
            Some(_) => Ok(()),
            None => Err(StoreError::Conflict),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut connection = self.connection.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, i64>(&mut connection)
            .await
            .map(|_| ())
            .map_err(backend)
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut connection = self.connection.clone();
        redis::cmd("EXISTS")
            .arg(key)
            .query_async::<_, i64>(&mut connection)
            .await
            .map(|count| count > 0)
            .map_err(backend)
    }
}
