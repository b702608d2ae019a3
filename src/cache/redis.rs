//! Redis-backed cache for limiters shared between processes.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use super::Cache;
use crate::error::{CacheError, CacheResult};

/// A [`Cache`] stored in Redis, relying on Redis key expiry.
#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    namespace: Option<String>,
}

impl RedisCache {
    /// Wrap a configured Redis client.
    pub fn new(client: redis::Client) -> Self {
        Self {
            client,
            namespace: None,
        }
    }

    /// Connect lazily to the Redis server at `url`.
    pub fn open(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url).map_err(backend)?;
        Ok(Self::new(client))
    }

    /// Store every key under `namespace:`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn key_for(&self, key: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{namespace}:{key}"),
            None => key.to_string(),
        }
    }

    async fn connection(&self) -> CacheResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| CacheError::Backend(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<u64>> {
        let mut connection = self.connection().await?;
        let value: Option<u64> = connection.get(self.key_for(key)).await.map_err(backend)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: u64, ttl_seconds: u64) -> CacheResult<()> {
        let key = self.key_for(key);
        let mut connection = self.connection().await?;

        // SET EX rejects a zero expiry
        if ttl_seconds == 0 {
            connection
                .set::<_, _, ()>(key, value)
                .await
                .map_err(backend)
        } else {
            connection
                .set_ex::<_, _, ()>(key, value, ttl_seconds)
                .await
                .map_err(backend)
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut connection = self.connection().await?;
        connection
            .del::<_, i64>(self.key_for(key))
            .await
            .map_err(backend)?;
        Ok(())
    }
}

fn backend(error: redis::RedisError) -> CacheError {
    CacheError::Backend(error.to_string())
}
