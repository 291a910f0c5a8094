//! Redis-backed expiring store.
//!
//! Available only when the `redis` cargo feature is enabled. Values are
//! stored as JSON under `{prefix}{key}` with a Redis TTL equal to the
//! configured expiration, so expiry needs no sweeper. Capacity is not
//! enforced here: size the server with `maxmemory` and an LRU eviction
//! policy instead.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{StoreError, StoreResult};
use crate::store::ExpiringStore;

pub struct RedisStore<V> {
    conn: redis::aio::ConnectionManager,
    prefix: String,
    expiration: Duration,
    _value: PhantomData<fn() -> V>,
}

impl<V> RedisStore<V> {
    /// Connect to `redis_url`, e.g. `redis://127.0.0.1:6379`.
    pub async fn new(redis_url: &str, prefix: &str, expiration: Duration) -> StoreResult<Self> {
        let client = redis::Client::open(redis_url).map_err(backend)?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(backend)?;
        Ok(Self::with_connection(conn, prefix, expiration))
    }

    /// Reuse an existing connection manager; it is cheaply cloneable.
    pub fn with_connection(
        conn: redis::aio::ConnectionManager,
        prefix: &str,
        expiration: Duration,
    ) -> Self {
        Self {
            conn,
            prefix: prefix.to_string(),
            expiration,
            _value: PhantomData,
        }
    }

    fn key(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    fn ttl_secs(&self) -> u64 {
        self.expiration.as_secs().max(1)
    }
}

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

#[async_trait]
impl<V> ExpiringStore<V> for RedisStore<V>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn set(&self, key: &str, value: V) -> StoreResult<()> {
        let json = serde_json::to_string(&value)?;
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(self.key(key), json, self.ttl_secs())
            .await
            .map_err(backend)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<V>> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn.get(self.key(key)).await.map_err(backend)?;
        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(StoreError::from)
    }

    async fn remove(&self, key: &str) -> StoreResult<Option<V>> {
        let mut conn = self.conn.clone();
        // GETDEL reads and deletes in one command.
        let json: Option<String> = conn.get_del(self.key(key)).await.map_err(backend)?;
        json.map(|j| serde_json::from_str(&j))
            .transpose()
            .map_err(StoreError::from)
    }
}
