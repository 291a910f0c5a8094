//! Trait abstraction for expiring correlation storage.
//!
//! Allows swapping between the in-memory LRU store and a Redis-backed one.

use async_trait::async_trait;

use crate::error::StoreResult;

/// A bounded key/value store whose entries expire a fixed duration after
/// they were last written.
///
/// Expired and evicted entries are indistinguishable from keys that were
/// never set: both read as `None`.
#[async_trait]
pub trait ExpiringStore<V>: Send + Sync + 'static
where
    V: Send + Sync + 'static,
{
    /// Insert or overwrite `key`, restarting its expiration clock.
    async fn set(&self, key: &str, value: V) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<V>>;

    /// Remove `key` and return the value it held, in a single atomic step.
    ///
    /// Of several concurrent callers removing the same key, at most one
    /// observes `Some`.
    async fn remove(&self, key: &str) -> StoreResult<Option<V>>;
}
