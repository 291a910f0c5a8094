//! Bounded in-memory store with write-based expiration.
//!
//! Entries are spread over a fixed set of segments, each an
//! [`lru::LruCache`] behind its own `parking_lot::Mutex`. A key always maps
//! to the same segment, so operations on keys in different segments never
//! contend. Every critical section is O(1) and never held across an await.
//!
//! Recency is tracked per segment: once a segment is full its least recently
//! used entry is evicted, even if an older entry lives in another segment.

use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use slo_core::StoreConfig;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::ExpiringStore;

/// Upper bound on the number of segments picked by [`MemoryStore::new`].
pub const MAX_SHARDS: usize = 16;

/// Segments are only added while each one keeps at least this many slots.
const MIN_SHARD_CAPACITY: usize = 64;

struct Entry<V> {
    value: V,
    written_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, expiration: Duration) -> bool {
        self.written_at.elapsed() >= expiration
    }
}

type Shard<V> = Mutex<LruCache<String, Entry<V>>>;

pub struct MemoryStore<V> {
    shards: Box<[Shard<V>]>,
    hasher: RandomState,
    capacity: usize,
    expiration: Duration,
}

impl<V: Clone> MemoryStore<V> {
    /// A store holding at most `capacity` entries, segmented according to
    /// its size.
    pub fn new(capacity: usize, expiration: Duration) -> StoreResult<Self> {
        let shards = (capacity / MIN_SHARD_CAPACITY).clamp(1, MAX_SHARDS);
        Self::with_shards(capacity, expiration, shards)
    }

    /// A store split into exactly `shards` segments (capped at `capacity`).
    /// The capacity is divided as evenly as possible between them.
    pub fn with_shards(capacity: usize, expiration: Duration, shards: usize) -> StoreResult<Self> {
        if capacity == 0 {
            return Err(StoreError::Configuration(
                "capacity must be greater than zero".into(),
            ));
        }
        if shards == 0 {
            return Err(StoreError::Configuration(
                "shard count must be greater than zero".into(),
            ));
        }
        if expiration.is_zero() {
            return Err(StoreError::Configuration(
                "expiration must be greater than zero".into(),
            ));
        }

        let count = shards.min(capacity);
        let (base, extra) = (capacity / count, capacity % count);
        let shards = (0..count)
            .map(|i| {
                let slots = base + usize::from(i < extra);
                // base >= 1 because count <= capacity
                let slots = NonZeroUsize::new(slots).unwrap_or(NonZeroUsize::MIN);
                Mutex::new(LruCache::new(slots))
            })
            .collect();

        Ok(Self {
            shards,
            hasher: RandomState::new(),
            capacity,
            expiration,
        })
    }

    pub fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        Self::new(config.capacity, config.expiration)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    pub fn expiration(&self) -> Duration {
        self.expiration
    }

    /// Number of resident entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }

    fn shard(&self, key: &str) -> &Shard<V> {
        let index = self.hasher.hash_one(key) as usize % self.shards.len();
        &self.shards[index]
    }

    pub fn set(&self, key: &str, value: V) {
        let displaced = self.shard(key).lock().push(
            key.to_string(),
            Entry {
                value,
                written_at: Instant::now(),
            },
        );
        if let Some((evicted, _)) = displaced {
            if evicted != key {
                debug!(key = %evicted, "capacity reached, evicted least recently used entry");
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.shard(key).lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(self.expiration) => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        entries.pop(key);
        None
    }

    pub fn remove(&self, key: &str) -> Option<V> {
        let entry = self.shard(key).lock().pop(key)?;
        if entry.is_expired(self.expiration) {
            None
        } else {
            Some(entry.value)
        }
    }

    /// Drop every expired entry, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut purged = 0;
        for shard in self.shards.iter() {
            let mut entries = shard.lock();
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, entry)| entry.is_expired(self.expiration))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &expired {
                entries.pop(key.as_str());
            }
            purged += expired.len();
        }
        purged
    }
}

impl<V> fmt::Debug for MemoryStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len: usize = self.shards.iter().map(|shard| shard.lock().len()).sum();
        f.debug_struct("MemoryStore")
            .field("capacity", &self.capacity)
            .field("shards", &self.shards.len())
            .field("len", &len)
            .field("expiration", &self.expiration)
            .finish()
    }
}

#[async_trait]
impl<V> ExpiringStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn set(&self, key: &str, value: V) -> StoreResult<()> {
        MemoryStore::set(self, key, value);
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<V>> {
        Ok(MemoryStore::get(self, key))
    }

    async fn remove(&self, key: &str) -> StoreResult<Option<V>> {
        Ok(MemoryStore::remove(self, key))
    }
}
