//! Expiring key/value storage for ticket and session correlation.
//!
//! [`ExpiringStore`] is the backend contract; [`MemoryStore`] is the default
//! bounded in-process implementation and `RedisStore` (feature `redis`)
//! shares entries between server instances. [`CorrelationStore`] pairs two
//! stores into the ticket→snapshot and session→ticket maps used by the
//! logout handler.

pub mod correlation;
pub mod error;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis_store;
pub mod store;

pub use correlation::{CorrelationStore, StoreValue};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
pub use store::ExpiringStore;
