//! The pair of maps that correlate CAS tickets with local sessions.

use std::fmt;
use std::sync::Arc;

use slo_core::{SessionId, StoreBackend, StoreConfig, Ticket};
use tracing::debug;

use crate::error::StoreResult;
use crate::memory::MemoryStore;
use crate::store::ExpiringStore;

/// Bound on snapshot types that every enabled backend can hold.
#[cfg(feature = "redis")]
pub trait StoreValue: serde::Serialize + serde::de::DeserializeOwned {}
#[cfg(feature = "redis")]
impl<T: serde::Serialize + serde::de::DeserializeOwned> StoreValue for T {}

/// Bound on snapshot types that every enabled backend can hold.
#[cfg(not(feature = "redis"))]
pub trait StoreValue {}
#[cfg(not(feature = "redis"))]
impl<T> StoreValue for T {}

/// `ticket → snapshot` and `session id → ticket`, kept as two separate
/// stores that share one capacity/expiration policy.
///
/// Cloning is cheap and yields a handle onto the same underlying maps.
pub struct CorrelationStore<S: Send + Sync + 'static> {
    tickets: Arc<dyn ExpiringStore<S>>,
    sessions: Arc<dyn ExpiringStore<Ticket>>,
    description: String,
}

impl<S: Send + Sync + 'static> Clone for CorrelationStore<S> {
    fn clone(&self) -> Self {
        Self {
            tickets: Arc::clone(&self.tickets),
            sessions: Arc::clone(&self.sessions),
            description: self.description.clone(),
        }
    }
}

impl<S> CorrelationStore<S>
where
    S: Send + Sync + 'static,
{
    pub fn new(
        tickets: Arc<dyn ExpiringStore<S>>,
        sessions: Arc<dyn ExpiringStore<Ticket>>,
    ) -> Self {
        Self {
            tickets,
            sessions,
            description: "custom".to_string(),
        }
    }

    /// In-memory maps sized from `config`. The backend field is ignored.
    pub fn in_memory(config: &StoreConfig) -> StoreResult<Self>
    where
        S: Clone,
    {
        let tickets = MemoryStore::<S>::from_config(config)?;
        let sessions = MemoryStore::<Ticket>::from_config(config)?;
        Ok(Self {
            tickets: Arc::new(tickets),
            sessions: Arc::new(sessions),
            description: format!(
                "memory(capacity={}, expiration={:?})",
                config.capacity, config.expiration
            ),
        })
    }

    /// Build the maps for whichever backend `config` selects.
    pub async fn from_config(config: &StoreConfig) -> StoreResult<Self>
    where
        S: Clone + StoreValue,
    {
        match &config.backend {
            StoreBackend::Memory => Self::in_memory(config),
            #[cfg(feature = "redis")]
            StoreBackend::Redis { url, prefix } => Self::redis(url, prefix, config).await,
            #[cfg(not(feature = "redis"))]
            StoreBackend::Redis { .. } => Err(crate::error::StoreError::Configuration(
                "redis backend requested but the `redis` feature is disabled".into(),
            )),
        }
    }

    /// Redis-backed maps. Ticket and session keys
    /// live under separate sub-prefixes of `prefix`.
    #[cfg(feature = "redis")]
    pub async fn redis(url: &str, prefix: &str, config: &StoreConfig) -> StoreResult<Self>
    where
        S: StoreValue,
    {
        use crate::redis_store::RedisStore;

        let tickets = RedisStore::<S>::new(url, &format!("{prefix}ticket:"), config.expiration).await?;
        let sessions = RedisStore::<Ticket>::new(url, &format!("{prefix}session:"), config.expiration).await?;
        Ok(Self {
            tickets: Arc::new(tickets),
            sessions: Arc::new(sessions),
            description: format!("redis(prefix={prefix}, expiration={:?})", config.expiration),
        })
    }

    pub fn tickets(&self) -> &Arc<dyn ExpiringStore<S>> {
        &self.tickets
    }

    pub fn sessions(&self) -> &Arc<dyn ExpiringStore<Ticket>> {
        &self.sessions
    }

    /// Bind `ticket` and `session_id` to each other. A ticket previously
    /// bound to the same session loses its snapshot, so it can no longer
    /// reach the session through a back-channel logout.
    pub async fn bind(&self, ticket: &Ticket, session_id: &SessionId, snapshot: S) -> StoreResult<()> {
        if let Some(previous) = self.take_bound_ticket(session_id).await? {
            if &previous != ticket {
                self.take_snapshot(&previous).await?;
                debug!(
                    ticket = %ticket,
                    previous = %previous,
                    session_id = %session_id,
                    "dropped snapshot of superseded ticket"
                );
            }
        }
        self.tickets.set(ticket.as_str(), snapshot).await?;
        self.sessions.set(session_id.as_str(), ticket.clone()).await
    }

    pub async fn snapshot(&self, ticket: &Ticket) -> StoreResult<Option<S>> {
        self.tickets.get(ticket.as_str()).await
    }

    pub async fn bound_ticket(&self, session_id: &SessionId) -> StoreResult<Option<Ticket>> {
        self.sessions.get(session_id.as_str()).await
    }

    pub async fn take_snapshot(&self, ticket: &Ticket) -> StoreResult<Option<S>> {
        self.tickets.remove(ticket.as_str()).await
    }

    pub async fn take_bound_ticket(&self, session_id: &SessionId) -> StoreResult<Option<Ticket>> {
        self.sessions.remove(session_id.as_str()).await
    }
}

impl<S: Send + Sync + 'static> fmt::Debug for CorrelationStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrelationStore")
            .field("backend", &self.description)
            .finish()
    }
}
