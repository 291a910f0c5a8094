//! The session backend contract the logout handler depends on.
//!
//! The handler never owns session storage. It asks the request's session
//! for an id and a trackable snapshot at login, and asks a
//! [`SessionRebuilder`] to turn a snapshot back into a live session when a
//! back-channel logout arrives with no browser attached.

use async_trait::async_trait;
use serde_json::Value;
use slo_core::{Result, SessionId};

/// A web session bound to one request.
///
/// Implementations are handles: methods take `&self` and use interior
/// mutability, so the same session can be shared across the request
/// pipeline.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Opaque state sufficient to rebuild an equivalent session later.
    type Snapshot: Clone + Send + Sync + 'static;

    /// Return the current session id, creating the session if needed.
    async fn get_or_create_session_id(&self) -> Result<SessionId>;

    async fn get(&self, key: &str) -> Result<Option<Value>>;
    async fn set(&self, key: &str, value: Value) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<Option<Value>>;

    /// Discard the whole session, not just its attributes.
    async fn invalidate(&self) -> Result<()>;

    /// `None` when this backend cannot track sessions for single logout.
    async fn trackable_session(&self) -> Result<Option<Self::Snapshot>>;
}

/// Builds a live session from a snapshot taken by [`SessionStore::trackable_session`].
#[async_trait]
pub trait SessionRebuilder: Send + Sync {
    type Session: SessionStore;

    /// `None` when the backend cannot rebuild from this snapshot.
    async fn rebuild(
        &self,
        snapshot: &<Self::Session as SessionStore>::Snapshot,
    ) -> Result<Option<Self::Session>>;
}

pub type SnapshotOf<R> = <<R as SessionRebuilder>::Session as SessionStore>::Snapshot;
