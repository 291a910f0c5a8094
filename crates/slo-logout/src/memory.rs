//! In-process session backend.
//!
//! Sessions live in a `DashMap` registry keyed by a lazily created uuid
//! session id. The trackable snapshot is the session id itself, so a
//! back-channel logout can resume the exact session the browser holds.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::Value;
use slo_core::{Result, SessionId};
use tracing::debug;
use uuid::Uuid;

use crate::session::{SessionRebuilder, SessionStore};

type Attributes = Arc<Mutex<HashMap<String, Value>>>;

struct Registry {
    sessions: DashMap<SessionId, Attributes>,
    trackable: bool,
}

/// Registry of in-memory sessions. Cloning yields a handle to the same registry.
#[derive(Clone)]
pub struct MemorySessionStore {
    inner: Arc<Registry>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::with_tracking(true)
    }

    /// A registry whose sessions never produce a trackable snapshot.
    pub fn untrackable() -> Self {
        Self::with_tracking(false)
    }

    fn with_tracking(trackable: bool) -> Self {
        Self {
            inner: Arc::new(Registry {
                sessions: DashMap::new(),
                trackable,
            }),
        }
    }

    /// A fresh session handle for a new request. No id is allocated until
    /// one is asked for.
    pub fn session(&self) -> MemorySession {
        MemorySession {
            registry: self.clone(),
            id: Arc::new(Mutex::new(None)),
        }
    }

    /// Re-attach to a registered session.
    pub fn resume(&self, id: &SessionId) -> Option<MemorySession> {
        if !self.inner.sessions.contains_key(id) {
            return None;
        }
        Some(MemorySession {
            registry: self.clone(),
            id: Arc::new(Mutex::new(Some(id.clone()))),
        })
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.inner.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    pub fn is_trackable(&self) -> bool {
        self.inner.trackable
    }

    fn attributes(&self, id: &SessionId) -> Option<Attributes> {
        self.inner.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MemorySessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySessionStore")
            .field("sessions", &self.inner.sessions.len())
            .field("trackable", &self.inner.trackable)
            .finish()
    }
}

#[async_trait]
impl SessionRebuilder for MemorySessionStore {
    type Session = MemorySession;

    async fn rebuild(&self, snapshot: &SessionId) -> Result<Option<MemorySession>> {
        Ok(self.resume(snapshot))
    }
}

/// A request-bound handle onto one session of a [`MemorySessionStore`].
#[derive(Clone)]
pub struct MemorySession {
    registry: MemorySessionStore,
    id: Arc<Mutex<Option<SessionId>>>,
}

impl MemorySession {
    /// The session id, if one has been allocated.
    pub fn id(&self) -> Option<SessionId> {
        self.id.lock().clone()
    }

    fn ensure_id(&self) -> SessionId {
        self.live_attributes().0
    }

    /// The id and attribute map of the session this handle points at. A
    /// handle whose session was invalidated elsewhere gets a new session
    /// rather than reviving the old id.
    fn live_attributes(&self) -> (SessionId, Attributes) {
        let mut slot = self.id.lock();
        if let Some(existing) = slot.as_ref() {
            if let Some(attrs) = self.registry.attributes(existing) {
                return (existing.clone(), attrs);
            }
            debug!(session_id = %existing, "in-memory session was invalidated, replacing it");
        }
        let id = SessionId::new(Uuid::new_v4().to_string());
        let attrs = Attributes::default();
        self.registry
            .inner
            .sessions
            .insert(id.clone(), Arc::clone(&attrs));
        debug!(session_id = %id, "created in-memory session");
        *slot = Some(id.clone());
        (id, attrs)
    }

    fn attributes(&self) -> Option<Attributes> {
        let id = self.id()?;
        self.registry.attributes(&id)
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySession").field("id", &self.id()).finish()
    }
}

#[async_trait]
impl SessionStore for MemorySession {
    type Snapshot = SessionId;

    async fn get_or_create_session_id(&self) -> Result<SessionId> {
        Ok(self.ensure_id())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let Some(attrs) = self.attributes() else {
            return Ok(None);
        };
        let value = attrs.lock().get(key).cloned();
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let (_, attrs) = self.live_attributes();
        attrs.lock().insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<Option<Value>> {
        let Some(attrs) = self.attributes() else {
            return Ok(None);
        };
        let value = attrs.lock().remove(key);
        Ok(value)
    }

    async fn invalidate(&self) -> Result<()> {
        let Some(id) = self.id.lock().take() else {
            return Ok(());
        };
        if let Some((_, attrs)) = self.registry.inner.sessions.remove(&id) {
            // Other handles on the same session may still hold the map.
            attrs.lock().clear();
        }
        debug!(session_id = %id, "invalidated in-memory session");
        Ok(())
    }

    async fn trackable_session(&self) -> Result<Option<SessionId>> {
        if !self.registry.inner.trackable {
            return Ok(None);
        }
        Ok(Some(self.ensure_id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn session_id_is_lazy_and_stable() {
        let store = MemorySessionStore::new();
        let session = store.session();
        assert!(session.id().is_none());
        assert!(store.is_empty());

        let first = session.get_or_create_session_id().await.unwrap();
        let second = session.get_or_create_session_id().await.unwrap();
        assert_eq!(first, second);
        assert!(store.contains(&first));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn attributes_round_trip_and_remove() {
        let session = MemorySessionStore::new().session();
        assert_eq!(session.get("k").await.unwrap(), None);
        session.set("k", json!("v")).await.unwrap();
        assert_eq!(session.get("k").await.unwrap(), Some(json!("v")));
        assert_eq!(session.remove("k").await.unwrap(), Some(json!("v")));
        assert_eq!(session.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn rebuilt_session_shares_state() {
        let store = MemorySessionStore::new();
        let session = store.session();
        session.set("k", json!(1)).await.unwrap();
        let snapshot = session.trackable_session().await.unwrap().unwrap();

        let rebuilt = store.rebuild(&snapshot).await.unwrap().unwrap();
        assert_eq!(rebuilt.get("k").await.unwrap(), Some(json!(1)));

        rebuilt.invalidate().await.unwrap();
        assert!(!store.contains(&snapshot));
        assert_eq!(session.get("k").await.unwrap(), None);
        assert!(store.rebuild(&snapshot).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn untrackable_store_yields_no_snapshot() {
        let store = MemorySessionStore::untrackable();
        let session = store.session();
        assert_eq!(session.trackable_session().await.unwrap(), None);
        assert!(!store.is_trackable());
    }

    #[tokio::test]
    async fn invalidate_then_reuse_allocates_new_id() {
        let store = MemorySessionStore::new();
        let session = store.session();
        let old = session.get_or_create_session_id().await.unwrap();
        session.invalidate().await.unwrap();
        assert!(session.id().is_none());

        let new = session.get_or_create_session_id().await.unwrap();
        assert_ne!(old, new);
        assert!(!store.contains(&old));
    }

    #[tokio::test]
    async fn stale_handle_does_not_revive_invalidated_session() {
        let store = MemorySessionStore::new();
        let browser = store.session();
        browser.set("k", json!(1)).await.unwrap();
        let old = browser.id().unwrap();

        let rebuilt = store.rebuild(&old).await.unwrap().unwrap();
        rebuilt.invalidate().await.unwrap();
        assert_eq!(browser.id(), Some(old.clone()));

        browser.set("k", json!(2)).await.unwrap();
        let fresh = browser.id().unwrap();
        assert_ne!(fresh, old);
        assert!(!store.contains(&old));
        assert!(store.contains(&fresh));
        assert_eq!(store.len(), 1);
        assert!(store.rebuild(&old).await.unwrap().is_none());
        assert_eq!(browser.get("k").await.unwrap(), Some(json!(2)));
        assert_eq!(browser.get_or_create_session_id().await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn stale_handle_gets_new_id_on_lookup() {
        let store = MemorySessionStore::new();
        let browser = store.session();
        let old = browser.get_or_create_session_id().await.unwrap();
        store.resume(&old).unwrap().invalidate().await.unwrap();

        let new = browser.get_or_create_session_id().await.unwrap();
        assert_ne!(old, new);
        assert!(!store.contains(&old));
        assert_eq!(browser.trackable_session().await.unwrap(), Some(new));
    }
}
