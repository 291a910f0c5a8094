//! Authenticated user profiles attached to a session.
//!
//! [`ProfileManager`] is the default [`SecurityContext`]: it keeps the
//! profiles of every client the user authenticated with under a single
//! session attribute, so logging out is a single attribute removal.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use slo_core::{Error, Result};

use crate::session::SessionStore;

/// Session attribute holding the serialized profiles.
pub const PROFILES_KEY: &str = "slo.profiles";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    /// Name of the authentication client that produced this profile.
    pub client_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
}

impl UserProfile {
    pub fn new(id: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            client_name: client_name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Removes the authenticated principal from a session.
#[async_trait]
pub trait SecurityContext<S: SessionStore>: Send + Sync {
    async fn remove_profiles(&self, session: &S) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileManager;

impl ProfileManager {
    pub fn new() -> Self {
        Self
    }

    /// Store `profile`, replacing any earlier profile from the same client.
    pub async fn save_profile<S: SessionStore>(&self, session: &S, profile: UserProfile) -> Result<()> {
        let mut profiles = self.load(session).await?;
        profiles.insert(profile.client_name.clone(), profile);
        let value = serde_json::to_value(&profiles)
            .map_err(|e| Error::Session(format!("failed to serialize profiles: {e}")))?;
        session.set(PROFILES_KEY, value).await
    }

    pub async fn profiles<S: SessionStore>(&self, session: &S) -> Result<Vec<UserProfile>> {
        Ok(self.load(session).await?.into_values().collect())
    }

    pub async fn is_authenticated<S: SessionStore>(&self, session: &S) -> Result<bool> {
        Ok(!self.load(session).await?.is_empty())
    }

    async fn load<S: SessionStore>(&self, session: &S) -> Result<BTreeMap<String, UserProfile>> {
        match session.get(PROFILES_KEY).await? {
            Some(value) => serde_json::from_value(value)
                .map_err(|e| Error::Session(format!("corrupt profiles attribute: {e}"))),
            None => Ok(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl<S: SessionStore> SecurityContext<S> for ProfileManager {
    async fn remove_profiles(&self, session: &S) -> Result<()> {
        session.remove(PROFILES_KEY).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionStore;
    use serde_json::json;

    #[tokio::test]
    async fn save_and_list_profiles() {
        let store = MemorySessionStore::new();
        let session = store.session();
        let manager = ProfileManager::new();

        assert!(!manager.is_authenticated(&session).await.unwrap());

        manager
            .save_profile(&session, UserProfile::new("jdoe", "CasClient").with_attribute("mail", json!("jdoe@example.org")))
            .await
            .unwrap();
        manager
            .save_profile(&session, UserProfile::new("jdoe2", "CasClient"))
            .await
            .unwrap();

        let profiles = manager.profiles(&session).await.unwrap();
        assert_eq!(profiles.len(), 1);
        assert_eq!(profiles[0].id, "jdoe2");
        assert!(manager.is_authenticated(&session).await.unwrap());
    }

    #[tokio::test]
    async fn remove_profiles_keeps_other_attributes() {
        let store = MemorySessionStore::new();
        let session = store.session();
        let manager = ProfileManager::new();
        manager
            .save_profile(&session, UserProfile::new("jdoe", "CasClient"))
            .await
            .unwrap();
        session.set("cart", json!([1, 2])).await.unwrap();

        manager.remove_profiles(&session).await.unwrap();

        assert!(!manager.is_authenticated(&session).await.unwrap());
        assert_eq!(session.get("cart").await.unwrap(), Some(json!([1, 2])));
    }

    #[tokio::test]
    async fn corrupt_attribute_is_a_session_error() {
        let store = MemorySessionStore::new();
        let session = store.session();
        session.set(PROFILES_KEY, json!("not a map")).await.unwrap();

        let err = ProfileManager::new().profiles(&session).await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
    }
}
