//! CAS single-logout handler.
//!
//! On login, [`CasLogoutHandler::record_session`] binds the validated service
//! ticket to the current session in both directions. A logout notification
//! from the CAS server then arrives one of two ways:
//!
//! - **Front channel** -- the browser is redirected to us and still carries
//!   its session. The ticket bound to that session must equal the ticket
//!   being logged out, otherwise nothing is destroyed.
//! - **Back channel** -- the CAS server calls us directly. The only handle
//!   on the user's session is the snapshot recorded under the ticket, which
//!   is rebuilt into a live session and destroyed.
//!
//! Every lookup that feeds a destruction is an atomic take on the store, so
//! concurrent logouts of one ticket destroy its session at most once.

use std::fmt;

use slo_core::{Error, LogoutConfig, Result, SessionId, Ticket};
use slo_store::{CorrelationStore, StoreValue};
use tracing::{debug, error};

use crate::profile::{ProfileManager, SecurityContext};
use crate::session::{SessionRebuilder, SessionStore, SnapshotOf};

/// What [`CasLogoutHandler::record_session`] did with the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Both correlation entries were written.
    Tracked { session_id: SessionId },
    /// The session backend produced no snapshot, so single logout cannot
    /// reach this session. Not an error.
    NotTrackable,
}

pub struct CasLogoutHandler<R, C = ProfileManager>
where
    R: SessionRebuilder,
{
    rebuilder: R,
    security: C,
    store: CorrelationStore<SnapshotOf<R>>,
    kill_session: bool,
}

impl<R, C> CasLogoutHandler<R, C>
where
    R: SessionRebuilder,
    C: SecurityContext<R::Session>,
{
    pub fn new(rebuilder: R, security: C, store: CorrelationStore<SnapshotOf<R>>) -> Self {
        Self {
            rebuilder,
            security,
            store,
            kill_session: false,
        }
    }

    /// Build a handler and its correlation store from `config`.
    pub async fn from_config(rebuilder: R, security: C, config: &LogoutConfig) -> Result<Self>
    where
        SnapshotOf<R>: StoreValue,
    {
        config.validate()?;
        let store = CorrelationStore::from_config(&config.store).await?;
        Ok(Self::new(rebuilder, security, store).with_kill_session(config.kill_session))
    }

    pub fn with_kill_session(mut self, kill_session: bool) -> Self {
        self.kill_session = kill_session;
        self
    }

    pub fn kill_session(&self) -> bool {
        self.kill_session
    }

    pub fn set_kill_session(&mut self, kill_session: bool) {
        self.kill_session = kill_session;
    }

    pub fn store(&self) -> &CorrelationStore<SnapshotOf<R>> {
        &self.store
    }

    pub fn rebuilder(&self) -> &R {
        &self.rebuilder
    }

    pub fn security(&self) -> &C {
        &self.security
    }

    /// Bind `ticket` to `session` after a successful CAS authentication.
    /// A ticket recorded earlier for the same session stops being tracked.
    pub async fn record_session(&self, session: &R::Session, ticket: &Ticket) -> Result<RecordOutcome> {
        let result = self.record(session, ticket).await;
        if let Err(e) = &result {
            error!(ticket = %ticket, "RECORD: failed to record session: {e}");
        }
        result
    }

    /// Handle a logout that arrived through the browser on `session`.
    ///
    /// Fails with [`Error::TicketMismatch`] when `session` is not bound to
    /// `ticket`, including when it is bound to nothing at all.
    pub async fn destroy_session_front(&self, session: &R::Session, ticket: &Ticket) -> Result<()> {
        let result = self.front_channel(session, ticket).await;
        if let Err(e) = &result {
            error!(
                ticket = %ticket,
                "FRONT_LOGOUT: the user profiles (and session) were not destroyed: {e}"
            );
        }
        result
    }

    /// Handle a server-to-server logout for `ticket`.
    ///
    /// Returns the rebuilt session that was destroyed, so the caller can
    /// attach it wherever the request pipeline expects the current session.
    pub async fn destroy_session_back(&self, ticket: &Ticket) -> Result<R::Session> {
        let result = self.back_channel(ticket).await;
        if let Err(e) = &result {
            match e {
                Error::UntrackedTicket(_) => error!(
                    ticket = %ticket,
                    "BACK_LOGOUT: no trackable session found; either the session store cannot \
                     track sessions or the entry expired and the store settings must be updated"
                ),
                _ => error!(ticket = %ticket, "BACK_LOGOUT: {e}"),
            }
        }
        result
    }

    /// Remove the user profiles from `session`, and the whole session when
    /// `kill_session` is set.
    async fn destroy(&self, session: &R::Session) -> Result<()> {
        self.security.remove_profiles(session).await?;
        debug!("destroyed the user profiles");
        if self.kill_session {
            debug!("destroying the whole session");
            session.invalidate().await?;
        }
        Ok(())
    }

    async fn record(&self, session: &R::Session, ticket: &Ticket) -> Result<RecordOutcome> {
        let session_id = session.get_or_create_session_id().await?;
        let Some(snapshot) = session.trackable_session().await? else {
            debug!(
                ticket = %ticket,
                session_id = %session_id,
                "RECORD: no trackable session for the current session store"
            );
            return Ok(RecordOutcome::NotTrackable);
        };

        self.store.bind(ticket, &session_id, snapshot).await?;
        debug!(
            ticket = %ticket,
            session_id = %session_id,
            "RECORD: ticket bound to session"
        );
        Ok(RecordOutcome::Tracked { session_id })
    }

    async fn front_channel(&self, session: &R::Session, ticket: &Ticket) -> Result<()> {
        // The snapshot is useless once the browser itself is logging out.
        self.store.take_snapshot(ticket).await?;

        let session_id = session.get_or_create_session_id().await?;
        let recorded = self.store.take_bound_ticket(&session_id).await?;
        debug!(
            ticket = %ticket,
            session_id = %session_id,
            recorded = ?recorded,
            "FRONT_LOGOUT: looked up ticket bound to current session"
        );

        if recorded.as_ref() != Some(ticket) {
            return Err(Error::TicketMismatch {
                ticket: ticket.clone(),
                session_id,
                recorded,
            });
        }
        self.destroy(session).await
    }

    async fn back_channel(&self, ticket: &Ticket) -> Result<R::Session> {
        let snapshot = self
            .store
            .take_snapshot(ticket)
            .await?
            .ok_or_else(|| Error::UntrackedTicket(ticket.clone()))?;

        let session = self
            .rebuilder
            .rebuild(&snapshot)
            .await?
            .ok_or_else(|| Error::SessionRebuildUnsupported(ticket.clone()))?;

        let session_id = session.get_or_create_session_id().await?;
        debug!(
            ticket = %ticket,
            session_id = %session_id,
            "BACK_LOGOUT: rebuilt session from snapshot"
        );
        self.store.take_bound_ticket(&session_id).await?;

        self.destroy(&session).await?;
        Ok(session)
    }
}

impl<R, C> fmt::Debug for CasLogoutHandler<R, C>
where
    R: SessionRebuilder,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CasLogoutHandler")
            .field("store", &self.store)
            .field("kill_session", &self.kill_session)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemorySessionStore;
    use crate::profile::UserProfile;
    use slo_core::StoreConfig;

    fn handler(kill_session: bool) -> CasLogoutHandler<MemorySessionStore> {
        let sessions = MemorySessionStore::new();
        let store = CorrelationStore::in_memory(&StoreConfig::default()).unwrap();
        CasLogoutHandler::new(sessions, ProfileManager::new(), store).with_kill_session(kill_session)
    }

    #[tokio::test]
    async fn record_then_front_then_back() {
        let handler = handler(false);
        let session = handler.rebuilder.session();
        handler
            .security()
            .save_profile(&session, UserProfile::new("jdoe", "CasClient"))
            .await
            .unwrap();
        let ticket = Ticket::from("ST-100");

        let session_id = match handler.record_session(&session, &ticket).await.unwrap() {
            RecordOutcome::Tracked { session_id } => session_id,
            other => panic!("expected a tracked session, got {other:?}"),
        };

        assert_eq!(
            handler.store().snapshot(&ticket).await.unwrap(),
            Some(session_id.clone())
        );
        assert_eq!(
            handler.store().bound_ticket(&session_id).await.unwrap(),
            Some(ticket.clone())
        );

        handler.destroy_session_front(&session, &ticket).await.unwrap();
        assert!(handler.store().snapshot(&ticket).await.unwrap().is_none());
        assert!(handler.store().bound_ticket(&session_id).await.unwrap().is_none());
        assert!(!handler.security().is_authenticated(&session).await.unwrap());

        let err = handler.destroy_session_back(&ticket).await.unwrap_err();
        assert!(err.is_untracked());
    }

    #[tokio::test]
    async fn debug_shows_store_and_flag() {
        let rendered = format!("{:?}", handler(true));
        assert!(rendered.contains("kill_session: true"));
        assert!(rendered.contains("CorrelationStore"));
    }

    #[tokio::test]
    async fn set_kill_session_toggles_flag() {
        let mut handler = handler(false);
        assert!(!handler.kill_session());
        handler.set_kill_session(true);
        assert!(handler.kill_session());
    }
}
