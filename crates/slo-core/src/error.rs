use thiserror::Error;

use crate::types::{SessionId, Ticket};

#[derive(Error, Debug)]
pub enum Error {
    /// The front-channel logout ticket is not the one bound to the current
    /// session. `recorded` is `None` when the session had no binding at all.
    #[error("Ticket mismatch: logout ticket {ticket} is not bound to session {session_id}")]
    TicketMismatch {
        ticket: Ticket,
        session_id: SessionId,
        recorded: Option<Ticket>,
    },

    #[error("No trackable session recorded for ticket: {0}")]
    UntrackedTicket(Ticket),

    #[error("Session cannot be rebuilt from the tracked snapshot of ticket: {0}")]
    SessionRebuildUnsupported(Ticket),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    pub fn is_ticket_mismatch(&self) -> bool {
        matches!(self, Self::TicketMismatch { .. })
    }

    pub fn is_untracked(&self) -> bool {
        matches!(self, Self::UntrackedTicket(_))
    }

    pub fn is_rebuild_unsupported(&self) -> bool {
        matches!(self, Self::SessionRebuildUnsupported(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
