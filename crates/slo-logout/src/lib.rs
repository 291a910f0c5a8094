//! CAS single logout: correlates service tickets with local web sessions
//! and tears those sessions down on front-channel or back-channel logout.

pub mod handler;
pub mod memory;
pub mod profile;
pub mod session;

pub use handler::{CasLogoutHandler, RecordOutcome};
pub use memory::{MemorySession, MemorySessionStore};
pub use profile::{ProfileManager, SecurityContext, UserProfile, PROFILES_KEY};
pub use session::{SessionRebuilder, SessionStore, SnapshotOf};
