pub mod config;
pub mod error;
pub mod types;

pub use config::{parse_duration, LogoutConfig, StoreBackend, StoreConfig};
pub use error::{Error, Result};
pub use types::*;
