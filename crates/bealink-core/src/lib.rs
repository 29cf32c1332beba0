//! bealink-core: configuration, shared error type and constants used by
//! every Bealink crate.

pub mod config;
pub mod error;

pub use config::BealinkConfig;
pub use error::{BealinkError, Result};
