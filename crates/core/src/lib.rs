//! Core types for the devbridge development orchestrator
//!
//! This crate provides the foundational pieces shared by the sync engine and
//! the command-line binary:
//!
//! - **Configuration**: sync timings, ignore rules and logging, loaded from
//!   TOML and `DEVBRIDGE_*` environment variables
//! - **Error handling**: unified error types
//!

pub mod config;
pub mod error;

// Re-export main types for convenience
pub use config::{Config, LoggingConfig, SyncConfig, SyncConfigBuilder};
pub use error::{Error, Result, ResultExt};

/// Version of the core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{Config, SyncConfig};
    pub use crate::error::{Result, ResultExt};
}
