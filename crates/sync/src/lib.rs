#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Bidirectional file sync between a host directory and a container mount
//!
//! This crate keeps two directory trees in step while both are being edited:
//! - Per-root watching with a write-settle window in front of it
//! - Direction-aware debouncing (host edits sync faster than container ones)
//! - Content fingerprints and per-path locks that break feedback loops
//! - A stability probe so half-written files are never copied
//!
//! Deletions are not propagated.
//!
//! # Example
//!
//! ```no_run
//! use devbridge_core::SyncConfig;
//! use devbridge_sync::SyncSession;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = SyncSession::start(
//!     Path::new("/path/to/site"),
//!     Path::new("/path/to/container/html"),
//!     SyncConfig::default(),
//! )
//! .await?;
//!
//! let mut notices = session.subscribe();
//! while let Ok(notice) = notices.recv().await {
//!     println!("Synced {}", notice);
//! }
//!
//! session.stop();
//! # Ok(())
//! # }
//! ```

mod deferred;
mod watcher;

pub mod debouncer;
pub mod events;
pub mod executor;
pub mod fingerprint;
pub mod ignore;
pub mod locks;
pub mod roots;
pub mod session;
pub mod settle;
pub mod stability;

pub use debouncer::{ChangeDebouncer, SyncHandler};
pub use events::{SkipReason, SyncDirection, SyncNotice, SyncOutcome};
pub use executor::SyncExecutor;
pub use fingerprint::{compute_hash, ContentHash, FingerprintEntry, FingerprintStore};
pub use ignore::{IgnoreFilter, IgnoreFilterBuilder};
pub use locks::LockRegistry;
pub use roots::{SyncPaths, SyncRoots};
pub use session::SyncSession;
pub use settle::SettleWindow;
pub use stability::StabilityProber;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::events::{SyncDirection, SyncNotice};
    pub use crate::session::SyncSession;
}
