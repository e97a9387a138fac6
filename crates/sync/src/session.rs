//! A running sync between one source root and one target root

use crate::debouncer::ChangeDebouncer;
use crate::events::SyncNotice;
use crate::executor::SyncExecutor;
use crate::fingerprint::FingerprintStore;
use crate::ignore::IgnoreFilter;
use crate::locks::LockRegistry;
use crate::roots::SyncRoots;
use crate::stability::StabilityProber;
use crate::watcher::WatchCoordinator;
use devbridge_core::error::{Error, Result};
use devbridge_core::SyncConfig;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::info;

const NOTICE_CAPACITY: usize = 256;

/// Owns every component of one sync session
///
/// Nothing is shared between sessions. Dropping a session stops it.
pub struct SyncSession {
    roots: SyncRoots,
    fingerprints: FingerprintStore,
    locks: LockRegistry,
    debouncer: ChangeDebouncer,
    coordinator: Option<WatchCoordinator>,
    notices: broadcast::Sender<SyncNotice>,
    cancel: CancellationToken,
}

impl SyncSession {
    /// Validate the roots and start watching both of them
    ///
    /// Must be called inside a Tokio runtime. On failure nothing is left
    /// running.
    pub async fn start(source: &Path, target: &Path, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        let roots = SyncRoots::resolve(source, target).await?;
        let ignore_filter = IgnoreFilter::from_config(&config)
            .map_err(|e| Error::config(format!("Invalid ignore pattern: {e}")))?;

        let fingerprints = FingerprintStore::new();
        let locks = LockRegistry::from_config(&config);
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        let cancel = CancellationToken::new();

        let executor = SyncExecutor::new(
            roots.clone(),
            fingerprints.clone(),
            locks.clone(),
            StabilityProber::from_config(&config),
            config.release_delay(),
            notices.clone(),
        );
        let debouncer = ChangeDebouncer::new(
            roots.clone(),
            fingerprints.clone(),
            locks.clone(),
            Arc::new(executor),
            &config,
            cancel.clone(),
        );

        // Nothing is scheduled before the coordinator runs, and a failed
        // coordinator start tears down its own tasks
        let coordinator = WatchCoordinator::start(
            roots.clone(),
            ignore_filter,
            &config,
            debouncer.clone(),
            cancel.clone(),
        )?;

        let session = Self {
            roots,
            fingerprints,
            locks,
            debouncer,
            coordinator: Some(coordinator),
            notices,
            cancel,
        };

        info!(
            "Sync started: {} <-> {}",
            session.roots.source().display(),
            session.roots.target().display()
        );
        Ok(session)
    }

    /// Stop watching, cancel every pending timer and forget all state
    ///
    /// Calling this more than once is a no-op.
    pub fn stop(&mut self) {
        let Some(mut coordinator) = self.coordinator.take() else {
            return;
        };

        self.cancel.cancel();
        coordinator.stop();
        self.debouncer.cancel_all();
        self.locks.shutdown();
        self.fingerprints.clear();

        info!(
            "Sync stopped: {} <-> {}",
            self.roots.source().display(),
            self.roots.target().display()
        );
    }

    pub fn is_running(&self) -> bool {
        self.coordinator.is_some()
    }

    /// Receive a notice for every completed copy
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.notices.subscribe()
    }

    pub fn source_root(&self) -> &Path {
        self.roots.source()
    }

    pub fn target_root(&self) -> &Path {
        self.roots.target()
    }

    pub fn roots(&self) -> &SyncRoots {
        &self.roots
    }

    pub fn fingerprints(&self) -> &FingerprintStore {
        &self.fingerprints
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Get the number of debounced syncs waiting to fire
    pub fn pending_count(&self) -> usize {
        self.debouncer.pending_count()
    }
}

impl Drop for SyncSession {
    fn drop(&mut self) {
        self.stop();
    }
}
