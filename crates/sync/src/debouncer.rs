//! Change debouncing per (path, direction)
//!
//! Events first pass three gates: the key is not locked, the engine did not
//! write it moments ago, and its content actually differs from the last
//! synced fingerprint. Survivors are scheduled after a direction-dependent
//! delay; a newer event for the same (path, direction) aborts and replaces
//! the pending one.

use crate::deferred::DeferredTasks;
use crate::events::SyncDirection;
use crate::fingerprint::FingerprintStore;
use crate::locks::LockRegistry;
use crate::roots::SyncRoots;
use async_trait::async_trait;
use devbridge_core::SyncConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Receives debounced changes
#[async_trait]
pub trait SyncHandler: Send + Sync + 'static {
    async fn handle(&self, path: PathBuf, direction: SyncDirection);
}

/// Coalesces bursts of events into single scheduled syncs
#[derive(Clone)]
pub struct ChangeDebouncer {
    roots: SyncRoots,
    fingerprints: FingerprintStore,
    locks: LockRegistry,
    handler: Arc<dyn SyncHandler>,
    pending: DeferredTasks<(PathBuf, SyncDirection)>,
    source_to_target_delay: Duration,
    target_to_source_delay: Duration,
    touched_window: Duration,
    cancel: CancellationToken,
}

impl ChangeDebouncer {
    pub fn new(
        roots: SyncRoots,
        fingerprints: FingerprintStore,
        locks: LockRegistry,
        handler: Arc<dyn SyncHandler>,
        config: &SyncConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            roots,
            fingerprints,
            locks,
            handler,
            pending: DeferredTasks::new(),
            source_to_target_delay: config.source_to_target_delay(),
            target_to_source_delay: config.target_to_source_delay(),
            touched_window: config.recently_touched_window(),
            cancel,
        }
    }

    /// Delay before a change in `direction` is synced
    pub fn delay_for(&self, direction: SyncDirection) -> Duration {
        match direction {
            SyncDirection::SourceToTarget => self.source_to_target_delay,
            SyncDirection::TargetToSource => self.target_to_source_delay,
        }
    }

    /// Gate an incoming change and schedule it if it survives
    ///
    /// Returns whether a sync was scheduled.
    pub async fn on_event(&self, path: PathBuf, direction: SyncDirection) -> bool {
        let Some(key) = self.roots.relative(&path, direction) else {
            trace!("{:?} is not under the {} origin root", path, direction);
            return false;
        };

        if self.locks.is_blocked(&key) {
            debug!("Dropping event for {:?}: sync in progress or just finished", key);
            return false;
        }

        if self.locks.was_recently_touched(&key, self.touched_window) {
            debug!("Dropping event for {:?}: written by the engine moments ago", key);
            return false;
        }

        if !self.fingerprints.has_changed(&path).await {
            trace!("Dropping event for {:?}: content unchanged", path);
            return false;
        }

        self.schedule(path, direction);
        true
    }

    /// Schedule a sync, superseding any pending one for the same key
    pub fn schedule(&self, path: PathBuf, direction: SyncDirection) {
        if self.cancel.is_cancelled() {
            return;
        }

        let delay = self.delay_for(direction);
        debug!(
            "Scheduling {} sync of {:?} in {:?}",
            direction, path, delay
        );

        let handler = Arc::clone(&self.handler);
        let cancel = self.cancel.clone();
        let key = (path.clone(), direction);
        self.pending.schedule(key, delay, move || async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = handler.handle(path, direction) => {}
            }
        });
    }

    /// Get the number of scheduled syncs that have not fired
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Abort every scheduled sync
    pub fn cancel_all(&self) {
        debug!("Cancelling {} pending syncs", self.pending.len());
        self.pending.cancel_all();
    }
}
