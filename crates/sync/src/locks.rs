//! Per-path sync locks and anti-feedback windows
//!
//! Keys are root-relative paths, so the source and target copies of a file
//! share one lock. A sync marks its key active and recently-synced. The
//! active flag is cleared by the executor's release, or unconditionally by a
//! safety timer; the recently-synced mark outlives it by a grace window so
//! the watch event caused by the sync's own write is swallowed.
//!
//! Each key's state is read and written under its `DashMap` shard lock.

use crate::deferred::DeferredTasks;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use devbridge_core::SyncConfig;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default)]
struct LockState {
    active: bool,
    recently_synced: bool,
    last_synced: Option<Instant>,
}

impl LockState {
    fn acquired() -> Self {
        Self {
            active: true,
            recently_synced: true,
            last_synced: Some(Instant::now()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TimerKind {
    /// Safety bound on the active flag
    AutoRelease,
    /// Executor's post-sync cool-down
    Release,
    /// End of the recently-synced grace window
    RecentExpiry,
}

struct Inner {
    states: DashMap<PathBuf, LockState>,
    timers: DeferredTasks<(PathBuf, TimerKind)>,
    active_timeout: Duration,
    recent_window: Duration,
    touch_window: Duration,
    shut_down: AtomicBool,
}

/// Tracks which paths are syncing or were synced moments ago
#[derive(Clone)]
pub struct LockRegistry {
    inner: Arc<Inner>,
}

impl LockRegistry {
    /// Create a registry
    ///
    /// `active_timeout` bounds how long a lock can stay active without an
    /// explicit release; `recent_window` is how long a key stays blocked
    /// after release. Touch stamps are kept for `recent_window` too.
    pub fn new(active_timeout: Duration, recent_window: Duration) -> Self {
        Self::with_touch_window(active_timeout, recent_window, recent_window)
    }

    /// Create a registry that keeps touch stamps for at least `touch_window`
    pub fn with_touch_window(
        active_timeout: Duration,
        recent_window: Duration,
        touch_window: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                states: DashMap::new(),
                timers: DeferredTasks::new(),
                active_timeout,
                recent_window,
                touch_window,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::with_touch_window(
            config.active_lock_timeout(),
            config.recently_synced_window(),
            config.recently_touched_window(),
        )
    }

    /// Mark `key` as actively syncing, whatever its current state
    pub fn acquire(&self, key: &Path) {
        if self.is_shut_down() {
            return;
        }

        self.inner
            .states
            .entry(key.to_path_buf())
            .and_modify(|state| *state = LockState::acquired())
            .or_insert_with(LockState::acquired);

        self.start_lifecycle(key);
    }

    /// Mark `key` as actively syncing unless it is already blocked
    ///
    /// The check and the update happen under one shard lock, so of two
    /// concurrent callers for the same key exactly one wins.
    pub fn try_acquire(&self, key: &Path) -> bool {
        if self.is_shut_down() {
            return false;
        }

        let acquired = match self.inner.states.entry(key.to_path_buf()) {
            Entry::Occupied(mut occupied) => {
                let state = occupied.get_mut();
                if state.active || state.recently_synced {
                    false
                } else {
                    *state = LockState::acquired();
                    true
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LockState::acquired());
                true
            }
        };

        if acquired {
            self.start_lifecycle(key);
        }
        acquired
    }

    fn start_lifecycle(&self, key: &Path) {
        // A new sync restarts the whole lock lifecycle.
        self.cancel_timer(key, TimerKind::Release);
        self.cancel_timer(key, TimerKind::RecentExpiry);
        self.schedule_timer(key, TimerKind::AutoRelease, self.inner.active_timeout);
        debug!("Acquired sync lock for {:?}", key);
    }

    /// Clear the active flag and start the recently-synced grace window
    pub fn release_active(&self, key: &Path) {
        if self.is_shut_down() {
            return;
        }

        let Some(mut state) = self.inner.states.get_mut(key) else {
            return;
        };
        state.active = false;
        drop(state);

        self.cancel_timer(key, TimerKind::AutoRelease);
        self.schedule_timer(key, TimerKind::RecentExpiry, self.inner.recent_window);
        debug!("Released sync lock for {:?}", key);
    }

    /// Release `key` after `delay`, as a registry-owned timer
    pub fn schedule_release(&self, key: &Path, delay: Duration) {
        if self.is_shut_down() {
            return;
        }
        self.schedule_timer(key, TimerKind::Release, delay);
    }

    /// Stamp `key` as just written by the engine
    pub fn touch(&self, key: &Path) {
        if let Some(mut state) = self.inner.states.get_mut(key) {
            state.last_synced = Some(Instant::now());
        }
    }

    /// Actively syncing or inside the recently-synced window
    pub fn is_blocked(&self, key: &Path) -> bool {
        self.inner
            .states
            .get(key)
            .map(|state| state.active || state.recently_synced)
            .unwrap_or(false)
    }

    pub fn is_active(&self, key: &Path) -> bool {
        self.inner
            .states
            .get(key)
            .map(|state| state.active)
            .unwrap_or(false)
    }

    /// Whether the engine synced `key` less than `window` ago
    pub fn was_recently_touched(&self, key: &Path, window: Duration) -> bool {
        self.inner
            .states
            .get(key)
            .and_then(|state| state.last_synced)
            .map(|at| at.elapsed() < window)
            .unwrap_or(false)
    }

    /// Number of keys with lock state
    pub fn tracked_keys(&self) -> usize {
        self.inner.states.len()
    }

    /// Number of pending lock timers
    pub fn outstanding_timers(&self) -> usize {
        self.inner.timers.len()
    }

    /// Abort every timer and forget all state
    ///
    /// Idempotent. After shutdown the registry ignores new acquisitions.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.timers.cancel_all();
        self.inner.states.clear();
        debug!("Lock registry shut down");
    }

    fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// End the grace window and forget the key once its touch stamp is stale
    fn expire_recent(&self, key: &Path) {
        let touch_left = {
            let Some(mut state) = self.inner.states.get_mut(key) else {
                return;
            };
            if state.active {
                return;
            }
            state.recently_synced = false;
            let last_synced = state.last_synced;
            last_synced
                .and_then(|at| self.inner.touch_window.checked_sub(at.elapsed()))
                .filter(|left| !left.is_zero())
        };

        match touch_left {
            Some(left) => self.schedule_timer(key, TimerKind::RecentExpiry, left),
            None => {
                self.inner
                    .states
                    .remove_if(key, |_, state| !state.active && !state.recently_synced);
            }
        }
    }

    fn cancel_timer(&self, key: &Path, kind: TimerKind) {
        self.inner.timers.cancel(&(key.to_path_buf(), kind));
    }

    fn schedule_timer(&self, key: &Path, kind: TimerKind, delay: Duration) {
        // Timers hold the registry weakly so a dropped registry takes its
        // pending timers' effects with it.
        let registry: Weak<Inner> = Arc::downgrade(&self.inner);
        let path = key.to_path_buf();

        self.inner
            .timers
            .schedule((path.clone(), kind), delay, move || async move {
                let Some(inner) = registry.upgrade() else {
                    return;
                };
                let registry = LockRegistry { inner };
                match kind {
                    TimerKind::AutoRelease => {
                        warn!(
                            "Sync lock for {:?} was never released, releasing after safety timeout",
                            path
                        );
                        registry.release_active(&path);
                    }
                    TimerKind::Release => registry.release_active(&path),
                    TimerKind::RecentExpiry => registry.expire_recent(&path),
                }
            });
    }
}
