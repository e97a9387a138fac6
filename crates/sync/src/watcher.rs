//! Watching both trees and feeding the change debouncer
//!
//! Raw notify events are filtered (ignored paths, removals, metadata-only
//! changes) and pushed through the settle window. Settled paths are checked
//! once more against the filesystem, classified by root and handed to the
//! debouncer. A settled directory is scanned, since files created together
//! with a directory can land before the watch on it exists.

use crate::debouncer::ChangeDebouncer;
use crate::ignore::IgnoreFilter;
use crate::roots::SyncRoots;
use crate::settle::SettleWindow;
use devbridge_core::error::{Error, Result};
use devbridge_core::SyncConfig;
use notify::event::ModifyKind;
use notify::{
    Config as NotifyConfig, Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode,
    Watcher as NotifyWatcher,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use walkdir::WalkDir;

/// Observes the source and target roots
pub struct WatchCoordinator {
    roots: SyncRoots,
    watcher: Option<RecommendedWatcher>,
    settle: Arc<SettleWindow>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl WatchCoordinator {
    /// Start observing both roots
    ///
    /// If either root cannot be watched, everything started so far is torn
    /// down before the error is returned.
    pub fn start(
        roots: SyncRoots,
        ignore_filter: IgnoreFilter,
        config: &SyncConfig,
        debouncer: ChangeDebouncer,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let (notify_tx, notify_rx) = mpsc::channel(config.event_queue_size);
        let (settled_tx, settled_rx) = mpsc::channel(config.event_queue_size);

        let settle = Arc::new(SettleWindow::new(config.settle_window(), settled_tx));
        let ignore_filter = Arc::new(ignore_filter);

        let mut coordinator = Self {
            roots,
            watcher: None,
            settle,
            tasks: Vec::new(),
            cancel,
        };

        let processor = coordinator.spawn_event_processor(notify_rx, Arc::clone(&ignore_filter));
        let dispatcher = coordinator.spawn_dispatcher(settled_rx, ignore_filter, debouncer);
        coordinator.tasks.extend([processor, dispatcher]);

        if let Err(e) = coordinator.watch_roots(notify_tx) {
            coordinator.stop();
            return Err(e);
        }

        Ok(coordinator)
    }

    fn watch_roots(&mut self, tx: mpsc::Sender<NotifyEvent>) -> Result<()> {
        let mut watcher = create_notify_watcher(tx)?;

        for root in [self.roots.source(), self.roots.target()] {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| Error::watcher(format!("Failed to watch path {root:?}: {e}")))?;
            info!("Watching {:?}", root);
        }

        self.watcher = Some(watcher);
        Ok(())
    }

    /// Filter raw events and feed them to the settle window
    fn spawn_event_processor(
        &self,
        mut notify_rx: mpsc::Receiver<NotifyEvent>,
        ignore_filter: Arc<IgnoreFilter>,
    ) -> JoinHandle<()> {
        let roots = self.roots.clone();
        let settle = Arc::clone(&self.settle);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = notify_rx.recv() => {
                        let Some(event) = event else { break };
                        trace!("Received notify event: {:?}", event);
                        for path in relevant_paths(&event, &roots, &ignore_filter) {
                            settle.observe(path);
                        }
                    }
                }
            }
            debug!("Event processor stopped");
        })
    }

    /// Hand settled paths to the debouncer
    fn spawn_dispatcher(
        &self,
        mut settled_rx: mpsc::Receiver<PathBuf>,
        ignore_filter: Arc<IgnoreFilter>,
        debouncer: ChangeDebouncer,
    ) -> JoinHandle<()> {
        let roots = self.roots.clone();
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    path = settled_rx.recv() => {
                        let Some(path) = path else { break };
                        for file in settled_files(path, &roots, &ignore_filter).await {
                            dispatch(file, &roots, &debouncer);
                        }
                    }
                }
            }
            debug!("Dispatcher stopped");
        })
    }

    /// Stop watching and abort background work
    pub fn stop(&mut self) {
        self.cancel.cancel();
        // Dropping the notify watcher unregisters its watches
        if self.watcher.take().is_some() {
            info!("Stopped watching {:?} and {:?}", self.roots.source(), self.roots.target());
        }
        self.settle.cancel_all();
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for WatchCoordinator {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Create a notify watcher that forwards into `tx`
fn create_notify_watcher(tx: mpsc::Sender<NotifyEvent>) -> Result<RecommendedWatcher> {
    RecommendedWatcher::new(
        move |res: std::result::Result<NotifyEvent, notify::Error>| match res {
            Ok(event) => {
                if let Err(e) = tx.try_send(event) {
                    warn!("Dropping filesystem event: {}", e);
                }
            }
            Err(e) => {
                error!("Notify error: {}", e);
            }
        },
        NotifyConfig::default(),
    )
    .map_err(|e| Error::watcher(format!("Failed to create watcher: {e}")))
}

/// Whether an event kind can mean "file added or changed"
fn is_add_or_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

/// Paths of an event worth settling
fn relevant_paths(
    event: &NotifyEvent,
    roots: &SyncRoots,
    ignore_filter: &IgnoreFilter,
) -> Vec<PathBuf> {
    if !is_add_or_change(&event.kind) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter(|path| !is_ignored(path, roots, ignore_filter))
        .cloned()
        .collect()
}

fn is_ignored(path: &Path, roots: &SyncRoots, ignore_filter: &IgnoreFilter) -> bool {
    let Some(direction) = roots.classify(path) else {
        return true;
    };
    match roots.relative(path, direction) {
        Some(relative) => ignore_filter.should_ignore(&relative),
        None => true,
    }
}

/// Files behind a settled path: the file itself, or everything under a
/// directory. Vanished paths yield nothing.
async fn settled_files(
    path: PathBuf,
    roots: &SyncRoots,
    ignore_filter: &Arc<IgnoreFilter>,
) -> Vec<PathBuf> {
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) => metadata,
        Err(_) => {
            trace!("{:?} vanished before dispatch", path);
            return Vec::new();
        }
    };

    if metadata.is_file() {
        return vec![path];
    }
    if !metadata.is_dir() {
        return Vec::new();
    }

    let roots = roots.clone();
    let ignore_filter = Arc::clone(ignore_filter);
    let scan = tokio::task::spawn_blocking(move || {
        WalkDir::new(&path)
            .into_iter()
            .filter_entry(|entry| !is_ignored(entry.path(), &roots, &ignore_filter))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>()
    });

    match scan.await {
        Ok(files) => {
            debug!("Scanned new directory, {} files", files.len());
            files
        }
        Err(e) => {
            warn!("Directory scan failed: {}", e);
            Vec::new()
        }
    }
}

fn dispatch(path: PathBuf, roots: &SyncRoots, debouncer: &ChangeDebouncer) {
    let Some(direction) = roots.classify(&path) else {
        return;
    };
    // Gating hashes the file; keep that off the dispatcher loop
    let debouncer = debouncer.clone();
    tokio::spawn(async move {
        debouncer.on_event(path, direction).await;
    });
}
