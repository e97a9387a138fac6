//! Write-settle window in front of the change debouncer
//!
//! A path is only forwarded once the filesystem has been quiet on it for the
//! whole window; every new event for the path restarts its timer. This is
//! the coarse first-line filter, the stability prober is the fine one.

use crate::deferred::DeferredTasks;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Per-path quiet-period timers
pub struct SettleWindow {
    window: Duration,
    pending: DeferredTasks<PathBuf>,
    output_tx: mpsc::Sender<PathBuf>,
}

impl SettleWindow {
    /// Create a settle window that emits settled paths on `output_tx`
    pub fn new(window: Duration, output_tx: mpsc::Sender<PathBuf>) -> Self {
        Self {
            window,
            pending: DeferredTasks::new(),
            output_tx,
        }
    }

    /// Record activity on `path`, restarting its quiet period
    pub fn observe(&self, path: PathBuf) {
        if self.pending.contains(&path) {
            trace!("Restarting settle window for {:?}", path);
        }

        let output_tx = self.output_tx.clone();
        let settled = path.clone();
        self.pending.schedule(path, self.window, move || async move {
            debug!("{:?} settled", settled);
            let _ = output_tx.send(settled).await;
        });
    }

    /// Get the number of paths still settling
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every path still settling
    pub fn cancel_all(&self) {
        self.pending.cancel_all();
    }
}
