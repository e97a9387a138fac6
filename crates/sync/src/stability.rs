//! Write-completion detection by size/mtime quiescence
//!
//! Writers are trusted local processes (editors, the container runtime), so
//! two identical size/mtime snapshots taken a probe interval apart are taken
//! as "the writer is done". This is the portable substitute for advisory
//! locks.

use devbridge_core::SyncConfig;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::time::sleep;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    size: u64,
    modified: Option<SystemTime>,
}

async fn snapshot(path: &Path) -> Option<Snapshot> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    Some(Snapshot {
        size: metadata.len(),
        modified: metadata.modified().ok(),
    })
}

/// Decides whether a file is safe to read and copy
#[derive(Debug, Clone)]
pub struct StabilityProber {
    probe_interval: Duration,
    retry_delay: Duration,
    max_attempts: u32,
    max_empty_waits: u32,
}

impl StabilityProber {
    pub fn new(
        probe_interval: Duration,
        retry_delay: Duration,
        max_attempts: u32,
        max_empty_waits: u32,
    ) -> Self {
        Self {
            probe_interval,
            retry_delay,
            max_attempts,
            max_empty_waits,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.stability_probe_interval(),
            config.stability_retry_delay(),
            config.stability_max_attempts,
            config.stability_max_empty_waits,
        )
    }

    /// Wait until `path` has stopped changing
    ///
    /// Each attempt takes two snapshots one probe interval apart; identical
    /// snapshots mean stable. A zero-size file is treated as still being
    /// created: it waits one probe interval without spending an attempt, up
    /// to `max_empty_waits` times. Returns `false` if the file is missing or
    /// every attempt saw it change.
    pub async fn await_stable(&self, path: &Path) -> bool {
        let mut attempt = 0;
        let mut empty_waits = 0;

        while attempt < self.max_attempts {
            let Some(before) = snapshot(path).await else {
                trace!("{:?} vanished before stability probe", path);
                return false;
            };

            if before.size == 0 {
                if empty_waits >= self.max_empty_waits {
                    info!("Skipping {:?}: still empty after waiting for content", path);
                    return false;
                }
                empty_waits += 1;
                sleep(self.probe_interval).await;
                continue;
            }

            sleep(self.probe_interval).await;

            let Some(after) = snapshot(path).await else {
                trace!("{:?} vanished during stability probe", path);
                return false;
            };

            if before == after {
                return true;
            }

            attempt += 1;
            trace!(
                "{:?} still changing (attempt {}/{})",
                path,
                attempt,
                self.max_attempts
            );
            if attempt < self.max_attempts {
                sleep(self.retry_delay).await;
            }
        }

        debug!(
            "{:?} did not settle after {} attempts",
            path, self.max_attempts
        );
        false
    }
}

impl Default for StabilityProber {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
