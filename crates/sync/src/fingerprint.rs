//! Content fingerprints of last-known-synchronized files
//!
//! Hashes are for change detection only. A file that cannot be read right now
//! (missing, permission denied, half-written) has no hash, and a path without
//! a hash is never reported as changed.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, trace};
use twox_hash::XxHash3_128;

/// 128-bit content digest
pub type ContentHash = u128;

/// Fingerprint recorded after a successful sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintEntry {
    pub hash: ContentHash,
    pub recorded_at: Instant,
}

/// Hash the full contents of `path`
///
/// Returns `None` on any I/O error rather than failing; callers treat that
/// as "cannot currently verify, skip".
pub async fn compute_hash(path: &Path) -> Option<ContentHash> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(XxHash3_128::oneshot(&bytes)),
        Err(e) => {
            trace!("Cannot hash {:?}: {}", path, e);
            None
        }
    }
}

/// Absolute path → fingerprint of its last synchronized content
#[derive(Debug, Clone, Default)]
pub struct FingerprintStore {
    entries: Arc<DashMap<PathBuf, FingerprintEntry>>,
}

impl FingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the file's current content differs from its fingerprint
    ///
    /// Unknown paths with readable content count as changed.
    pub async fn has_changed(&self, path: &Path) -> bool {
        let Some(current) = compute_hash(path).await else {
            return false;
        };

        match self.entries.get(path) {
            Some(entry) => entry.hash != current,
            None => true,
        }
    }

    /// Store the file's current hash
    pub async fn record_synced(&self, path: &Path) -> Option<ContentHash> {
        let hash = compute_hash(path).await?;
        self.entries.insert(
            path.to_path_buf(),
            FingerprintEntry {
                hash,
                recorded_at: Instant::now(),
            },
        );
        Some(hash)
    }

    /// Store fingerprints for both ends of a copy, if they still match
    ///
    /// Both files are re-hashed from disk. If either side changed after the
    /// copy (or vanished), nothing is committed and the next event for the
    /// path re-detects the change.
    pub async fn record_pair_synced(&self, a: &Path, b: &Path) -> bool {
        let (hash_a, hash_b) = tokio::join!(compute_hash(a), compute_hash(b));

        match (hash_a, hash_b) {
            (Some(hash_a), Some(hash_b)) if hash_a == hash_b => {
                let entry = FingerprintEntry {
                    hash: hash_a,
                    recorded_at: Instant::now(),
                };
                self.entries.insert(a.to_path_buf(), entry);
                self.entries.insert(b.to_path_buf(), entry);
                true
            }
            _ => {
                debug!(
                    "Not recording fingerprints for {:?} / {:?}: contents diverged after copy",
                    a, b
                );
                false
            }
        }
    }

    pub fn get(&self, path: &Path) -> Option<FingerprintEntry> {
        self.entries.get(path).map(|entry| *entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
