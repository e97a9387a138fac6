//! One sync cycle: lock, probe, compare, copy, fingerprint, release
//!
//! `execute` never fails. Source-side races (file vanished, still being
//! written, unreadable) are dropped quietly and left to the next event;
//! destination failures are reported as warnings. Whatever happens after the
//! lock is taken, its release is scheduled on the way out.

use crate::debouncer::SyncHandler;
use crate::events::{SkipReason, SyncDirection, SyncNotice, SyncOutcome};
use crate::fingerprint::FingerprintStore;
use crate::locks::LockRegistry;
use crate::roots::{SyncPaths, SyncRoots};
use crate::stability::StabilityProber;
use async_trait::async_trait;
use devbridge_core::error::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

/// Schedules the lock release when dropped, so early returns and cancelled
/// futures still release
struct ReleaseGuard<'a> {
    locks: &'a LockRegistry,
    key: &'a Path,
    delay: Duration,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        self.locks.schedule_release(self.key, self.delay);
    }
}

/// Copies changed files between the two roots
pub struct SyncExecutor {
    roots: SyncRoots,
    fingerprints: FingerprintStore,
    locks: LockRegistry,
    prober: StabilityProber,
    release_delay: Duration,
    notices: broadcast::Sender<SyncNotice>,
}

impl SyncExecutor {
    pub fn new(
        roots: SyncRoots,
        fingerprints: FingerprintStore,
        locks: LockRegistry,
        prober: StabilityProber,
        release_delay: Duration,
        notices: broadcast::Sender<SyncNotice>,
    ) -> Self {
        Self {
            roots,
            fingerprints,
            locks,
            prober,
            release_delay,
            notices,
        }
    }

    /// Sync `path` in `direction`
    pub async fn execute(&self, path: &Path, direction: SyncDirection) -> SyncOutcome {
        let Some(paths) = self.roots.resolve_paths(path, direction) else {
            debug!("{:?} is outside the {} origin root", path, direction);
            return SyncOutcome::Skipped(SkipReason::OutsideRoot);
        };

        // Locked by a sync in either direction, possibly one that started
        // between scheduling and firing
        if !self.locks.try_acquire(&paths.relative) {
            trace!("{:?} is locked, skipping", paths.relative);
            return SyncOutcome::Skipped(SkipReason::Blocked);
        }
        let _release = ReleaseGuard {
            locks: &self.locks,
            key: &paths.relative,
            delay: self.release_delay,
        };

        match self.sync_locked(&paths, direction).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_destination_failure() => {
                warn!("Could not sync {} ({}): {}", paths.relative.display(), direction, e);
                SyncOutcome::Failed(e.to_string())
            }
            Err(e) => {
                debug!("Dropped sync of {:?}: {}", paths.relative, e);
                SyncOutcome::Failed(e.to_string())
            }
        }
    }

    async fn sync_locked(&self, paths: &SyncPaths, direction: SyncDirection) -> Result<SyncOutcome> {
        if !self.prober.await_stable(&paths.read_from).await {
            debug!("{:?} never settled, waiting for the next change", paths.read_from);
            return Ok(SyncOutcome::Skipped(SkipReason::Unstable));
        }

        if !self.fingerprints.has_changed(&paths.read_from).await {
            trace!("{:?} matches its fingerprint", paths.read_from);
            return Ok(SyncOutcome::Skipped(SkipReason::Unchanged));
        }

        if let Some(parent) = paths.write_to.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::destination_write(parent, e))?;
        }

        let bytes = copy_contents(&paths.read_from, &paths.write_to).await?;

        self.fingerprints
            .record_pair_synced(&paths.read_from, &paths.write_to)
            .await;
        self.locks.touch(&paths.relative);

        let notice = SyncNotice {
            direction,
            relative_path: paths.relative.clone(),
            bytes,
        };
        info!("{}", notice);
        // No subscribers is fine
        let _ = self.notices.send(notice);

        Ok(SyncOutcome::Copied { bytes })
    }
}

/// Whole-file copy, keeping read and write failures apart
async fn copy_contents(read_from: &Path, write_to: &Path) -> Result<u64> {
    let contents = tokio::fs::read(read_from)
        .await
        .map_err(|e| Error::source_read(read_from, e))?;
    tokio::fs::write(write_to, &contents)
        .await
        .map_err(|e| Error::destination_write(write_to, e))?;
    Ok(contents.len() as u64)
}

#[async_trait]
impl SyncHandler for SyncExecutor {
    async fn handle(&self, path: PathBuf, direction: SyncDirection) {
        let outcome = self.execute(&path, direction).await;
        trace!("Sync of {:?} finished: {:?}", path, outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use tokio::time::sleep;

    struct Fixture {
        _source: TempDir,
        _target: TempDir,
        roots: SyncRoots,
        fingerprints: FingerprintStore,
        locks: LockRegistry,
        executor: SyncExecutor,
        notices: broadcast::Receiver<SyncNotice>,
    }

    fn fixture() -> Fixture {
        let source = TempDir::new().expect("test setup failed");
        let target = TempDir::new().expect("test setup failed");
        let roots = SyncRoots::new(source.path(), target.path());
        let fingerprints = FingerprintStore::new();
        let locks = LockRegistry::new(Duration::from_secs(2), Duration::from_millis(50));
        let prober = StabilityProber::new(
            Duration::from_millis(30),
            Duration::from_millis(30),
            3,
            2,
        );
        let (tx, notices) = broadcast::channel(16);
        let executor = SyncExecutor::new(
            roots.clone(),
            fingerprints.clone(),
            locks.clone(),
            prober,
            Duration::from_millis(20),
            tx,
        );
        Fixture {
            _source: source,
            _target: target,
            roots,
            fingerprints,
            locks,
            executor,
            notices,
        }
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("test setup failed");
        }
        std::fs::write(path, content).expect("test setup failed");
    }

    // Both fingerprints are committed only through `record_pair_synced`,
    // which re-hashes both ends. Its refusal to record a diverged pair is
    // covered in `fingerprint::tests::test_record_pair_synced_diverged`; no
    // filesystem hook lands a write between copy and re-hash reliably.
    #[tokio::test]
    async fn test_copies_source_to_target() {
        let mut fx = fixture();
        let source_file = fx.roots.source().join("theme/style.css");
        let target_file = fx.roots.target().join("theme/style.css");
        write(&source_file, "A");

        let outcome = fx
            .executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        assert_eq!(outcome, SyncOutcome::Copied { bytes: 1 });
        assert_eq!(
            std::fs::read_to_string(&target_file).expect("test setup failed"),
            "A"
        );

        let source_entry = fx.fingerprints.get(&source_file).expect("test setup failed");
        let target_entry = fx.fingerprints.get(&target_file).expect("test setup failed");
        assert_eq!(source_entry.hash, target_entry.hash);

        let notice = fx.notices.try_recv().expect("test setup failed");
        assert_eq!(
            notice,
            SyncNotice {
                direction: SyncDirection::SourceToTarget,
                relative_path: PathBuf::from("theme/style.css"),
                bytes: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_copies_target_to_source() {
        let fx = fixture();
        let target_file = fx.roots.target().join("wp-content/uploads/a.txt");
        write(&target_file, "uploaded");

        let outcome = fx
            .executor
            .execute(&target_file, SyncDirection::TargetToSource)
            .await;
        assert!(outcome.is_copied());
        assert_eq!(
            std::fs::read_to_string(fx.roots.source().join("wp-content/uploads/a.txt"))
                .expect("test setup failed"),
            "uploaded"
        );
    }

    #[tokio::test]
    async fn test_lock_released_after_delay() {
        let fx = fixture();
        let source_file = fx.roots.source().join("a.txt");
        write(&source_file, "a");
        let key = Path::new("a.txt");

        fx.executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        assert!(fx.locks.is_active(key));
        assert!(fx.locks.was_recently_touched(key, Duration::from_secs(3)));

        // 20ms release delay, then the 50ms recently-synced window
        sleep(Duration::from_millis(50)).await;
        assert!(!fx.locks.is_active(key));
        assert!(fx.locks.is_blocked(key));
        sleep(Duration::from_millis(100)).await;
        assert!(!fx.locks.is_blocked(key));
    }

    #[tokio::test]
    async fn test_unchanged_file_is_not_copied_again() {
        let fx = fixture();
        let source_file = fx.roots.source().join("a.txt");
        let target_file = fx.roots.target().join("a.txt");
        write(&source_file, "a");

        fx.executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        let first = fx.fingerprints.get(&source_file).expect("test setup failed");
        let target_modified = std::fs::metadata(&target_file)
            .and_then(|m| m.modified())
            .expect("test setup failed");

        sleep(Duration::from_millis(150)).await;
        assert!(!fx.locks.is_blocked(Path::new("a.txt")));

        let outcome = fx
            .executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Unchanged));
        assert_eq!(fx.fingerprints.get(&source_file), Some(first));
        assert_eq!(
            std::fs::metadata(&target_file)
                .and_then(|m| m.modified())
                .expect("test setup failed"),
            target_modified
        );
    }

    #[tokio::test]
    async fn test_blocked_path_is_skipped() {
        let fx = fixture();
        let source_file = fx.roots.source().join("a.txt");
        write(&source_file, "a");
        fx.locks.acquire(Path::new("a.txt"));

        let outcome = fx
            .executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Blocked));
        assert!(!fx.roots.target().join("a.txt").exists());
    }

    #[tokio::test]
    async fn test_missing_file_is_unstable() {
        let fx = fixture();
        let outcome = fx
            .executor
            .execute(
                &fx.roots.source().join("gone.txt"),
                SyncDirection::SourceToTarget,
            )
            .await;
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Unstable));
    }

    #[tokio::test]
    async fn test_outside_root_is_skipped() {
        let fx = fixture();
        let outcome = fx
            .executor
            .execute(Path::new("/somewhere/else.txt"), SyncDirection::SourceToTarget)
            .await;
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::OutsideRoot));
    }

    #[tokio::test]
    async fn test_destination_failure_is_absorbed_and_released() {
        let fx = fixture();
        let source_file = fx.roots.source().join("theme/style.css");
        write(&source_file, "A");
        // A file where the destination directory should be
        write(&fx.roots.target().join("theme"), "not a directory");

        let outcome = fx
            .executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        assert!(matches!(outcome, SyncOutcome::Failed(_)));
        assert!(fx.fingerprints.is_empty());

        sleep(Duration::from_millis(50)).await;
        assert!(!fx.locks.is_active(Path::new("theme/style.css")));
    }

    #[tokio::test]
    async fn test_handler_delegates_to_execute() {
        let fx = fixture();
        let source_file = fx.roots.source().join("a.txt");
        write(&source_file, "a");

        fx.executor
            .handle(source_file, SyncDirection::SourceToTarget)
            .await;
        assert!(fx.roots.target().join("a.txt").exists());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_growing_file_is_not_copied_until_writes_stop() {
        let fx = fixture();
        let source_file = fx.roots.source().join("uploads/video.bin");
        let target_file = fx.roots.target().join("uploads/video.bin");
        write(&source_file, "start\n");

        // Appends every 10ms for ~600ms, well past the probe budget
        let writer = {
            let path = source_file.clone();
            std::thread::spawn(move || {
                use std::io::Write;
                let mut file = std::fs::OpenOptions::new()
                    .append(true)
                    .open(&path)
                    .expect("test setup failed");
                for _ in 0..60 {
                    file.write_all(b"chunk\n").expect("test setup failed");
                    file.flush().expect("test setup failed");
                    std::thread::sleep(Duration::from_millis(10));
                }
            })
        };

        let outcome = fx
            .executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        assert_eq!(outcome, SyncOutcome::Skipped(SkipReason::Unstable));
        assert!(!target_file.exists());
        assert!(fx.fingerprints.is_empty());

        tokio::task::spawn_blocking(move || writer.join())
            .await
            .expect("test setup failed")
            .expect("test setup failed");
        // Past the release delay and the recently-synced window
        sleep(Duration::from_millis(150)).await;

        let outcome = fx
            .executor
            .execute(&source_file, SyncDirection::SourceToTarget)
            .await;
        assert_eq!(outcome, SyncOutcome::Copied { bytes: 6 + 60 * 6 });
        assert_eq!(
            std::fs::read(&target_file).expect("test setup failed"),
            std::fs::read(&source_file).expect("test setup failed")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_directions_on_one_key_are_exclusive() {
        let fx = fixture();
        let source_file = fx.roots.source().join("f.txt");
        let target_file = fx.roots.target().join("f.txt");
        write(&source_file, "from source");
        write(&target_file, "from the target");

        let (forward, backward) = tokio::join!(
            fx.executor
                .execute(&source_file, SyncDirection::SourceToTarget),
            fx.executor
                .execute(&target_file, SyncDirection::TargetToSource),
        );

        let copied = [&forward, &backward]
            .iter()
            .filter(|outcome| outcome.is_copied())
            .count();
        assert_eq!(copied, 1, "{forward:?} / {backward:?}");
        assert!(
            forward == SyncOutcome::Skipped(SkipReason::Blocked)
                || backward == SyncOutcome::Skipped(SkipReason::Blocked)
        );
        assert_eq!(
            std::fs::read_to_string(&source_file).expect("test setup failed"),
            std::fs::read_to_string(&target_file).expect("test setup failed")
        );
    }
}
