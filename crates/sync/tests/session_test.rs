//! End-to-end tests for a sync session
//!
//! These tests run a real session over two temporary directories with
//! shortened timings, and drive it through plain filesystem writes.

use devbridge_core::{Error, SyncConfig};
use devbridge_sync::{SyncDirection, SyncNotice, SyncSession};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::time::{sleep, Instant};

/// Timings scaled down from the defaults, keeping their proportions
fn fast_config() -> SyncConfig {
    SyncConfig::builder()
        .settle_window_ms(100)
        .debounce_ms(200, 400)
        .stability(50, 50, 3)
        .release_delay_ms(100)
        .recently_synced_window_ms(1000)
        .recently_touched_window_ms(600)
        .active_lock_timeout_ms(3000)
        .build()
}

/// Longest stretch during which the session may still react to one write
const QUIET_PERIOD: Duration = Duration::from_millis(1800);

async fn start_session() -> (TempDir, TempDir, SyncSession) {
    let source = TempDir::new().expect("test setup failed");
    let target = TempDir::new().expect("test setup failed");
    let session = SyncSession::start(source.path(), target.path(), fast_config())
        .await
        .expect("test setup failed");

    // Let the watches settle in
    sleep(Duration::from_millis(100)).await;
    (source, target, session)
}

fn write(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("test setup failed");
    }
    std::fs::write(path, content).expect("test setup failed");
}

fn read(path: &Path) -> Option<String> {
    std::fs::read_to_string(path).ok()
}

/// Poll until `path` holds `expected` or the timeout runs out
async fn wait_for_content(path: &Path, expected: &str, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if read(path).as_deref() == Some(expected) {
            return true;
        }
        sleep(Duration::from_millis(25)).await;
    }
    false
}

fn drain(notices: &mut broadcast::Receiver<SyncNotice>) -> Vec<SyncNotice> {
    let mut received = Vec::new();
    while let Ok(notice) = notices.try_recv() {
        received.push(notice);
    }
    received
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_edits_flow_both_ways_without_echo() {
    let (_source, _target, session) = start_session().await;
    let source_file = session.source_root().join("theme/style.css");
    let target_file = session.target_root().join("theme/style.css");

    // New directory and file on the host side
    write(&source_file, "A");
    assert!(
        wait_for_content(&target_file, "A", Duration::from_secs(5)).await,
        "host edit never reached the container"
    );

    let source_hash = session.fingerprints().get(&source_file).map(|e| e.hash);
    let target_hash = session.fingerprints().get(&target_file).map(|e| e.hash);
    assert!(source_hash.is_some());
    assert_eq!(source_hash, target_hash);

    // The copy's own write event must not travel back
    sleep(QUIET_PERIOD).await;
    assert_eq!(read(&source_file).as_deref(), Some("A"));

    // Container-side edit flows to the host
    write(&target_file, "B");
    assert!(
        wait_for_content(&source_file, "B", Duration::from_secs(5)).await,
        "container edit never reached the host"
    );

    // A host write inside the post-sync window is swallowed
    write(&source_file, "A");
    sleep(QUIET_PERIOD).await;
    assert_eq!(read(&target_file).as_deref(), Some("B"));

    // Once the windows have passed, edits flow again
    write(&source_file, "C");
    assert!(
        wait_for_content(&target_file, "C", Duration::from_secs(5)).await,
        "edit after the quiet period never synced"
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_write_syncs_exactly_once() {
    let (_source, _target, session) = start_session().await;
    let mut notices = session.subscribe();
    let source_file = session.source_root().join("index.php");

    write(&source_file, "<?php echo 'hi';");
    assert!(
        wait_for_content(
            &session.target_root().join("index.php"),
            "<?php echo 'hi';",
            Duration::from_secs(5)
        )
        .await
    );
    sleep(QUIET_PERIOD).await;

    let received = drain(&mut notices);
    assert_eq!(
        received,
        vec![SyncNotice {
            direction: SyncDirection::SourceToTarget,
            relative_path: PathBuf::from("index.php"),
            bytes: 16,
        }]
    );
    assert_eq!(session.pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_burst_of_writes_syncs_final_content() {
    let (_source, _target, session) = start_session().await;
    let mut notices = session.subscribe();
    let source_file = session.source_root().join("wp-content/uploads/log.txt");

    for i in 0..10 {
        write(&source_file, &format!("line {i}"));
        sleep(Duration::from_millis(20)).await;
    }

    let target_file = session.target_root().join("wp-content/uploads/log.txt");
    assert!(wait_for_content(&target_file, "line 9", Duration::from_secs(5)).await);
    sleep(QUIET_PERIOD).await;
    assert_eq!(drain(&mut notices).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_ignored_paths_are_not_synced() {
    let (_source, _target, session) = start_session().await;

    write(&session.source_root().join(".git/HEAD"), "ref: refs/heads/main");
    write(&session.source_root().join("theme/style.css.tmp"), "scratch");
    write(&session.source_root().join("theme/style.css"), "body {}");

    assert!(
        wait_for_content(
            &session.target_root().join("theme/style.css"),
            "body {}",
            Duration::from_secs(5)
        )
        .await
    );
    sleep(Duration::from_millis(500)).await;
    assert!(!session.target_root().join(".git").exists());
    assert!(!session.target_root().join("theme/style.css.tmp").exists());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_deletions_are_not_propagated() {
    let (_source, _target, session) = start_session().await;
    let source_file = session.source_root().join("keep.txt");
    let target_file = session.target_root().join("keep.txt");

    write(&source_file, "keep");
    assert!(wait_for_content(&target_file, "keep", Duration::from_secs(5)).await);
    sleep(QUIET_PERIOD).await;

    std::fs::remove_file(&source_file).expect("test setup failed");
    sleep(QUIET_PERIOD).await;
    assert_eq!(read(&target_file).as_deref(), Some("keep"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stopped_session_is_inert() {
    let (_source, _target, mut session) = start_session().await;
    let source_root = session.source_root().to_path_buf();
    let target_root = session.target_root().to_path_buf();

    session.stop();
    session.stop();
    assert!(!session.is_running());
    assert!(session.fingerprints().is_empty());

    write(&source_root.join("late.txt"), "late");
    sleep(Duration::from_millis(800)).await;
    assert!(!target_root.join("late.txt").exists());
}

#[tokio::test]
async fn test_invalid_roots_are_rejected() {
    let source = TempDir::new().expect("test setup failed");

    let missing = source.path().join("missing");
    let err = SyncSession::start(source.path(), &missing, SyncConfig::default())
        .await
        .err()
        .expect("missing target must be rejected");
    assert!(matches!(err, Error::InvalidRoot { .. }));

    let nested = source.path().join("html");
    std::fs::create_dir(&nested).expect("test setup failed");
    let err = SyncSession::start(source.path(), &nested, SyncConfig::default())
        .await
        .err()
        .expect("nested roots must be rejected");
    assert!(matches!(err, Error::InvalidRoot { .. }));
}

#[tokio::test]
async fn test_invalid_config_is_rejected() {
    let source = TempDir::new().expect("test setup failed");
    let target = TempDir::new().expect("test setup failed");
    let config = SyncConfig::builder().debounce_ms(0, 400).build();

    let err = SyncSession::start(source.path(), target.path(), config)
        .await
        .err()
        .expect("zero delay must be rejected");
    assert!(matches!(err, Error::Config(_)));
}
