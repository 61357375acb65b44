//! End-to-end tests for fileguard
//!
//! Runs real guards in both watch modes against a tamperer writing to the
//! protected file, and checks convergence, termination and atomicity.

use ::fileguard::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Test harness owning a guarded file and its running guard
pub struct GuardHarness {
    pub temp_dir: TempDir,
    pub target: PathBuf,
    pub guard: FileGuard,
    pub token: CancellationToken,
}

impl GuardHarness {
    /// Create a target holding `content` and a guard for it
    pub fn new(content: &[u8], builder: FileGuardBuilder) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("protected.cfg");
        fs::write(&target, content).unwrap();

        let guard = builder.build(&target).unwrap();

        Self {
            temp_dir,
            target,
            guard,
            token: CancellationToken::new(),
        }
    }

    /// Start the guard in the background
    pub fn spawn(&self) -> JoinHandle<Result<RunSummary>> {
        let guard = self.guard.clone();
        let token = self.token.clone();
        tokio::spawn(async move { guard.run(token).await })
    }

    /// Poll the target until it holds `expected` or `timeout` elapses
    pub async fn wait_for_content(&self, expected: &[u8], timeout: Duration) -> bool {
        wait_for(&self.target, expected, timeout).await
    }
}

/// Poll `path` until it holds `expected` or `timeout` elapses
pub async fn wait_for(path: &Path, expected: &[u8], timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if fs::read(path).map(|c| c == expected).unwrap_or(false) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Replace `path` atomically so readers only ever see whole contents
pub fn atomic_overwrite(path: &Path, content: &[u8]) {
    let staging = path.with_extension("tamper");
    fs::write(&staging, content).unwrap();
    fs::rename(&staging, path).unwrap();
}

/// Guard `<tmp>/game/asset.pak` with the backup kept outside `game/`
///
/// Returns the temp root, the `game` directory, the target and the guard.
pub fn nested_guard(builder: FileGuardBuilder) -> (TempDir, PathBuf, PathBuf, FileGuard) {
    let temp_dir = TempDir::new().unwrap();
    let game_dir = temp_dir.path().join("game");
    fs::create_dir(&game_dir).unwrap();
    let target = game_dir.join("asset.pak");
    fs::write(&target, b"A").unwrap();

    let guard = builder
        .backup_path(temp_dir.path().join("asset.trusted"))
        .build(&target)
        .unwrap();
    (temp_dir, game_dir, target, guard)
}

fn poll_builder(interval_ms: u64) -> FileGuardBuilder {
    FileGuardBuilder::new()
        .poll_interval(Duration::from_millis(interval_ms))
        .watch_mode(WatchMode::Poll)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_polling_restores_within_interval() {
        let harness = GuardHarness::new(b"A", poll_builder(100));
        let backup_digest = harness.guard.backup().digest().to_string();
        let running = harness.spawn();

        tokio::time::sleep(Duration::from_millis(150)).await;
        fs::write(&harness.target, b"B").unwrap();

        assert!(harness.wait_for_content(b"A", Duration::from_millis(300)).await);
        assert_eq!(fs::read(harness.guard.backup().path()).unwrap(), b"A");
        assert_eq!(content_digest(harness.guard.backup().path()).unwrap(), backup_digest);

        harness.token.cancel();
        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert!(summary.restores >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_driven_restores() {
        let builder = FileGuardBuilder::new()
            .poll_interval(Duration::from_millis(100))
            .watch_mode(WatchMode::Events);
        let harness = GuardHarness::new(b"trusted", builder);
        let running = harness.spawn();

        // Let the watcher subscribe before tampering.
        tokio::time::sleep(Duration::from_millis(200)).await;
        fs::write(&harness.target, b"overwritten by someone else").unwrap();

        assert!(harness.wait_for_content(b"trusted", Duration::from_secs(3)).await);

        harness.token.cancel();
        let summary = tokio::time::timeout(Duration::from_secs(3), running)
            .await
            .expect("guard did not stop after cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert!(summary.restores >= 1);
    }

    #[tokio::test]
    async fn test_deleted_target_is_recreated() {
        let harness = GuardHarness::new(b"A", poll_builder(50));
        let running = harness.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::remove_file(&harness.target).unwrap();

        assert!(harness.wait_for_content(b"A", Duration::from_secs(1)).await);

        harness.token.cancel();
        running.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_only_once_stops_after_first_watch_restore() {
        let harness = GuardHarness::new(b"A", poll_builder(50).only_once(true));
        let running = harness.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        atomic_overwrite(&harness.target, b"B");

        let summary = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("only-once guard kept running")
            .unwrap()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::OnlyOnce);
        assert_eq!(summary.restores, 1);
        assert_eq!(fs::read(&harness.target).unwrap(), b"A");

        // Nobody is guarding anymore.
        fs::write(&harness.target, b"C").unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fs::read(&harness.target).unwrap(), b"C");
    }

    #[tokio::test]
    async fn test_touch_does_not_restore() {
        let harness = GuardHarness::new(b"A", poll_builder(50));
        let running = harness.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        let inode_before = fs::metadata(&harness.target).unwrap();
        filetime::set_file_mtime(&harness.target, filetime::FileTime::from_unix_time(1_000, 0)).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;

        harness.token.cancel();
        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.restores, 0);

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            let inode_after = fs::metadata(&harness.target).unwrap();
            assert_eq!(inode_before.ino(), inode_after.ino());
        }
        #[cfg(not(unix))]
        let _ = inode_before;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_readers_only_observe_whole_contents() {
        let harness = GuardHarness::new(b"AAAAAAAAAAAAAAAA", poll_builder(5));
        let running = harness.spawn();

        let stop = Arc::new(AtomicBool::new(false));
        let reader = {
            let stop = stop.clone();
            let target = harness.target.clone();
            std::thread::spawn(move || {
                let mut observed = std::collections::HashSet::new();
                while !stop.load(Ordering::Relaxed) {
                    if let Ok(content) = fs::read(&target) {
                        observed.insert(content);
                    }
                }
                observed
            })
        };

        for _ in 0..30 {
            atomic_overwrite(&harness.target, b"BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB");
            tokio::time::sleep(Duration::from_millis(15)).await;
        }

        assert!(harness.wait_for_content(b"AAAAAAAAAAAAAAAA", Duration::from_secs(1)).await);
        stop.store(true, Ordering::Relaxed);
        let observed = reader.join().unwrap();

        harness.token.cancel();
        running.await.unwrap().unwrap();

        for content in observed {
            assert!(
                content == b"AAAAAAAAAAAAAAAA" || content == b"BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB",
                "observed a partial write: {:?}",
                String::from_utf8_lossy(&content)
            );
        }
    }

    #[tokio::test]
    async fn test_corrupted_backup_ends_run() {
        let harness = GuardHarness::new(b"A", poll_builder(50));
        let running = harness.spawn();

        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::write(harness.guard.backup().path(), b"evil").unwrap();
        fs::write(&harness.target, b"B").unwrap();

        let result = tokio::time::timeout(Duration::from_secs(2), running)
            .await
            .expect("guard kept running with a corrupted backup")
            .unwrap();
        let err = result.unwrap_err();
        assert!(err.is_backup_failure());
        assert_eq!(fs::read(&harness.target).unwrap(), b"B");
    }

    #[tokio::test]
    async fn test_startup_restore_then_keep_watching() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("protected.cfg");
        let backup = temp_dir.path().join("protected.trusted");
        fs::write(&target, b"drifted").unwrap();
        fs::write(&backup, b"trusted").unwrap();

        let guard = poll_builder(50).backup_path(&backup).build(&target).unwrap();
        let token = CancellationToken::new();
        let running = {
            let guard = guard.clone();
            let token = token.clone();
            tokio::spawn(async move { guard.run(token).await })
        };

        assert!(wait_for(&target, b"trusted", Duration::from_secs(1)).await);
        atomic_overwrite(&target, b"drifted again");
        assert!(wait_for(&target, b"trusted", Duration::from_secs(1)).await);

        token.cancel();
        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.restores, 2);
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_guarding() {
        let (_dir, game_dir, target, guard) = nested_guard(poll_builder(50));
        let token = CancellationToken::new();
        let running = {
            let guard = guard.clone();
            let token = token.clone();
            tokio::spawn(async move { guard.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        // Every restore fails while there is no directory to stage in.
        fs::remove_dir_all(&game_dir).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!running.is_finished(), "guard stopped on a failed restore");

        fs::create_dir(&game_dir).unwrap();
        fs::write(&target, b"B").unwrap();
        assert!(wait_for(&target, b"A", Duration::from_secs(2)).await);

        token.cancel();
        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert!(summary.restores >= 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_transient_read_is_retried_not_restored() {
        let (_dir, game_dir, target, guard) = nested_guard(poll_builder(50));
        let token = CancellationToken::new();
        let running = {
            let guard = guard.clone();
            let token = token.clone();
            tokio::spawn(async move { guard.run(token).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        // The target cannot even be stat'ed through a non-directory.
        let blocker = game_dir.with_extension("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        fs::remove_dir_all(&game_dir).unwrap();
        fs::rename(&blocker, &game_dir).unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(!running.is_finished(), "guard stopped on a transient read failure");
        assert_eq!(fs::read(&game_dir).unwrap(), b"not a directory");

        fs::remove_file(&game_dir).unwrap();
        fs::create_dir(&game_dir).unwrap();
        assert!(wait_for(&target, b"A", Duration::from_secs(2)).await);

        token.cancel();
        let summary = running.await.unwrap().unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert!(summary.restores >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_event_mode_sees_tamper_right_after_startup() {
        let builder = FileGuardBuilder::new()
            .poll_interval(Duration::from_millis(100))
            .watch_mode(WatchMode::Events);
        let harness = GuardHarness::new(b"trusted", builder);
        let running = harness.spawn();

        // No settling delay: the write races the startup check.
        tokio::task::yield_now().await;
        atomic_overwrite(&harness.target, b"written during startup");

        assert!(harness.wait_for_content(b"trusted", Duration::from_secs(3)).await);

        harness.token.cancel();
        let summary = tokio::time::timeout(Duration::from_secs(3), running)
            .await
            .expect("guard did not stop after cancellation")
            .unwrap()
            .unwrap();
        assert_eq!(summary.stop_reason, StopReason::Cancelled);
    }
}
