//! One recursive OS watch per root directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use super::debouncer::DebounceEngine;
use super::error::WatchError;
use super::handler::MoveTracker;

/// An open recursive watch on a single root directory.
///
/// Owns its notify handle exclusively. The subscription flag gates event
/// delivery into the engine so teardown can cut it off before the handle
/// is closed.
pub struct WatchTarget {
    path: PathBuf,
    watcher: Option<RecommendedWatcher>,
    subscription: Arc<AtomicBool>,
}

impl WatchTarget {
    /// Open a recursive watch on `path`, routing entry creation, removal and
    /// moves into the root into `engine`.
    pub fn open(path: &Path, engine: &DebounceEngine) -> Result<Self, WatchError> {
        let subscription = Arc::new(AtomicBool::new(true));

        let active = Arc::clone(&subscription);
        let sink = engine.clone();
        let root = path.to_path_buf();
        let mut moves = MoveTracker::default();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if !active.load(Ordering::Acquire) {
                return;
            }
            match res {
                Ok(event) => {
                    if let Some(kind) = moves.classify(&event) {
                        sink.signal(kind);
                    }
                }
                Err(e) => {
                    tracing::warn!("[watcher] event error under {}: {e}", root.display());
                }
            }
        })
        .map_err(|source| WatchError::WatchCreation {
            path: path.to_path_buf(),
            source,
        })?;

        watcher
            .watch(path, RecursiveMode::Recursive)
            .map_err(|source| WatchError::WatchCreation {
                path: path.to_path_buf(),
                source,
            })?;

        crate::debug_event!("watcher", "watching", "{}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            watcher: Some(watcher),
            subscription,
        })
    }

    /// Root directory this target watches.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether events are still being routed into the engine.
    pub fn is_active(&self) -> bool {
        self.subscription.load(Ordering::Acquire) && self.watcher.is_some()
    }

    /// Unsubscribe, stop watching and close the handle. Repeat calls are no-ops.
    pub fn release(&mut self) {
        self.subscription.store(false, Ordering::Release);

        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.path) {
                // The root may already be gone; closing the handle still frees it.
                crate::debug_event!("watcher", "unwatch failed", "{}: {e}", self.path.display());
            }
            drop(watcher);
            crate::debug_event!("watcher", "closed", "{}", self.path.display());
        }
    }
}

impl Drop for WatchTarget {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for WatchTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchTarget")
            .field("path", &self.path)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::runtime::Handle;

    fn engine() -> DebounceEngine {
        DebounceEngine::with_period(Arc::new(|| {}), Handle::current(), Duration::from_secs(3600))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_and_release() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine();

        let mut target = WatchTarget::open(temp_dir.path(), &engine).unwrap();
        assert!(target.is_active());
        assert_eq!(target.path(), temp_dir.path());

        target.release();
        assert!(!target.is_active());

        // Second release is a no-op
        target.release();
        assert!(!target.is_active());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_open_missing_directory_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("does-not-exist");

        let err = WatchTarget::open(&missing, &engine()).unwrap_err();
        assert!(matches!(err, WatchError::WatchCreation { .. }));
        assert_eq!(err.path(), &missing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_entry_creation_reaches_engine() {
        let temp_dir = TempDir::new().unwrap();
        let engine = engine();
        let _target = WatchTarget::open(temp_dir.path(), &engine).unwrap();

        std::fs::write(temp_dir.path().join("new.py"), b"x = 1").unwrap();

        let mut armed = false;
        for _ in 0..40 {
            if engine.is_pending() {
                armed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(armed, "creation should arm the debounce timer");
        engine.shutdown();
    }

    async fn wait_until_pending(engine: &DebounceEngine) -> bool {
        for _ in 0..40 {
            if engine.is_pending() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        engine.is_pending()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_move_into_root_reaches_engine() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("staging");
        let root = temp_dir.path().join("site-packages");
        std::fs::create_dir_all(staging.join("pkg")).unwrap();
        std::fs::create_dir(&root).unwrap();

        let engine = engine();
        let _target = WatchTarget::open(&root, &engine).unwrap();

        std::fs::rename(staging.join("pkg"), root.join("pkg")).unwrap();

        assert!(wait_until_pending(&engine).await, "move-in should arm the timer");
        engine.shutdown();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rename_inside_root_is_not_a_change() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("old.py"), b"").unwrap();

        let engine = engine();
        let _target = WatchTarget::open(temp_dir.path(), &engine).unwrap();

        std::fs::rename(temp_dir.path().join("old.py"), temp_dir.path().join("new.py")).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert!(!engine.is_pending());
        engine.shutdown();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_released_target_stops_routing() {
        let temp_dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let engine = DebounceEngine::with_period(
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Handle::current(),
            Duration::from_millis(50),
        );

        let mut target = WatchTarget::open(temp_dir.path(), &engine).unwrap();
        target.release();

        std::fs::write(temp_dir.path().join("late.py"), b"").unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert!(!engine.is_pending());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
