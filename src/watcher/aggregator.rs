//! Debounced change aggregation over a set of root directories.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;

use crate::config::Settings;

use super::debouncer::DebounceEngine;
use super::error::WatchError;
use super::handler::{ChangeCallback, ChangeKind, LogSink, TracingSink};
use super::target::WatchTarget;

/// Watches a set of root directories and invokes one callback once entry
/// creation/removal activity under any of them has settled.
///
/// Construction never fails: roots that are relative, missing, inaccessible
/// or unwatchable are skipped (the latter two with a warning on the log
/// sink). With no usable root the aggregator is inert and holds nothing.
///
/// Teardown happens once, through [`dispose`](Self::dispose) or on drop.
pub struct ChangeAggregator {
    active: Option<ActiveSet>,
    disposed: AtomicBool,
}

/// Resources held while at least one root is watched.
struct ActiveSet {
    engine: DebounceEngine,
    targets: Mutex<Vec<WatchTarget>>,
}

impl ChangeAggregator {
    /// Create a builder for configuring the aggregator.
    pub fn builder() -> ChangeAggregatorBuilder {
        ChangeAggregatorBuilder::new()
    }

    /// Watch `paths`, calling `on_changed` after each quiet period.
    ///
    /// The timer and callback run on the current Tokio runtime. Outside a
    /// runtime the aggregator is inert (with a warning on `log` if any root
    /// would have been watched); use [`builder`](Self::builder) to pass a
    /// runtime handle explicitly.
    pub fn new<I, P>(
        paths: I,
        on_changed: impl Fn() + Send + Sync + 'static,
        log: Arc<dyn LogSink>,
    ) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self::builder()
            .paths(paths)
            .on_changed(on_changed)
            .log_sink(log)
            .build()
    }

    /// Watch the roots listed in `settings.watcher.roots`.
    pub fn from_settings(
        settings: &Settings,
        on_changed: impl Fn() + Send + Sync + 'static,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self::new(settings.watcher.roots.iter().cloned(), on_changed, log)
    }

    fn inert() -> Self {
        Self {
            active: None,
            disposed: AtomicBool::new(false),
        }
    }

    fn open(
        paths: Vec<PathBuf>,
        on_changed: ChangeCallback,
        log: Arc<dyn LogSink>,
        runtime: Option<Handle>,
    ) -> Self {
        let candidates = absolute_candidates(paths);
        if candidates.is_empty() {
            crate::debug_event!("watcher", "no absolute roots, inert");
            return Self::inert();
        }

        // Resolved only once there is something to watch.
        let runtime = match runtime.map_or_else(Handle::try_current, Ok) {
            Ok(runtime) => runtime,
            Err(e) => {
                log.trace_message(&format!(
                    "Warning: not watching {} directories, no Tokio runtime: {e}",
                    candidates.len()
                ));
                return Self::inert();
            }
        };

        let engine = DebounceEngine::new(on_changed, runtime);
        let mut targets = Vec::with_capacity(candidates.len());

        for path in &candidates {
            match open_root(path, &engine) {
                Ok(Some(target)) => targets.push(target),
                Ok(None) => {
                    crate::debug_event!("watcher", "skipped", "{}", path.display());
                }
                Err(e) => log.trace_message(&format!("Warning: {e}")),
            }
        }

        if targets.is_empty() {
            engine.shutdown();
            crate::debug_event!("watcher", "no watchable roots, inert");
            return Self::inert();
        }

        crate::log_event!("watcher", "monitoring", "{} directories", targets.len());

        Self {
            active: Some(ActiveSet {
                engine,
                targets: Mutex::new(targets),
            }),
            disposed: AtomicBool::new(false),
        }
    }

    /// Route a raw change signal into the debounce engine.
    ///
    /// This is the entry point the OS watches use. Signals arriving after
    /// disposal, or on an inert aggregator, are ignored.
    pub fn signal(&self, kind: ChangeKind) {
        if self.disposed.load(Ordering::Acquire) {
            crate::debug_event!("watcher", "signal after dispose ignored", "{kind:?}");
            return;
        }
        if let Some(active) = &self.active {
            active.engine.signal(kind);
        }
    }

    /// Roots currently being watched. Empty once disposed.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.active
            .as_ref()
            .map(|active| {
                active
                    .targets
                    .lock()
                    .iter()
                    .map(|target| target.path().to_path_buf())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of roots currently being watched.
    pub fn watch_count(&self) -> usize {
        self.active
            .as_ref()
            .map_or(0, |active| active.targets.lock().len())
    }

    /// Whether a change is waiting for its quiet period.
    pub fn is_pending(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.engine.is_pending())
    }

    /// True when no root could be watched; the aggregator holds no resources.
    pub fn is_inert(&self) -> bool {
        self.active.is_none()
    }

    /// True once [`dispose`](Self::dispose) has run (or the aggregator was dropped).
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Release every resource exactly once.
    ///
    /// The timer is stopped before any watch is closed, so no tick can fire
    /// the callback after this returns. Safe to call repeatedly and from
    /// inside the change callback.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(active) = &self.active else {
            return;
        };

        active.engine.shutdown();

        let targets = std::mem::take(&mut *active.targets.lock());
        let count = targets.len();
        for mut target in targets {
            target.release();
        }

        crate::log_event!("watcher", "disposed", "{count} directories released");
    }
}

/// Keep absolute paths, first occurrence only.
fn absolute_candidates(paths: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| path.is_absolute())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

/// Check `path` is an existing directory and open a watch on it.
///
/// `Ok(None)` means the root is simply absent or not a directory.
fn open_root(path: &Path, engine: &DebounceEngine) -> Result<Option<WatchTarget>, WatchError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.is_dir() => WatchTarget::open(path, engine).map(Some),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(WatchError::DirectoryAccess {
            path: path.to_path_buf(),
            source,
        }),
    }
}

impl Drop for ChangeAggregator {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for ChangeAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeAggregator")
            .field("watched", &self.watched_paths())
            .field("pending", &self.is_pending())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Builder for constructing a ChangeAggregator.
pub struct ChangeAggregatorBuilder {
    paths: Vec<PathBuf>,
    on_changed: Option<ChangeCallback>,
    log: Option<Arc<dyn LogSink>>,
    runtime: Option<Handle>,
}

impl ChangeAggregatorBuilder {
    /// Create a new builder with defaults.
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            on_changed: None,
            log: None,
            runtime: None,
        }
    }

    /// Add candidate root directories.
    pub fn paths<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.paths.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Add a single candidate root directory.
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Set the callback fired after each quiet period.
    pub fn on_changed(mut self, on_changed: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_changed = Some(Arc::new(on_changed));
        self
    }

    /// Set the log sink for per-root warnings. Defaults to [`TracingSink`].
    pub fn log_sink(mut self, log: Arc<dyn LogSink>) -> Self {
        self.log = Some(log);
        self
    }

    /// Set the runtime that drives the timer and runs the callback.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Build the ChangeAggregator.
    ///
    /// Without an explicit runtime the current one is used; if there is none,
    /// the result is inert.
    pub fn build(self) -> ChangeAggregator {
        let on_changed: ChangeCallback = match self.on_changed {
            Some(on_changed) => on_changed,
            None => Arc::new(|| {}),
        };
        let log: Arc<dyn LogSink> = match self.log {
            Some(log) => log,
            None => Arc::new(TracingSink),
        };
        ChangeAggregator::open(self.paths, on_changed, log, self.runtime)
    }
}

impl Default for ChangeAggregatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
