//! Debounced directory watching for search-path reloads.
//!
//! This module watches a set of root directories and collapses entry
//! creation/removal bursts into a single "something changed" callback.
//!
//! # Architecture
//!
//! ```text
//! ChangeAggregator
//!   - one WatchTarget per root (notify::RecommendedWatcher, recursive)
//!   - shared DebounceEngine (timer + dirty flag behind one mutex)
//!         |
//!    WatchTarget  WatchTarget  ...
//!         \           /
//!        DebounceEngine::signal
//!               |
//!        quiet tick -> spawn_blocking(on_changed)
//! ```

mod aggregator;
mod debouncer;
mod error;
mod handler;
mod target;

pub use aggregator::{ChangeAggregator, ChangeAggregatorBuilder};
pub use debouncer::{DEBOUNCE_PERIOD, DebounceEngine, TickOutcome};
pub use error::WatchError;
pub use handler::{ChangeCallback, ChangeKind, LogSink, TracingSink};
pub use target::WatchTarget;
