pub mod config;
pub mod logging;
pub mod watcher;

pub use config::Settings;
pub use watcher::{
    ChangeAggregator, ChangeAggregatorBuilder, ChangeKind, DEBOUNCE_PERIOD, DebounceEngine,
    LogSink, TracingSink, WatchError,
};
