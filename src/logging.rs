//! Subscriber setup for hosts that want the watcher's diagnostics on stderr.
//!
//! The crate only emits `tracing` events. Hosts with their own subscriber can
//! skip this module entirely; [`init_with_config`] never replaces one.
//!
//! Levels come from `[logging]` in the settings file, for example
//! `default = "warn"` plus `modules.dirwatch = "debug"`. A set `RUST_LOG`
//! overrides both.

use std::sync::Once;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

static INIT: Once = Once::new();

/// Wall-clock prefix, e.g. `14:02:17.381`.
struct CompactTime;

impl FormatTime for CompactTime {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", chrono::Local::now().format("%H:%M:%S%.3f"))
    }
}

/// `default,target=level,...` as understood by `EnvFilter`.
fn filter_directives(config: &LoggingConfig) -> String {
    std::iter::once(config.default.clone())
        .chain(
            config
                .modules
                .iter()
                .map(|(target, level)| format!("{target}={level}")),
        )
        .collect::<Vec<_>>()
        .join(",")
}

fn env_filter(config: &LoggingConfig) -> EnvFilter {
    match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(filter_directives(config)),
    }
}

/// Install a compact fmt subscriber filtered by `config`.
///
/// Only the first call in a process does anything.
pub fn init_with_config(config: &LoggingConfig) {
    INIT.call_once(|| {
        let filter = env_filter(config);
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_timer(CompactTime)
            .with_level(true)
            .with_filter(filter);

        let _ = tracing_subscriber::registry().with(fmt_layer).try_init();
    });
}

/// [`init_with_config`] with warn-level defaults.
pub fn init() {
    init_with_config(&LoggingConfig::default());
}

/// Info-level `[component] event: detail` line.
///
/// ```ignore
/// log_event!("watcher", "monitoring", "{} directories", count);
/// ```
#[macro_export]
macro_rules! log_event {
    ($component:expr, $event:expr) => {
        tracing::info!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::info!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

/// Debug-level variant of [`log_event!`].
#[macro_export]
macro_rules! debug_event {
    ($component:expr, $event:expr) => {
        tracing::debug!("[{}] {}", $component, $event)
    };
    ($component:expr, $event:expr, $($arg:tt)*) => {
        tracing::debug!("[{}] {}: {}", $component, $event, format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_default() {
        assert_eq!(filter_directives(&LoggingConfig::default()), "warn");
    }

    #[test]
    fn test_filter_directives_with_modules() {
        let mut config = LoggingConfig::default();
        config
            .modules
            .insert("dirwatch".to_string(), "trace".to_string());
        assert_eq!(filter_directives(&config), "warn,dirwatch=trace");
    }

    #[test]
    fn test_init_is_idempotent() {
        init();
        init();
        log_event!("test", "logged twice without panic");
    }
}
