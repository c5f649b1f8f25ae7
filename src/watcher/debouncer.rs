//! Shared debouncing logic for directory change signals.
//!
//! Raw signals from every watched root funnel into one [`DebounceEngine`].
//! The engine samples activity on a fixed period: a recurring timer is armed
//! by the first signal, each tick checks whether anything arrived during the
//! last period, and the first quiet tick fires the callback and disarms the
//! timer. Under continuous churn the callback never fires.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

use super::handler::{ChangeCallback, ChangeKind};

/// Sampling period of the debounce timer, also used as its initial delay.
pub const DEBOUNCE_PERIOD: Duration = Duration::from_millis(1000);

/// Result of a single timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A change arrived during the last period; keep sampling.
    Pending,
    /// The period was quiet; the callback was dispatched and the timer released.
    Settled,
    /// No timer is armed; nothing to do.
    Idle,
    /// The engine was shut down.
    Stopped,
}

/// Timer and dirty flag. Only touched while holding the lock.
#[derive(Debug, Default)]
struct DebounceState {
    /// Armed iff a change has not yet resulted in a fired callback.
    pending_timer: Option<JoinHandle<()>>,
    /// A change arrived within the current tick window.
    dirty: bool,
    disposed: bool,
}

struct Shared {
    state: Mutex<DebounceState>,
    period: Duration,
    on_changed: ChangeCallback,
    runtime: Handle,
}

/// Trailing-edge debounce with a fixed sampling period.
///
/// Cloning yields another handle to the same state machine.
#[derive(Clone)]
pub struct DebounceEngine {
    shared: Arc<Shared>,
}

impl DebounceEngine {
    /// Create an engine that dispatches `on_changed` on `runtime`.
    pub fn new(on_changed: ChangeCallback, runtime: Handle) -> Self {
        Self::with_period(on_changed, runtime, DEBOUNCE_PERIOD)
    }

    pub(crate) fn with_period(
        on_changed: ChangeCallback,
        runtime: Handle,
        period: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DebounceState::default()),
                period,
                on_changed,
                runtime,
            }),
        }
    }

    /// Record a raw change signal.
    ///
    /// Safe to call from any thread, including notify's event threads. Arms
    /// the timer if it is not already running. Ignored after shutdown.
    pub fn signal(&self, kind: ChangeKind) {
        let mut state = self.shared.state.lock();
        if state.disposed {
            crate::debug_event!("debounce", "signal after shutdown ignored", "{kind:?}");
            return;
        }

        match kind {
            ChangeKind::EntryCreated | ChangeKind::EntryRemoved => state.dirty = true,
        }

        if state.pending_timer.is_none() {
            state.pending_timer = Some(self.start_timer());
            crate::debug_event!("debounce", "timer armed", "{:?}", self.shared.period);
        }
    }

    /// Run one tick of the state machine. Normally driven by the timer.
    pub fn tick(&self) -> TickOutcome {
        self.shared.tick()
    }

    /// Whether a timer is armed, i.e. a change is awaiting its callback.
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().pending_timer.is_some()
    }

    /// Stop the timer and refuse further signals.
    ///
    /// Once this returns no tick can dispatch the callback: a tick already
    /// waiting on the lock observes the disposed flag and stops.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.disposed = true;
        state.dirty = false;
        if let Some(timer) = state.pending_timer.take() {
            timer.abort();
            crate::debug_event!("debounce", "timer stopped");
        }
    }

    fn start_timer(&self) -> JoinHandle<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let period = self.shared.period;

        self.shared.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                if shared.tick() != TickOutcome::Pending {
                    break;
                }
            }
        })
    }
}

impl Shared {
    fn tick(&self) -> TickOutcome {
        let mut state = self.state.lock();
        if state.disposed {
            return TickOutcome::Stopped;
        }
        if state.pending_timer.is_none() {
            return TickOutcome::Idle;
        }

        let outcome = if state.dirty {
            TickOutcome::Pending
        } else {
            self.dispatch_callback();
            if let Some(timer) = state.pending_timer.take() {
                // Aborting the running task itself is harmless: it exits right after.
                timer.abort();
            }
            TickOutcome::Settled
        };

        state.dirty = false;
        outcome
    }

    /// Fire-and-forget; a panicking callback is contained in its task.
    fn dispatch_callback(&self) {
        crate::log_event!("debounce", "settled", "dispatching change callback");
        let on_changed = Arc::clone(&self.on_changed);
        drop(self.runtime.spawn_blocking(move || on_changed()));
    }
}

impl fmt::Debug for DebounceEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("DebounceEngine")
            .field("period", &self.shared.period)
            .field("pending", &state.pending_timer.is_some())
            .field("dirty", &state.dirty)
            .field("disposed", &state.disposed)
            .finish()
    }
}
