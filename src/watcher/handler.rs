//! Collaborator seams for the change aggregator: change kinds, the user
//! callback and the diagnostic log sink.

use std::collections::VecDeque;
use std::sync::Arc;

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};

/// Rename halves remembered per watch while waiting for their partner.
const MAX_PENDING_MOVES: usize = 64;

/// Raw change kinds routed into the debounce engine.
///
/// Only directory entry creation and removal are monitored; content
/// modification, metadata changes and renames inside a root never reach the
/// engine. An entry moved into a root from outside counts as created; an
/// entry moved out of a root is not reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// A file or directory entry appeared.
    EntryCreated,
    /// A file or directory entry disappeared.
    EntryRemoved,
}

impl ChangeKind {
    /// Map a notify event kind onto a monitored change, if it is one.
    pub fn from_event_kind(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Create(_) => Some(ChangeKind::EntryCreated),
            EventKind::Remove(_) => Some(ChangeKind::EntryRemoved),
            _ => None,
        }
    }
}

/// Pairs rename halves seen by one watch so only moves into the root count.
///
/// A `Name(To)` matching an earlier `Name(From)` (same tracker, or both
/// untracked) is a rename inside the root and is dropped. An unpaired
/// `Name(To)` is an entry arriving from outside and maps to
/// [`ChangeKind::EntryCreated`]. A lone `Name(From)` cannot be told apart
/// from the first half of an in-root rename, so moves out are not reported.
/// Backends that only emit `Name(Any)` report neither.
#[derive(Debug, Default)]
pub(crate) struct MoveTracker {
    pending_from: VecDeque<Option<usize>>,
}

impl MoveTracker {
    /// Classify one notify event, updating rename pairing state.
    pub(crate) fn classify(&mut self, event: &Event) -> Option<ChangeKind> {
        match &event.kind {
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                if self.pending_from.len() == MAX_PENDING_MOVES {
                    self.pending_from.pop_front();
                }
                self.pending_from.push_back(event.tracker());
                None
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let tracker = event.tracker();
                match self.pending_from.iter().position(|from| *from == tracker) {
                    Some(index) => {
                        self.pending_from.remove(index);
                        None
                    }
                    None => Some(ChangeKind::EntryCreated),
                }
            }
            kind => ChangeKind::from_event_kind(kind),
        }
    }
}

/// Zero-argument callback invoked once activity has settled.
pub type ChangeCallback = Arc<dyn Fn() + Send + Sync>;

/// Diagnostic sink for per-root warnings.
///
/// Implementations accept free-form strings and must not panic.
pub trait LogSink: Send + Sync {
    fn trace_message(&self, message: &str);
}

/// Default sink forwarding messages to `tracing` at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn trace_message(&self, message: &str) {
        tracing::warn!(target: "dirwatch", "[watcher] {message}");
    }
}
