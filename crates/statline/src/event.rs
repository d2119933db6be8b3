use std::time::Instant;

use crate::name::TaskName;

/// Events flowing from producer handles to a backend's aggregation loop.
///
/// Events decouple the code doing the work from the presentation layer:
/// producers enqueue these records and never learn whether a terminal, a
/// plain log stream, a debug directory, or nothing at all consumes them.
#[derive(Debug, Clone)]
pub struct Event {
    /// When the producer emitted the event.
    pub at: Instant,
    /// Hierarchical name of the emitting task.
    pub name: TaskName,
    pub payload: Payload,
}

/// The three kinds of event payload, matched exhaustively by every consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A display message for the task.
    Info { message: String },
    /// Task created (`done == false`) or completed (`done == true`).
    Lifecycle { done: bool },
    /// Incremental (not absolute) byte counts for the task.
    Progress { completed: i64, total: i64 },
}
