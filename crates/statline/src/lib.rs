//! Real-time status reporting for long-running CLI operations.
//!
//! Work is organized as a dynamic tree of named tasks. Producer code holds
//! cheap [`Task`]/[`Progress`] handles and fires informational messages,
//! nested sub-tasks and byte-level progress updates at them; a single
//! backend loop aggregates the resulting event stream and renders it to an
//! interactive terminal, a plain log stream, per-task debug artifacts, or
//! nowhere at all. The producing code never learns which presentation is
//! active.
//!
//! # Quick start
//!
//! ```no_run
//! use statline::{Options, Reporter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), statline::RunError> {
//!     let (reporter, root) = Reporter::new(&Options::default())?;
//!     let control = reporter.control();
//!     let consumer = tokio::spawn(reporter.run());
//!
//!     let download = root.subtask_with_progress("download");
//!     download.update(0, 1024 * 1024);
//!     // ... feed bytes as they move ...
//!     download.update(1024 * 1024, 0);
//!     download.complete();
//!     root.complete();
//!
//!     control.shutdown();
//!     consumer.await.expect("consumer task")?;
//!     Ok(())
//! }
//! ```
//!
//! # Guarantees
//!
//! - Handle methods never fail and never observe rendering errors; sends
//!   are fire-and-forget.
//! - Events from one handle are consumed in the order they were sent; the
//!   single shared queue gives a global order across all producers.
//! - The tracker registry is owned by the consumer loop alone, so it needs
//!   no locks; broken producer contracts (duplicate names, completing a
//!   task with open children, events for unknown tasks) end the loop with
//!   a structured [`ProtocolError`] instead of being silently ignored.

mod backend;
mod counter;
mod estimate;
mod event;
mod name;
mod render;
mod task;
mod tracker;

pub use backend::{Control, Mode, Options, Reporter, RunError};
pub use counter::Counter;
pub use estimate::RateEstimator;
pub use event::{Event, Payload};
pub use name::TaskName;
pub use task::{Progress, Task};
pub use tracker::ProtocolError;
