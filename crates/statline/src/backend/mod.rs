//! Backend construction and the per-backend aggregation loops.
//!
//! A backend owns the consuming half of the event queue plus the tracker
//! registry. Exactly one consumer loop drains the queue per backend
//! instance, which is what lets the registry go entirely unsynchronized.

mod complex;
mod debug;
mod simple;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use crossterm::tty::IsTty;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::sync::watch;

use crate::event::{Event, Payload};
use crate::name::TaskName;
use crate::task::Task;
use crate::tracker::{ProtocolError, Tracker};

/// Construction-time configuration, typically filled from CLI flags by the
/// owning process.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Drop all status output (Silent backend).
    pub quiet: bool,
    /// Write per-task debug artifacts under this directory (Debug backend).
    pub debug_dir: Option<PathBuf>,
    /// Never use terminal redraw even when stdout is a terminal.
    pub no_term: bool,
}

/// The four presentation strategies. Quiet, debug and default are mutually
/// exclusive; default picks terminal redraw only on an interactive stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Silent,
    Simple,
    Complex,
    Debug(PathBuf),
}

impl Options {
    pub fn mode(&self) -> Mode {
        if self.quiet {
            Mode::Silent
        } else if let Some(dir) = &self.debug_dir {
            Mode::Debug(dir.clone())
        } else if !self.no_term && io::stdout().is_tty() {
            Mode::Complex
        } else {
            Mode::Simple
        }
    }
}

/// Why a backend's [`Reporter::run`] loop ended early.
#[derive(Debug, Error)]
pub enum RunError {
    /// A producer broke the task protocol; the diagnostic names the task
    /// and operation. Fatal for the loop, structured for the host.
    #[error("producer contract violated: {0}")]
    Protocol(#[from] ProtocolError),

    /// Environmental failure: terminal, output stream or debug files.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The session was cancelled; queued events were dropped.
    #[error("status loop cancelled")]
    Cancelled,
}

/// Cloneable handle for ending a reporter's loop from outside.
#[derive(Debug, Clone)]
pub struct Control {
    inner: Arc<ControlInner>,
}

#[derive(Debug)]
struct ControlInner {
    shutdown: watch::Sender<bool>,
    cancel: watch::Sender<bool>,
}

impl Control {
    /// Clean shutdown: the loop drains everything already queued, then
    /// exits without error. Use once producers are known to be finished.
    pub fn shutdown(&self) {
        let _ = self.inner.shutdown.send(true);
    }

    /// Abort: the loop exits promptly with [`RunError::Cancelled`] and any
    /// still-queued events are dropped.
    pub fn cancel(&self) {
        let _ = self.inner.cancel.send(true);
    }
}

/// One backend instance: the consuming side of the event queue.
///
/// Created together with the root [`Task`] handle; [`run`](Self::run)
/// blocks the calling future until shutdown, cancellation or the last
/// producer handle dropping.
#[derive(Debug)]
pub struct Reporter {
    mode: Mode,
    rx: Option<UnboundedReceiver<Event>>,
    control: Control,
    shutdown_rx: watch::Receiver<bool>,
    cancel_rx: watch::Receiver<bool>,
}

impl Reporter {
    /// Build the backend selected by `options` and hand out the root task
    /// handle. The Debug backend's directory is created eagerly so an
    /// unwritable path fails here rather than mid-run.
    pub fn new(options: &Options) -> io::Result<(Reporter, Task)> {
        let mode = options.mode();
        if let Mode::Debug(dir) = &mode {
            std::fs::create_dir_all(dir)?;
        }

        let (rx, root) = match mode {
            Mode::Silent => (None, Task::open_root(None)),
            _ => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Some(rx), Task::open_root(Some(tx)))
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let control = Control {
            inner: Arc::new(ControlInner {
                shutdown: shutdown_tx,
                cancel: cancel_tx,
            }),
        };

        tracing::debug!(?mode, "status reporter constructed");
        Ok((
            Reporter {
                mode,
                rx,
                control,
                shutdown_rx,
                cancel_rx,
            },
            root,
        ))
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn control(&self) -> Control {
        self.control.clone()
    }

    /// Run the aggregation loop to completion.
    ///
    /// Returns `Ok(())` on clean shutdown (explicit signal or all producer
    /// handles dropped, queue drained either way), `Err` on cancellation, a
    /// broken producer contract, or an environmental failure.
    pub async fn run(self) -> Result<(), RunError> {
        // The control handle stays alive for the whole loop so the watch
        // senders cannot disappear under the select arms.
        let Reporter {
            mode,
            rx,
            control: _control,
            shutdown_rx,
            cancel_rx,
        } = self;

        match (mode, rx) {
            (Mode::Silent, _) => silent(shutdown_rx, cancel_rx).await,
            (Mode::Simple, Some(rx)) => simple::run(rx, shutdown_rx, cancel_rx).await,
            (Mode::Complex, Some(rx)) => complex::run(rx, shutdown_rx, cancel_rx).await,
            (Mode::Debug(dir), Some(rx)) => debug::run(dir, rx, shutdown_rx, cancel_rx).await,
            // Only Silent is constructed without a queue.
            (_, None) => unreachable!("non-silent reporter without a queue"),
        }
    }
}

/// The Silent backend has nothing to drain; it just waits to be told the
/// session is over.
async fn silent(
    mut shutdown: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), RunError> {
    tokio::select! {
        _ = cancel.changed() => Err(RunError::Cancelled),
        _ = shutdown.changed() => Ok(()),
    }
}

/// A rendered consequence of one event, handed to the active backend.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Line {
    Info { name: TaskName, message: String },
    Completed { name: TaskName, summary: String },
}

/// The dispatch shared by every draining backend: updates the tracker
/// registry and reports what, if anything, deserves a line of output.
#[derive(Debug, Default)]
pub(crate) struct Aggregator {
    pub tracker: Tracker,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &Event) -> Result<Option<Line>, ProtocolError> {
        let result = match &event.payload {
            Payload::Lifecycle { done: false } => self
                .tracker
                .on_create(&event.name, event.at)
                .map(|()| None),
            Payload::Lifecycle { done: true } => {
                self.tracker.on_complete(&event.name, event.at).map(|summary| {
                    if event.name.is_root() {
                        // The root is never rendered.
                        None
                    } else {
                        Some(Line::Completed {
                            name: event.name.clone(),
                            summary,
                        })
                    }
                })
            }
            Payload::Info { message } => self.tracker.on_info(&event.name).map(|()| {
                Some(Line::Info {
                    name: event.name.clone(),
                    message: message.clone(),
                })
            }),
            Payload::Progress { completed, total } => self
                .tracker
                .on_progress(&event.name, *completed, *total, event.at)
                .map(|()| None),
        };
        if let Err(error) = &result {
            tracing::warn!(%error, "fatal protocol violation in event stream");
        }
        result
    }
}
