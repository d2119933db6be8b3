//! Line-oriented backend for non-interactive output streams: every info
//! and completion event becomes one line, and a periodic snapshot block
//! lists the open trackers that have progress to show.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::event::Event;
use crate::render;

use super::{Aggregator, Line, RunError};

/// Cadence of the open-tracker snapshot block.
const SNAPSHOT_EVERY: Duration = Duration::from_secs(1);

pub(crate) async fn run(
    mut rx: UnboundedReceiver<Event>,
    mut shutdown: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), RunError> {
    let mut agg = Aggregator::new();
    let mut out = io::stdout();

    let mut tick = tokio::time::interval(SNAPSHOT_EVERY);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    if let Some(line) = agg.apply(&event)? {
                        write_line(&mut out, &line)?;
                    }
                }
                // Every producer handle dropped: a clean end.
                None => break,
            },
            _ = tick.tick() => snapshot(&mut agg, &mut out)?,
            _ = cancel.changed() => return Err(RunError::Cancelled),
            _ = shutdown.changed() => {
                drain(&mut rx, &mut agg, &mut out)?;
                break;
            }
        }
    }

    out.flush()?;
    Ok(())
}

/// Consume whatever is still queued after a shutdown signal.
fn drain(
    rx: &mut UnboundedReceiver<Event>,
    agg: &mut Aggregator,
    out: &mut impl Write,
) -> Result<(), RunError> {
    while let Ok(event) = rx.try_recv() {
        if let Some(line) = agg.apply(&event)? {
            write_line(out, &line)?;
        }
    }
    Ok(())
}

fn write_line(out: &mut impl Write, line: &Line) -> io::Result<()> {
    match line {
        Line::Info { name, message } => writeln!(out, "{}", render::info_line(name, message)),
        Line::Completed { name, summary } => {
            writeln!(out, "{}", render::completion_line(name, summary))
        }
    }
}

/// Print one full-form line per open tracker with non-empty progress.
fn snapshot(agg: &mut Aggregator, out: &mut impl Write) -> io::Result<()> {
    let now = Instant::now();
    for line in render::snapshot_lines(agg.tracker.ordered_open(), now) {
        writeln!(out, "{line}")?;
    }
    out.flush()
}
