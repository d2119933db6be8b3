//! Terminal backend: a single in-place status line redrawn a few times per
//! second, width-aware truncation, colored fragments, and live adjustment
//! to terminal resizes. Info and completion lines scroll above the status
//! line; the status line itself is cleared before every redraw so it never
//! duplicates.

use std::io::{self, Write};
use std::time::{Duration, Instant};

use colored::Colorize;
use crossterm::cursor::MoveToColumn;
use crossterm::event::{Event as TermEvent, EventStream};
use crossterm::terminal::{Clear, ClearType};
use futures::StreamExt;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::event::Event;
use crate::render;

use super::{Aggregator, Line, RunError};

/// Status-line redraw cadence.
const REDRAW_EVERY: Duration = Duration::from_millis(200);

pub(crate) async fn run(
    mut rx: UnboundedReceiver<Event>,
    mut shutdown: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), RunError> {
    let mut agg = Aggregator::new();
    let mut out = io::stdout();

    let (cols, _rows) = crossterm::terminal::size()?;
    let mut width = cols as usize;

    let mut term_events = EventStream::new();
    let mut term_events_alive = true;

    let mut tick = tokio::time::interval(REDRAW_EVERY);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut status_visible = false;

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => match agg.apply(&event) {
                    Ok(Some(line)) => {
                        clear_status(&mut out, &mut status_visible)?;
                        write_line(&mut out, &line)?;
                    }
                    Ok(None) => {}
                    Err(error) => {
                        clear_status(&mut out, &mut status_visible)?;
                        return Err(error.into());
                    }
                },
                // Every producer handle dropped: a clean end.
                None => break,
            },
            _ = tick.tick() => redraw(&mut agg, &mut out, width, &mut status_visible)?,
            maybe = term_events.next(), if term_events_alive => match maybe {
                Some(Ok(TermEvent::Resize(cols, _rows))) => width = cols as usize,
                Some(_) => {}
                None => term_events_alive = false,
            },
            _ = cancel.changed() => {
                clear_status(&mut out, &mut status_visible)?;
                return Err(RunError::Cancelled);
            }
            _ = shutdown.changed() => {
                clear_status(&mut out, &mut status_visible)?;
                while let Ok(event) = rx.try_recv() {
                    if let Some(line) = agg.apply(&event)? {
                        write_line(&mut out, &line)?;
                    }
                }
                break;
            }
        }
    }

    clear_status(&mut out, &mut status_visible)?;
    out.flush()?;
    Ok(())
}

fn write_line(out: &mut impl Write, line: &Line) -> io::Result<()> {
    match line {
        Line::Info { name, message } => writeln!(out, "{}", render::info_line(name, message)),
        Line::Completed { name, summary } => {
            writeln!(out, "{}", render::completion_line(name, summary).green())
        }
    }
}

/// Redraw the status line in place: wipe the current line, then write the
/// freshly assembled fragments without a trailing newline.
fn redraw(
    agg: &mut Aggregator,
    out: &mut impl Write,
    width: usize,
    status_visible: &mut bool,
) -> io::Result<()> {
    let line = render::status_line(agg.tracker.ordered_open(), width, Instant::now());
    crossterm::execute!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    write!(out, "{line}")?;
    out.flush()?;
    *status_visible = !line.is_empty();
    Ok(())
}

/// Wipe the status line before scrolling output or leaving the loop.
fn clear_status(out: &mut impl Write, status_visible: &mut bool) -> io::Result<()> {
    if *status_visible {
        crossterm::execute!(out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        *status_visible = false;
    }
    Ok(())
}
