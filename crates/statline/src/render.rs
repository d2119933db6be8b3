use std::time::Instant;

use colored::{Color, Colorize};

use crate::name::TaskName;
use crate::tracker::TrackerEntry;

/// Foreground palette cycled over status-line fragments. Cosmetic only: a
/// tracker's color may change between redraws as neighbours come and go.
const PALETTE: [Color; 7] = [
    Color::Cyan,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Red,
    Color::White,
];

/// Separator between status-line fragments.
const SEPARATOR: &str = "  ";

/// Fragments beyond this many switch to the percentage-only short form.
const MAX_FULL_FRAGMENTS: usize = 4;

/// One tracker's contribution to a status display, or `None` when it has
/// nothing to show yet.
fn fragment(name: &TaskName, entry: &mut TrackerEntry, short: bool, now: Instant) -> Option<String> {
    if let Some(estimator) = entry.estimator.as_mut() {
        let body = if short {
            estimator.short()
        } else {
            estimator.format(now)
        };
        if body.is_empty() {
            return None;
        }
        return Some(format!("{name} {body}"));
    }
    if entry.counter.is_empty() {
        return None;
    }
    let counter = entry.counter;
    if short {
        Some(format!("{name} {:.1}%", counter.percent()))
    } else {
        Some(format!("{name} {counter}"))
    }
}

/// Snapshot lines for the Simple backend: one full-form line per open
/// tracker with something to show, in render order.
pub(crate) fn snapshot_lines(
    rows: Vec<(&TaskName, &mut TrackerEntry)>,
    now: Instant,
) -> Vec<String> {
    rows.into_iter()
        .filter_map(|(name, entry)| fragment(name, entry, false, now))
        .collect()
}

/// The Complex backend's single status line, colored and truncated to the
/// terminal width.
///
/// Fragments accumulate in render order until the next one would push the
/// visible character count past `width`; from the fifth fragment on, the
/// short form buys room for more trackers before truncation.
pub(crate) fn status_line(
    rows: Vec<(&TaskName, &mut TrackerEntry)>,
    width: usize,
    now: Instant,
) -> String {
    let mut visible = 0usize;
    let mut parts: Vec<String> = Vec::new();

    for (name, entry) in rows {
        let short = parts.len() >= MAX_FULL_FRAGMENTS;
        let Some(text) = fragment(name, entry, short, now) else {
            continue;
        };
        let cost = text.chars().count() + if parts.is_empty() { 0 } else { SEPARATOR.len() };
        if visible + cost > width {
            break;
        }
        visible += cost;
        let color = PALETTE[parts.len() % PALETTE.len()];
        parts.push(text.color(color).to_string());
    }

    parts.join(SEPARATOR)
}

/// The line printed when a task completes.
pub(crate) fn completion_line(name: &TaskName, summary: &str) -> String {
    format!("{name} ↦ Completed {summary}")
}

/// An informational line; root messages carry no name prefix.
pub(crate) fn info_line(name: &TaskName, message: &str) -> String {
    if name.is_root() {
        message.to_string()
    } else {
        format!("{name}: {message}")
    }
}
