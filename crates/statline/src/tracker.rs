use std::collections::BTreeMap;
use std::time::Instant;

use thiserror::Error;

use crate::counter::Counter;
use crate::estimate::RateEstimator;
use crate::name::TaskName;

/// A broken producer/consumer contract. These are defects in caller code,
/// not recoverable runtime conditions: the aggregation loop stops and
/// returns the error to the host process instead of limping on.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("task \"{name}\" created twice")]
    DuplicateTask { name: TaskName },

    #[error("{operation} event for unknown task \"{name}\"")]
    UnknownTask {
        name: TaskName,
        operation: &'static str,
    },

    #[error("task \"{name}\" completed while only {completed} of {total} sub-tasks are finished")]
    OpenSubtasks {
        name: TaskName,
        completed: u64,
        total: u64,
    },

    #[error("invalid task name \"{name}\": {reason}")]
    InvalidSegment {
        name: TaskName,
        reason: &'static str,
    },
}

/// Bookkeeping for one currently-open task.
#[derive(Debug)]
pub(crate) struct TrackerEntry {
    pub created_at: Instant,
    pub counter: Counter,
    /// Present only once a progress delta has been observed for the task.
    pub estimator: Option<RateEstimator>,
}

/// Server-side registry mapping open task names to their tracking state.
///
/// Owned exclusively by a backend's aggregation loop; the single-consumer
/// discipline is what makes this structure lock-free. Closed tasks leave no
/// trace here (`Unknown` and `Closed` are indistinguishable).
#[derive(Debug, Default)]
pub(crate) struct Tracker {
    entries: BTreeMap<TaskName, TrackerEntry>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a tracker for `name`. The parent's counter, if the parent is
    /// open, gains one expected child.
    pub fn on_create(&mut self, name: &TaskName, at: Instant) -> Result<(), ProtocolError> {
        if let Some(segment) = name.last() {
            if segment.is_empty() {
                return Err(ProtocolError::InvalidSegment {
                    name: name.clone(),
                    reason: "empty segment",
                });
            }
            if segment.contains('\0') {
                return Err(ProtocolError::InvalidSegment {
                    name: name.clone(),
                    reason: "segment contains a null byte",
                });
            }
        }
        if self.entries.contains_key(name) {
            return Err(ProtocolError::DuplicateTask { name: name.clone() });
        }
        tracing::debug!(task = %name, "task opened");
        self.entries.insert(
            name.clone(),
            TrackerEntry {
                created_at: at,
                counter: Counter::default(),
                estimator: None,
            },
        );
        if let Some(parent) = name.parent()
            && let Some(entry) = self.entries.get_mut(&parent)
        {
            entry.counter.child_created();
        }
        Ok(())
    }

    /// Close the tracker for `name`, returning its completion summary.
    ///
    /// Rejected while any of the task's own children remain open.
    pub fn on_complete(&mut self, name: &TaskName, at: Instant) -> Result<String, ProtocolError> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| ProtocolError::UnknownTask {
                name: name.clone(),
                operation: "completion",
            })?;
        if !entry.counter.done() {
            return Err(ProtocolError::OpenSubtasks {
                name: name.clone(),
                completed: entry.counter.completed(),
                total: entry.counter.total(),
            });
        }

        // Checked above, the entry is present.
        let entry = self.entries.remove(name).expect("entry present");
        if let Some(parent) = name.parent()
            && let Some(parent_entry) = self.entries.get_mut(&parent)
        {
            parent_entry.counter.child_completed();
        }
        tracing::debug!(task = %name, "task completed");

        let elapsed = at.saturating_duration_since(entry.created_at);
        Ok(match entry.estimator {
            Some(estimator) => estimator.summary(elapsed),
            None => entry.counter.to_string(),
        })
    }

    /// Validate that an info message refers to an open task.
    pub fn on_info(&mut self, name: &TaskName) -> Result<(), ProtocolError> {
        if !self.entries.contains_key(name) {
            return Err(ProtocolError::UnknownTask {
                name: name.clone(),
                operation: "info",
            });
        }
        Ok(())
    }

    /// Feed a progress delta into the task's estimator, creating the
    /// estimator on first report.
    pub fn on_progress(
        &mut self,
        name: &TaskName,
        completed: i64,
        total: i64,
        at: Instant,
    ) -> Result<(), ProtocolError> {
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| ProtocolError::UnknownTask {
                name: name.clone(),
                operation: "progress",
            })?;
        entry
            .estimator
            .get_or_insert_with(|| RateEstimator::new(at))
            .add(at, completed, total);
        Ok(())
    }

    /// Number of currently-open tasks, the root included.
    pub fn open_count(&self) -> usize {
        self.entries.len()
    }

    /// Open non-root trackers in render order: shallowest first, then by
    /// the last name segment. The root is never rendered.
    pub fn ordered_open(&mut self) -> Vec<(&TaskName, &mut TrackerEntry)> {
        let mut rows: Vec<_> = self
            .entries
            .iter_mut()
            .filter(|(name, _)| !name.is_root())
            .collect();
        rows.sort_by(|(a, _), (b, _)| {
            a.depth()
                .cmp(&b.depth())
                .then_with(|| a.last().cmp(&b.last()))
        });
        rows
    }

    /// Counter of an open task, if it is open.
    pub fn counter(&self, name: &TaskName) -> Option<Counter> {
        self.entries.get(name).map(|entry| entry.counter)
    }

    /// Accumulated `(complete, total)` bytes of an open task's estimator,
    /// if one exists yet.
    pub fn progress_totals(&self, name: &TaskName) -> Option<(u64, u64)> {
        self.entries
            .get(name)
            .and_then(|entry| entry.estimator.as_ref())
            .map(|estimator| (estimator.complete(), estimator.total()))
    }

    #[cfg(test)]
    pub fn entry(&self, name: &TaskName) -> Option<&TrackerEntry> {
        self.entries.get(name)
    }
}
