use std::fmt;
use std::io;
use std::time::Instant;

use tokio::sync::mpsc::UnboundedSender;

use crate::event::{Event, Payload};
use crate::name::TaskName;

/// Producer-side handle for one named unit of work.
///
/// Handles are cheap to clone and safe to use from any number of concurrent
/// workers; every call is a fire-and-forget send into the backend's event
/// queue. A handle without a queue belongs to the Silent backend and drops
/// everything.
#[derive(Debug, Clone)]
pub struct Task {
    name: TaskName,
    queue: Option<UnboundedSender<Event>>,
}

impl Task {
    /// Root handle for a freshly constructed backend; announces the root
    /// task on the queue.
    pub(crate) fn open_root(queue: Option<UnboundedSender<Event>>) -> Self {
        let root = Self {
            name: TaskName::root(),
            queue,
        };
        root.send(Payload::Lifecycle { done: false });
        root
    }

    pub fn name(&self) -> &TaskName {
        &self.name
    }

    fn send(&self, payload: Payload) {
        self.send_as(self.name.clone(), payload);
    }

    /// Enqueue a payload under an arbitrary task name. The receiver may be
    /// gone during teardown; those sends are dropped.
    fn send_as(&self, name: TaskName, payload: Payload) {
        if let Some(queue) = &self.queue {
            let _ = queue.send(Event {
                at: Instant::now(),
                name,
                payload,
            });
        }
    }

    /// Emit an informational message for this task.
    pub fn info(&self, message: impl Into<String>) {
        self.send(Payload::Info {
            message: message.into(),
        });
    }

    /// `format_args!` variant of [`info`](Self::info); skips the formatting
    /// work entirely on the Silent backend.
    pub fn infof(&self, args: fmt::Arguments<'_>) {
        if self.queue.is_some() {
            self.info(args.to_string());
        }
    }

    /// Derive a child task handle and announce its creation.
    ///
    /// The caller must call [`complete`](Self::complete) on the result
    /// exactly once; the consuming signature makes a second call
    /// unrepresentable, but dropping the handle without completing it is
    /// still a programmer error the backend will eventually surface.
    pub fn subtask(&self, segment: impl Into<String>) -> Task {
        let child = Task {
            name: self.name.child(segment),
            queue: self.queue.clone(),
        };
        child.send(Payload::Lifecycle { done: false });
        child
    }

    /// Derive a child that reports byte progress. The initial empty delta
    /// makes the backend set up byte-tracking state right away.
    pub fn subtask_with_progress(&self, segment: impl Into<String>) -> Progress {
        Progress::derive(self.subtask(segment), Vec::new())
    }

    /// Announce completion of this task.
    pub fn complete(self) {
        self.send(Payload::Lifecycle { done: true });
    }
}

/// A [`Task`] that additionally reports byte-level progress.
///
/// A `Progress` derived from another `Progress` remembers its
/// byte-aggregating ancestors by name; updates re-emit the same delta for
/// each of them, so a child's bytes also count toward every ancestor's
/// totals. Names, not references: a completed ancestor costs nothing and
/// owns nothing here.
#[derive(Debug, Clone)]
pub struct Progress {
    task: Task,
    /// Aggregating ancestors, outermost first.
    fan_out: Vec<TaskName>,
}

impl Progress {
    fn derive(task: Task, fan_out: Vec<TaskName>) -> Self {
        let progress = Self { task, fan_out };
        progress.update(0, 0);
        progress
    }

    pub fn name(&self) -> &TaskName {
        self.task.name()
    }

    pub fn info(&self, message: impl Into<String>) {
        self.task.info(message);
    }

    pub fn infof(&self, args: fmt::Arguments<'_>) {
        self.task.infof(args);
    }

    /// Report an incremental progress delta for this task and every
    /// aggregating ancestor.
    pub fn update(&self, completed: i64, total: i64) {
        self.task.send(Payload::Progress { completed, total });
        for ancestor in self.fan_out.iter().rev() {
            self.task
                .send_as(ancestor.clone(), Payload::Progress { completed, total });
        }
    }

    /// Derive a plain child task (no byte reporting).
    pub fn subtask(&self, segment: impl Into<String>) -> Task {
        self.task.subtask(segment)
    }

    /// Derive a byte-reporting child whose updates also aggregate into this
    /// task (and this task's own aggregating ancestors).
    pub fn subtask_with_progress(&self, segment: impl Into<String>) -> Progress {
        let mut fan_out = self.fan_out.clone();
        fan_out.push(self.task.name().clone());
        Progress::derive(self.task.subtask(segment), fan_out)
    }

    pub fn complete(self) {
        self.task.complete();
    }
}

/// Byte-sink adapter: writing `n` bytes is `update(n, 0)`, so a `Progress`
/// can sit directly behind `io::copy` or a wrapped writer.
impl io::Write for Progress {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf.len() as i64, 0);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Payload;
    use tokio::sync::mpsc;

    fn drain(rx: &mut mpsc::UnboundedReceiver<Event>) -> Vec<Event> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_root_announces_itself() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _root = Task::open_root(Some(tx));
        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(events[0].name.is_root());
        assert_eq!(events[0].payload, Payload::Lifecycle { done: false });
    }

    #[test]
    fn test_silent_handles_are_no_ops() {
        let root = Task::open_root(None);
        root.info("ignored");
        let download = root.subtask_with_progress("download");
        download.update(10, 20);
        download.complete();
        root.complete();
    }

    #[test]
    fn test_subtask_emits_creation_then_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let root = Task::open_root(Some(tx));
        drain(&mut rx);

        let fetch = root.subtask("fetch");
        fetch.info("hello");
        fetch.complete();

        let events = drain(&mut rx);
        let fetch_name = TaskName::from_segments(["fetch"]);
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.name == fetch_name));
        assert_eq!(events[0].payload, Payload::Lifecycle { done: false });
        assert_eq!(
            events[1].payload,
            Payload::Info {
                message: "hello".into()
            }
        );
        assert_eq!(events[2].payload, Payload::Lifecycle { done: true });
    }

    #[test]
    fn test_progress_fan_out_reaches_all_ancestors() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let root = Task::open_root(Some(tx));
        let outer = root.subtask_with_progress("outer");
        let inner = outer.subtask_with_progress("inner");
        drain(&mut rx);

        inner.update(7, 9);

        let events = drain(&mut rx);
        let progressed: Vec<String> = events
            .iter()
            .filter(|e| e.payload == Payload::Progress { completed: 7, total: 9 })
            .map(|e| e.name.to_string())
            .collect();
        assert_eq!(progressed, ["outer/inner", "outer"]);
    }

    #[test]
    fn test_write_adapter_reports_bytes() {
        use std::io::Write;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let root = Task::open_root(Some(tx));
        let mut download = root.subtask_with_progress("download");
        drain(&mut rx);

        let written = download.write(&[0u8; 64]).expect("write succeeds");
        assert_eq!(written, 64);
        download.flush().expect("flush succeeds");

        let events = drain(&mut rx);
        assert_eq!(
            events[0].payload,
            Payload::Progress {
                completed: 64,
                total: 0
            }
        );
    }
}
