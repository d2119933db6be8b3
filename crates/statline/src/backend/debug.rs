//! Debug backend: instead of rendering, every event is dumped to disk.
//!
//! Layout under the configured root directory:
//!
//! ```text
//! <root>/log.jsonl            every event plus periodic liveness records
//! <root>/counter.csv          root sub-task counter (lazily)
//! <root>/<task>/log.jsonl     the task's own events
//! <root>/<task>/counter.csv   time,completed,total (lazily, sub-tasks)
//! <root>/<task>/progress.csv  time,completed,total (lazily, bytes)
//! ```
//!
//! `<task>` is the sanitized joined display name; times are milliseconds
//! since the loop started. Files for completed tasks are kept.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::event::{Event, Payload};
use crate::name::TaskName;

use super::{Aggregator, RunError};

/// Cadence of the process-wide liveness record in the root log.
const LIVENESS_EVERY: Duration = Duration::from_secs(1);

const CSV_HEADER: &str = "time,completed,total";

pub(crate) async fn run(
    dir: PathBuf,
    mut rx: UnboundedReceiver<Event>,
    mut shutdown: watch::Receiver<bool>,
    mut cancel: watch::Receiver<bool>,
) -> Result<(), RunError> {
    let mut agg = Aggregator::new();
    let mut sink = DebugSink::new(dir)?;

    let mut tick = tokio::time::interval(LIVENESS_EVERY);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            event = rx.recv() => match event {
                Some(event) => {
                    agg.apply(&event)?;
                    sink.record(&event, &agg)?;
                }
                // Every producer handle dropped: a clean end.
                None => break,
            },
            _ = tick.tick() => sink.liveness(agg.tracker.open_count())?,
            _ = cancel.changed() => return Err(RunError::Cancelled),
            _ = shutdown.changed() => {
                while let Ok(event) = rx.try_recv() {
                    agg.apply(&event)?;
                    sink.record(&event, &agg)?;
                }
                break;
            }
        }
    }

    Ok(())
}

/// One JSON line in a debug log.
#[derive(Debug, Serialize)]
struct Record<'a> {
    elapsed_ms: u128,
    task: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    open_tasks: Option<usize>,
}

impl<'a> Record<'a> {
    fn new(elapsed_ms: u128, task: &TaskName, kind: &'static str) -> Self {
        Self {
            elapsed_ms,
            task: task.to_string(),
            kind,
            message: None,
            completed: None,
            total: None,
            open_tasks: None,
        }
    }
}

/// Per-task artifact files. The root task's files live directly in the
/// debug root directory.
#[derive(Debug)]
struct TaskFiles {
    dir: PathBuf,
    log: File,
    counter_csv: Option<File>,
    progress_csv: Option<File>,
}

#[derive(Debug)]
struct DebugSink {
    root: PathBuf,
    started: Instant,
    tasks: HashMap<TaskName, TaskFiles>,
}

impl DebugSink {
    fn new(root: PathBuf) -> io::Result<Self> {
        let mut tasks = HashMap::new();
        tasks.insert(
            TaskName::root(),
            TaskFiles {
                dir: root.clone(),
                log: File::create(root.join("log.jsonl"))?,
                counter_csv: None,
                progress_csv: None,
            },
        );
        Ok(Self {
            root,
            started: Instant::now(),
            tasks,
        })
    }

    /// Append one event to the root log, the task's own log, and the
    /// relevant CSV files.
    fn record(&mut self, event: &Event, agg: &Aggregator) -> io::Result<()> {
        let elapsed_ms = event
            .at
            .saturating_duration_since(self.started)
            .as_millis();

        let record = match &event.payload {
            Payload::Lifecycle { done: false } => {
                self.open_task(&event.name)?;
                Record::new(elapsed_ms, &event.name, "create")
            }
            Payload::Lifecycle { done: true } => Record::new(elapsed_ms, &event.name, "complete"),
            Payload::Info { message } => {
                let mut record = Record::new(elapsed_ms, &event.name, "info");
                record.message = Some(message.as_str());
                record
            }
            Payload::Progress { completed, total } => {
                let mut record = Record::new(elapsed_ms, &event.name, "progress");
                record.completed = Some(*completed);
                record.total = Some(*total);
                record
            }
        };
        self.append_log(&event.name, &record)?;

        match &event.payload {
            Payload::Lifecycle { .. } => {
                // The parent's counter just changed; log its new state.
                if let Some(parent) = event.name.parent()
                    && let Some(counter) = agg.tracker.counter(&parent)
                {
                    self.append_csv(
                        &parent,
                        CsvKind::Counter,
                        elapsed_ms,
                        counter.completed(),
                        counter.total(),
                    )?;
                }
                if matches!(event.payload, Payload::Lifecycle { done: true })
                    && !event.name.is_root()
                {
                    // Keep the files, forget the handles.
                    self.tasks.remove(&event.name);
                }
            }
            Payload::Progress { .. } => {
                if let Some((completed, total)) = agg.tracker.progress_totals(&event.name) {
                    self.append_csv(&event.name, CsvKind::Progress, elapsed_ms, completed, total)?;
                }
            }
            Payload::Info { .. } => {}
        }
        Ok(())
    }

    /// Periodic process-wide liveness line in the root log.
    fn liveness(&mut self, open_tasks: usize) -> io::Result<()> {
        let elapsed_ms = self.started.elapsed().as_millis();
        let mut record = Record::new(elapsed_ms, &TaskName::root(), "alive");
        record.open_tasks = Some(open_tasks);
        let root = TaskName::root();
        append_json(&mut self.files(&root)?.log, &record)
    }

    /// Create the per-task directory and log file.
    fn open_task(&mut self, name: &TaskName) -> io::Result<()> {
        if name.is_root() || self.tasks.contains_key(name) {
            return Ok(());
        }
        let dir = self.root.join(sanitize_dir_name(&name.to_string())?);
        std::fs::create_dir_all(&dir)?;
        let log = File::create(dir.join("log.jsonl"))?;
        self.tasks.insert(
            name.clone(),
            TaskFiles {
                dir,
                log,
                counter_csv: None,
                progress_csv: None,
            },
        );
        Ok(())
    }

    fn files(&mut self, name: &TaskName) -> io::Result<&mut TaskFiles> {
        self.tasks.get_mut(name).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("no debug files for task \"{name}\""),
            )
        })
    }

    /// Write the record to the root log and, for non-root tasks still
    /// open, to the task's own log.
    fn append_log(&mut self, name: &TaskName, record: &Record<'_>) -> io::Result<()> {
        let root = TaskName::root();
        append_json(&mut self.files(&root)?.log, record)?;
        if !name.is_root()
            && let Some(files) = self.tasks.get_mut(name)
        {
            append_json(&mut files.log, record)?;
        }
        Ok(())
    }

    fn append_csv(
        &mut self,
        name: &TaskName,
        kind: CsvKind,
        elapsed_ms: u128,
        completed: u64,
        total: u64,
    ) -> io::Result<()> {
        let Some(files) = self.tasks.get_mut(name) else {
            // The task closed in the same batch; its files are sealed.
            return Ok(());
        };
        let dir = files.dir.clone();
        let slot = match kind {
            CsvKind::Counter => &mut files.counter_csv,
            CsvKind::Progress => &mut files.progress_csv,
        };
        if slot.is_none() {
            let mut file = File::create(dir.join(kind.file_name()))?;
            writeln!(file, "{CSV_HEADER}")?;
            *slot = Some(file);
        }
        let file = slot.as_mut().expect("csv file just opened");
        writeln!(file, "{elapsed_ms},{completed},{total}")
    }
}

#[derive(Debug, Clone, Copy)]
enum CsvKind {
    Counter,
    Progress,
}

impl CsvKind {
    fn file_name(self) -> &'static str {
        match self {
            CsvKind::Counter => "counter.csv",
            CsvKind::Progress => "progress.csv",
        }
    }
}

fn append_json(file: &mut File, record: &Record<'_>) -> io::Result<()> {
    let line = serde_json::to_string(record).map_err(io::Error::other)?;
    writeln!(file, "{line}")
}

/// Turn a joined task display name into a filesystem-safe directory name:
/// forbidden characters become `-`, spaces become `_`. Empty or oversized
/// results are rejected rather than guessed at.
fn sanitize_dir_name(joined: &str) -> io::Result<String> {
    let sanitized: String = joined
        .chars()
        .map(|ch| match ch {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '-',
            ' ' => '_',
            other => other,
        })
        .collect();
    if sanitized.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "task name sanitizes to an empty directory name",
        ));
    }
    if sanitized.chars().count() > 255 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("sanitized task directory name exceeds 255 characters: {sanitized:.32}..."),
        ));
    }
    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Options, Reporter};

    #[test]
    fn test_sanitize_replaces_forbidden_characters() {
        assert_eq!(sanitize_dir_name("a/b:c").expect("sanitize"), "a-b-c");
        assert_eq!(
            sanitize_dir_name("mirror sync <eu>").expect("sanitize"),
            "mirror_sync_-eu-"
        );
        assert_eq!(sanitize_dir_name(r"x\y|z?*").expect("sanitize"), "x-y-z--");
    }

    #[test]
    fn test_sanitize_is_deterministic_and_distinct() {
        let a = sanitize_dir_name("fetch/download").expect("sanitize");
        let b = sanitize_dir_name("fetch/download").expect("sanitize");
        let c = sanitize_dir_name("fetch/upload").expect("sanitize");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_sanitize_rejects_empty_and_oversized() {
        assert!(sanitize_dir_name("").is_err());
        assert!(sanitize_dir_name(&"x".repeat(256)).is_err());
        assert!(sanitize_dir_name(&"x".repeat(255)).is_ok());
    }

    #[tokio::test]
    async fn test_debug_backend_writes_task_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = Options {
            debug_dir: Some(dir.path().to_path_buf()),
            ..Options::default()
        };
        let (reporter, root) = Reporter::new(&options).expect("construct");
        let control = reporter.control();

        root.info("starting");
        let fetch = root.subtask_with_progress("fetch");
        let download = fetch.subtask_with_progress("download");
        for (completed, total) in [(4, 100), (50, 0), (46, 0)] {
            download.update(completed, total);
        }
        download.complete();
        fetch.complete();
        root.complete();

        control.shutdown();
        reporter.run().await.expect("loop runs clean");

        let root_log =
            std::fs::read_to_string(dir.path().join("log.jsonl")).expect("root log exists");
        assert!(root_log.contains("\"kind\":\"create\""));
        assert!(root_log.contains("\"kind\":\"complete\""));
        assert!(root_log.contains("starting"));

        let task_log = std::fs::read_to_string(dir.path().join("fetch-download/log.jsonl"))
            .expect("per-task log exists");
        assert!(task_log.contains("\"kind\":\"progress\""));

        let progress_csv = std::fs::read_to_string(dir.path().join("fetch-download/progress.csv"))
            .expect("progress csv exists");
        assert!(progress_csv.starts_with(CSV_HEADER));
        assert!(
            progress_csv.trim_end().ends_with(",100,100"),
            "progress csv was {progress_csv:?}"
        );

        // The parent's counter history records its single child.
        let counter_csv = std::fs::read_to_string(dir.path().join("fetch/counter.csv"))
            .expect("counter csv exists");
        assert!(counter_csv.contains(",0,1"));
        assert!(counter_csv.contains(",1,1"));
    }

    #[tokio::test]
    async fn test_debug_backend_rejects_unwritable_dir() {
        let file = tempfile::NamedTempFile::new().expect("temp file");
        // A file where a directory is needed: construction must fail.
        let options = Options {
            debug_dir: Some(file.path().to_path_buf()),
            ..Options::default()
        };
        assert!(Reporter::new(&options).is_err());
    }
}
