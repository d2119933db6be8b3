use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize tracing output.
///
/// With a log file, records go through a non-blocking file appender so the
/// terminal stays free for the live status line. Without one, records go
/// to stderr. The level defaults to `warn` and can be overridden via the
/// `STATLINE_LOG` or `RUST_LOG` environment variables.
///
/// Returns a [`WorkerGuard`] that must be held for the lifetime of the
/// program when file logging is active, so buffered records are flushed on
/// shutdown.
pub fn init(log_file: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_env("STATLINE_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let file_name = path.file_name().map_or_else(
                || std::ffi::OsString::from("statline.log"),
                ToOwned::to_owned,
            );
            let file_appender =
                tracing_appender::rolling::never(dir.unwrap_or(Path::new(".")), file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(true),
                )
                .with(env_filter)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(std::io::stderr))
                .with(env_filter)
                .init();
            None
        }
    }
}
