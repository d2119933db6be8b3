use std::path::PathBuf;

use clap::Parser;

/// statline: drive a simulated concurrent transfer through the status
/// engine and watch it through any backend.
#[derive(Parser, Debug)]
#[command(name = "statline", version, about, long_about = None)]
pub struct Cli {
    /// Suppress all status output (Silent backend)
    #[arg(short, long, conflicts_with = "debug_dir")]
    pub quiet: bool,

    /// Dump per-task debug artifacts into this directory (Debug backend)
    #[arg(long, value_name = "DIR")]
    pub debug_dir: Option<PathBuf>,

    /// Never redraw the terminal in place, even when stdout is interactive
    #[arg(long)]
    pub no_term: bool,

    /// Number of simulated transfer workers
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Total bytes each worker pretends to move
    #[arg(long, default_value_t = 256 * 1024)]
    pub bytes_per_worker: u64,

    /// Write tracing output to this file instead of stderr
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_args_are_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_quiet_conflicts_with_debug_dir() {
        let parsed = Cli::try_parse_from(["statline", "--quiet", "--debug-dir", "/tmp/x"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["statline"]).expect("parse");
        assert!(!cli.quiet);
        assert!(!cli.no_term);
        assert_eq!(cli.workers, 4);
    }
}
