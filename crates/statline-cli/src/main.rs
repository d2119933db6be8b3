mod cli;
mod logging;
mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use statline::{Options, Reporter};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.log_file.as_deref());

    let options = Options {
        quiet: cli.quiet,
        debug_dir: cli.debug_dir.clone(),
        no_term: cli.no_term,
    };
    let (reporter, root) = Reporter::new(&options).context("failed to set up status backend")?;
    let control = reporter.control();

    // Ctrl-C cancels the session: the status loop exits promptly and
    // drops whatever is still queued.
    let interrupt = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("interrupt received, cancelling status loop");
            interrupt.cancel();
        }
    });

    let consumer = tokio::spawn(reporter.run());

    workload::run(&root, cli.workers, cli.bytes_per_worker).await;
    root.complete();

    control.shutdown();
    match consumer.await.context("status loop panicked")? {
        Ok(()) => {
            if !cli.quiet {
                println!("\n{}", "SUCCESS".green().bold());
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("\n{} {}", "FAILED".red().bold(), e);
            std::process::exit(1);
        }
    }
}
