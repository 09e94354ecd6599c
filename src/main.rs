mod audit;
mod cli;
mod gateway;
mod logging;
mod model;
mod orchestrator;
mod report;
mod sync;
#[cfg(feature = "tui")]
mod tui;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    // Keep the guard alive so buffered file logs are flushed on exit.
    let _log_guard = logging::init(args.log_file.as_deref(), args.runs_tui())?;
    cli::run(args).await
}
