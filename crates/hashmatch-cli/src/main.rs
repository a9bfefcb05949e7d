use clap::Parser;
use hashmatch_core::logging;

mod cli;
mod server;

use crate::cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging as early as possible; never abort on a bad log dir.
    if cli.log_stderr {
        logging::init_logging_stderr();
    } else if let Err(e) = logging::init_logging() {
        logging::init_logging_stderr();
        tracing::warn!("file logging unavailable ({:#}); logging to stderr", e);
    }

    if let Err(err) = cli.run().await {
        tracing::error!("{:#}", err);
        eprintln!("hashmatch error: {:#}", err);
        std::process::exit(1);
    }
}
