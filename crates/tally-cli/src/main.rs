//! Tally CLI - array-job progress reconciliation.
//!
//! The main entry point for the `tally` binary.

use anyhow::Result;
use clap::Parser;
use tracing::{Instrument, info_span};

use tally_cli::{Cli, Commands, Services, commands};
use tally_core::observability::init_logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format.into(), "warn");
    let config = cli.config()?;
    let span = info_span!("command", name = cli.command.name());

    // Reading stdin needs no collaborators
    if let Commands::Missing(args) = &cli.command {
        return span.in_scope(|| commands::missing::execute(args, &config));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let run = async {
        let services = Services::aws(cli.region.clone()).await;
        match cli.command {
            Commands::Completed(args) => commands::completed::execute(args, &config, &services).await,
            Commands::InProgress(args) => {
                commands::in_progress::execute(args, &config, &services).await
            }
            Commands::Remaining(args) => commands::remaining::execute(args, &config, &services).await,
            Commands::SearchLogs(args) => {
                commands::search_logs::execute(args, &config, &services).await
            }
            Commands::Pairs(args) => commands::pairs::execute(args, &config, &services).await,
            Commands::Missing(args) => commands::missing::execute(&args, &config),
        }
    };
    runtime.block_on(run.instrument(span))
}
