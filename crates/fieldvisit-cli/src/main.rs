//! fvisit: operator CLI for the field-visit draft engine.
//!
//! Parses CLI arguments, opens the draft store in the data directory, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use fieldvisit_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(filter_for_verbosity(cli.verbose, cli.quiet), cli.otel)
        .map_err(|e| anyhow::anyhow!(e))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Shell completions don't need the draft store
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "fvisit", &mut std::io::stdout());
        }

        Commands::Draft { action } => {
            let state = AppState::init(cli.data_dir).await?;
            cli::draft::handle_draft_command(action, &state, cli.json).await?;
        }

        Commands::Status => {
            let state = AppState::init(cli.data_dir).await?;
            cli::status::status(&state, cli.json).await?;
        }
    }

    Ok(())
}
