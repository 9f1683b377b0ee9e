//! flowbridge CLI and HTTP entry point.
//!
//! Binary name: `flowbridge`
//!
//! Parses CLI arguments, sets up tracing, wires services, then dispatches to
//! the command handler or starts the server.

mod cli;
mod http;
mod state;

use clap::Parser;

use cli::{Cli, Commands, CredentialsCommand};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    flowbridge_observe::tracing_setup::init_tracing(cli.otel, cli.log_filter())
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    flowbridge_observe::tracing_setup::shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let state = AppState::init(cli.data_dir.clone(), cli.config.as_deref()).await?;

    match cli.command {
        Commands::Serve { port, host } => {
            cli::serve::serve(state, host, port).await?;
        }

        Commands::Reconcile { dry_run } => {
            cli::reconcile::reconcile(&state, dry_run, cli.json).await?;
        }

        Commands::Credentials { action } => match action {
            CredentialsCommand::List => {
                cli::credentials::list_credentials(&state, cli.json).await?;
            }
        },
    }

    Ok(())
}
