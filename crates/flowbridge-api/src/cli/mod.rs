//! CLI command definitions for the `flowbridge` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod credentials;
pub mod reconcile;
pub mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Session bridge and webhook reconciler between a host platform and a workflow engine.
#[derive(Parser)]
#[command(name = "flowbridge", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Data directory (credentials, config.toml).
    #[arg(long, global = true, env = "FLOWBRIDGE_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Config file (defaults to `<data-dir>/config.toml`).
    #[arg(long, global = true, env = "FLOWBRIDGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Default log filter for the chosen verbosity, used when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 if self.quiet => "error",
            0 => "warn,flowbridge=info,flowbridge_core=info,flowbridge_infra=info",
            1 => "info,flowbridge_core=debug,flowbridge_infra=debug",
            _ => "trace",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server and the reconciliation loop.
    Serve {
        /// Port to listen on (overrides config).
        #[arg(long)]
        port: Option<u16>,

        /// Host to bind to (overrides config).
        #[arg(long)]
        host: Option<String>,
    },

    /// Run a single reconciliation cycle now.
    Reconcile {
        /// Print the plan without applying it.
        #[arg(long)]
        dry_run: bool,
    },

    /// Inspect the credential store.
    Credentials {
        #[command(subcommand)]
        action: CredentialsCommand,
    },
}

#[derive(Subcommand)]
pub enum CredentialsCommand {
    /// List stored accounts (secrets are never printed).
    #[command(alias = "ls")]
    List,
}
