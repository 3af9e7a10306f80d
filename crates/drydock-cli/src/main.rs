//! Drydock CLI - converge clusters towards a Clusterfile.

mod commands;

use clap::{Parser, Subcommand};
use drydock_control::ApplyMode;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drydock")]
#[command(about = "Converge clusters towards a Clusterfile")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply a Clusterfile: create, scale up or install
    Apply {
        /// Clusterfile describing the desired cluster
        #[arg(short = 'f', long, default_value = "")]
        clusterfile: PathBuf,

        /// Configuration file (defaults to drydock.toml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Apply mode: apply or load_image
        #[arg(short, long)]
        mode: Option<ApplyMode>,

        /// Argument passed to an app installer (repeatable)
        #[arg(long = "app-arg", value_name = "ARG")]
        app_args: Vec<String>,
    },

    /// Show the action an apply would take, without dispatching it
    Plan {
        /// Clusterfile describing the desired cluster
        #[arg(short = 'f', long, default_value = "")]
        clusterfile: PathBuf,

        /// Configuration file (defaults to drydock.toml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Print the action as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug,hyper=info,reqwest=info"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    let result: Result<(), anyhow::Error> = match cli.command {
        Commands::Apply {
            clusterfile,
            config,
            mode,
            app_args,
        } => commands::apply::run(commands::apply::ApplyArgs {
            clusterfile,
            config,
            mode,
            app_args,
        })
        .await
        .map_err(Into::into),
        Commands::Plan {
            clusterfile,
            config,
            json,
        } => commands::plan::run(&clusterfile, config.as_deref(), json)
            .await
            .map_err(Into::into),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
