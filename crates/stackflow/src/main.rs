mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stack")]
#[command(about = "Declare, plan and preview a Lago deployment on AWS", long_about = None)]
struct Cli {
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the resources that would be created, in order
    Plan {
        /// Stack file (default: discovered, see STACKFLOW_CONFIG_PATH)
        #[arg(short, long, env = "STACKFLOW_CONFIG_PATH")]
        config: Option<PathBuf>,
    },
    /// Apply against the in-memory provider and show the exports
    Preview {
        /// Stack file (default: discovered, see STACKFLOW_CONFIG_PATH)
        #[arg(short, long, env = "STACKFLOW_CONFIG_PATH")]
        config: Option<PathBuf>,
        /// Simulate a provider failure for this resource (repeatable)
        #[arg(long = "fail-on", value_name = "NAME")]
        fail_on: Vec<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Plan { config } => commands::plan::handle(config.as_deref())?,
        Commands::Preview { config, fail_on } => {
            commands::preview::handle(config.as_deref(), fail_on).await?
        }
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
