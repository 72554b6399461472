//! Demo CLI for the error-routing pipeline: reads a JSON `ErrorReport` from
//! stdin or a file and prints the resulting `RoutingResult`.

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read as _;
use std::path::PathBuf;

use error_router::{ErrorReport, Router, RouterConfig};

#[derive(Parser)]
#[command(name = "routerctl", about = "Intelligent error-routing pipeline CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a single error report through the pipeline.
    Route {
        /// Path to a JSON file containing an `ErrorReport`; reads stdin if omitted.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Route { file } => route_command(file).await,
    }
}

async fn route_command(file: Option<PathBuf>) -> Result<()> {
    let input = match file {
        Some(path) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("failed to read stdin")?;
            buf
        }
    };

    let report: ErrorReport = serde_json::from_str(&input).context("input is not a valid ErrorReport")?;

    let config = RouterConfig::from_env();
    let router = Router::from_config(config).context("failed to build router")?;

    let result = router.route(&report).await;

    if result.success {
        println!("{}", "routed".green().bold());
    } else if let Some(reason) = &result.skipped_reason {
        println!("{} {reason}", "skipped:".yellow().bold());
    } else {
        println!("{}", "error".red().bold());
    }

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}
