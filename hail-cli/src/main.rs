//! Hail CLI - Command-line interface for the Hail dispatch server
//!
//! This is the entry point for running the real-time ride dispatch
//! service and for poking at a running instance.

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "hail")]
#[command(version)]
#[command(about = "Real-time ride dispatch server", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the dispatch server
    Serve {
        /// Port for the participant dispatch socket
        #[arg(short, long, default_value = "7510")]
        port: u16,

        /// Port for the monitoring feed
        #[arg(long, default_value = "7511")]
        monitor_port: u16,

        /// Port for the query surface
        #[arg(long, default_value = "7512")]
        query_port: u16,

        /// Headless mode: bind to 0.0.0.0 for remote access
        #[arg(long)]
        headless: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Serve {
            port,
            monitor_port,
            query_port,
            headless,
        } => commands::serve(port, monitor_port, query_port, headless).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
