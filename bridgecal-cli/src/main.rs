mod commands;
mod logging;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bridgecal")]
#[command(about = "Mirror an Outlook desktop calendar and a Google Calendar in both directions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync Outlook <-> Google Calendar
    Sync {
        /// Run a single sync pass and exit
        #[arg(long)]
        once: bool,
        /// Run continuously (the default)
        #[arg(long)]
        daemon: bool,
        /// Polling interval in seconds
        #[arg(long)]
        interval: Option<u64>,
        /// Path to config.toml
        #[arg(long)]
        config: Option<PathBuf>,
        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },
    /// Validate adapter access and local state persistence
    Doctor {
        /// Path to config.toml
        #[arg(long)]
        config: Option<PathBuf>,
        /// Enable debug logging
        #[arg(long)]
        debug: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Sync {
            once,
            daemon,
            interval,
            config,
            debug,
        } => commands::sync::run(once, daemon, interval, config.as_deref(), debug).await,
        Commands::Doctor { config, debug } => commands::doctor::run(config.as_deref(), debug).await,
    };

    std::process::exit(code);
}
