//! Courier CLI
//!
//! Sends a daily message to a list of chats on an Android handset through an
//! Appium server, and keeps the chat list tidy between runs.
//!
//! Usage from the data folder (the one holding `txt/` and `daily_photos/`):
//!   courier run                      # Interactive run over txt/chat_name.txt
//!   courier run --start 120 --yes    # Resume from list position 120, no prompts
//!   courier doctor                   # Check server, device and data files
//!   courier inspect -o ui.xml        # Dump the current screen for new selectors
//!   courier prune-processed txt/chat_name.txt txt/processed_chats_2025-03-09.txt
//!   courier extract-groups --profile ~/.mozilla/firefox/x1y2.NepalWin

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use courier::Settings;
use std::path::PathBuf;

mod commands;
mod logging;
mod prompt;

use commands::{doctor, groups, inspect, lists, run, ServerArgs};

#[derive(Parser)]
#[command(name = "courier")]
#[command(about = "📨 Courier - search-and-send automation for a mobile messenger")]
#[command(version)]
struct Cli {
    /// Settings file (YAML). Defaults to ./courier.yaml when it exists
    #[arg(long, short = 'c', global = true, env = "COURIER_CONFIG")]
    config: Option<PathBuf>,

    /// Debug output on the console
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send the daily message to the chats in the list
    Run(run::RunArgs),
    /// Break the chat list down into phone numbers and named chats
    Summary(lists::SummaryArgs),
    /// List handsets adb sees as ready
    Devices,
    /// List handset profiles (built-in and configured)
    Profiles,
    /// Check the Appium server, the handset and the data files
    Doctor(ServerArgs),
    /// Dump the elements on the current screen
    Inspect(inspect::InspectArgs),
    /// Remove duplicate lines from a chat list
    Dedupe(lists::DedupeArgs),
    /// Remove chats listed in a not-found log
    PruneNotFound(lists::PruneArgs),
    /// Remove chats listed in a processed log
    PruneProcessed(lists::PruneArgs),
    /// Collect group chat names from the web client in a desktop browser
    ExtractGroups(groups::ExtractGroupsArgs),
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli).await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let settings =
        Settings::load_or_default(cli.config.as_deref()).context("Failed to load settings")?;
    logging::init(&settings.paths.log_dir, cli.verbose);

    match cli.command {
        Commands::Run(args) => run::execute(args, settings).await,
        Commands::Summary(args) => lists::summary(args, &settings),
        Commands::Devices => commands::devices::list().await,
        Commands::Profiles => {
            commands::devices::profiles(&settings);
            Ok(())
        }
        Commands::Doctor(server) => doctor::execute(server, settings).await,
        Commands::Inspect(args) => inspect::execute(args, settings).await,
        Commands::Dedupe(args) => lists::dedupe(args),
        Commands::PruneNotFound(args) => lists::prune(args, courier::prune::LogKind::NotFound),
        Commands::PruneProcessed(args) => lists::prune(args, courier::prune::LogKind::Processed),
        Commands::ExtractGroups(args) => groups::execute(args, settings).await,
    }
}
