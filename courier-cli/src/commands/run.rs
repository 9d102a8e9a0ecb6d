use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use courier::adb::Adb;
use courier::campaign::CampaignReport;
use courier::journal::read_daily_message;
use courier::send::personalise;
use courier::targets::{clean_chat_name, load_chat_list, summarize};
use courier::{Campaign, ChatStatus, Journal, Selection, Settings};
use std::sync::Arc;
use tracing::{info, warn};

use super::{devices, ServerArgs};
use crate::prompt;

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Handset profile for the coordinate taps (see `courier profiles`)
    #[arg(long, short = 'd', env = "COURIER_DEVICE")]
    pub device: Option<String>,

    /// First list position to process (1-based)
    #[arg(long)]
    pub start: Option<usize>,

    /// Last list position to process (inclusive)
    #[arg(long)]
    pub end: Option<usize>,

    /// Only the first N chats
    #[arg(long, conflicts_with_all = ["start", "end"])]
    pub first: Option<usize>,

    /// Send the message without the leading @name
    #[arg(long)]
    pub no_mention: bool,

    /// Multiplier on every pause; slow handsets want more than 1
    #[arg(long)]
    pub pace: Option<f64>,

    /// No prompts and no confirmation
    #[arg(long, short)]
    pub yes: bool,
}

pub async fn execute(args: RunArgs, mut settings: Settings) -> Result<()> {
    args.server.apply(&mut settings);
    if args.no_mention {
        settings.mention = false;
    }
    if let Some(pace) = args.pace {
        settings.pace = pace;
    }
    settings.validate()?;
    let interactive = !args.yes && prompt::is_interactive();

    let message = read_daily_message(&settings.paths.message)
        .with_context(|| format!("Reading {}", settings.paths.message.display()))?;
    let entries = load_chat_list(&settings.paths.chat_list)
        .with_context(|| format!("Reading {}", settings.paths.chat_list.display()))?;
    if entries.is_empty() {
        bail!("{} has no chats", settings.paths.chat_list.display());
    }
    println!(
        "📋 {}",
        summarize(&entries, &settings.name_prefix).to_string().bold()
    );

    if settings.server.udid.is_none() {
        settings.server.udid = devices::pick_device(interactive).await?;
    }
    let profile = match args.device {
        Some(name) => name,
        None if interactive => {
            let names: Vec<String> = settings.profiles().into_keys().collect();
            prompt::choose_profile(&names, &settings.device)?
        }
        None => settings.device.clone(),
    };
    let selection = match Selection::from_bounds(args.start, args.end, args.first)? {
        Selection::All if interactive => prompt::choose_selection(entries.len())?,
        selection => selection,
    };
    let selected = selection.apply(&entries)?;

    let first = &selected[0];
    let preview = personalise(
        &message,
        &clean_chat_name(&first.name, &settings.name_prefix),
        settings.mention,
    );
    println!("📨 {} chats ({selection}), first message:", selected.len());
    println!("    {}", preview.italic());
    if interactive && !prompt::confirm(&format!("Send to {} chats?", selected.len()))? {
        println!("Cancelled.");
        return Ok(());
    }

    let journal = Journal::new(&settings.paths.data_dir);
    let mut session = courier::start_session(&settings, Some(profile.as_str()))
        .await
        .context("Could not start the automation session. Is the Appium server running?")?;

    let campaign = Campaign::new(message, settings.campaign_options(), &journal);
    let campaign = if settings.server.udid.is_some() {
        campaign.with_link(Arc::new(Adb::new("adb", settings.pacing())))
    } else {
        campaign
    };

    let outcome = tokio::select! {
        report = campaign.run(&mut session, selected) => Some(report),
        _ = tokio::signal::ctrl_c() => None,
    };
    session.quit().await;

    match outcome {
        Some(report) => {
            let report = report?;
            print_report(&report);
            if report.stopped_early {
                bail!("the run stopped early because the session could not be recovered");
            }
        }
        None => {
            println!("\n{}", "Interrupted, automation session closed.".yellow());
            if let Err(e) = journal.record_event("interrupted", "Run cancelled with Ctrl+C") {
                warn!("Could not write the event log: {}", e);
            }
        }
    }
    info!("Logs are in {}", journal.dir().display());
    Ok(())
}

fn print_report(report: &CampaignReport) {
    println!("\n{}", "=== Run summary ===".bold());
    for result in &report.results {
        let mark = match result.status {
            ChatStatus::Sent => "✓".green(),
            ChatStatus::Failed => "✗".red(),
            ChatStatus::NotFound => "?".yellow(),
        };
        println!(
            "  {mark} {} {} ({:.1}s)",
            result.entry,
            result.status,
            result.elapsed.as_secs_f64()
        );
    }
    if !report.skipped.is_empty() {
        println!("  {} already done today", report.skipped.len());
    }
    if report.recoveries > 0 {
        println!("  {} session recoveries", report.recoveries);
    }
    println!("{}", report.summary().bold());
    if report.count(ChatStatus::NotFound) > 0 {
        println!(
            "{}",
            "Run `courier prune-not-found` with today's not-found log to drop those chats.".dimmed()
        );
    }
}
