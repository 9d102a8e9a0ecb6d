use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use courier::prune::{dedupe_file, prune_file, LogKind, PruneReport};
use courier::targets::{load_chat_list, summarize};
use courier::Settings;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct SummaryArgs {
    /// Chat list to summarise (defaults to the configured one)
    pub list: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DedupeArgs {
    /// Chat list file
    pub list: PathBuf,

    /// Write the result here instead of `<list>_no_duplicates.txt`
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Overwrite the list itself
    #[arg(long, conflicts_with = "output")]
    pub in_place: bool,
}

#[derive(Args, Debug)]
pub struct PruneArgs {
    /// Chat list file
    pub list: PathBuf,

    /// Log whose names should leave the list
    pub log: PathBuf,

    /// Write the result here instead of `<list>_cleaned.txt`
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Overwrite the list itself
    #[arg(long, conflicts_with = "output")]
    pub in_place: bool,
}

pub fn summary(args: SummaryArgs, settings: &Settings) -> Result<()> {
    let path = args.list.unwrap_or_else(|| settings.paths.chat_list.clone());
    let entries = load_chat_list(&path).with_context(|| format!("Reading {}", path.display()))?;
    println!(
        "📋 {}: {}",
        path.display(),
        summarize(&entries, &settings.name_prefix).to_string().bold()
    );
    Ok(())
}

fn print_report(target: &Path, report: PruneReport) {
    println!(
        "{} {} lines, kept {}, removed {}",
        "✓".green(),
        report.original,
        report.kept,
        report.removed.to_string().yellow()
    );
    println!("  written to {}", target.display());
}

pub fn dedupe(args: DedupeArgs) -> Result<()> {
    let (target, report) = dedupe_file(&args.list, args.output.as_deref(), args.in_place)
        .with_context(|| format!("Deduplicating {}", args.list.display()))?;
    print_report(&target, report);
    Ok(())
}

pub fn prune(args: PruneArgs, kind: LogKind) -> Result<()> {
    let (target, report) = prune_file(
        &args.list,
        &args.log,
        kind,
        args.output.as_deref(),
        args.in_place,
    )
    .with_context(|| {
        format!(
            "Pruning {} with {}",
            args.list.display(),
            args.log.display()
        )
    })?;
    print_report(&target, report);
    Ok(())
}
