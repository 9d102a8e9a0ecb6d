use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use courier::driver::{BrowserCapabilities, BrowserConnector, DriverFactory};
use courier::groups::{save_group_names, GroupExtractor};
use courier::{AutomationError, Journal, Settings};
use std::path::PathBuf;
use tracing::warn;

#[derive(Args, Debug)]
pub struct ExtractGroupsArgs {
    /// Browser WebDriver server (geckodriver listens on 4444)
    #[arg(long, default_value = "http://localhost:4444", env = "WEBDRIVER_URL")]
    pub webdriver: String,

    /// firefox, chrome or chromium
    #[arg(long, default_value = "firefox")]
    pub browser: String,

    /// Browser profile already logged in to the web client
    #[arg(long, env = "COURIER_BROWSER_PROFILE")]
    pub profile: Option<PathBuf>,

    /// Where to write the names (defaults to group_names.txt in the data folder)
    #[arg(long, short)]
    pub output: Option<PathBuf>,
}

async fn open_and_extract(extractor: &GroupExtractor) -> Result<Vec<String>, AutomationError> {
    extractor.open().await?;
    extractor.extract().await
}

pub async fn execute(args: ExtractGroupsArgs, settings: Settings) -> Result<()> {
    let connector = BrowserConnector::new(
        args.webdriver.as_str(),
        BrowserCapabilities::new(args.browser.as_str(), args.profile.clone()),
    )?;
    let driver = connector.connect().await.with_context(|| {
        format!(
            "Could not start a browser session at {}. Is the browser driver running?",
            args.webdriver
        )
    })?;
    println!("💡 Press Ctrl+C anytime to close the browser");

    let extractor = GroupExtractor::new(driver.clone(), settings.web.clone(), settings.pacing());
    let outcome = tokio::select! {
        names = open_and_extract(&extractor) => Some(names),
        _ = tokio::signal::ctrl_c() => None,
    };
    if let Err(e) = driver.quit().await {
        warn!("Could not close the browser: {}", e);
    }

    let Some(names) = outcome else {
        println!("\n{}", "Interrupted, browser closed.".yellow());
        return Ok(());
    };
    let names = names.context("Group extraction failed")?;
    if names.is_empty() {
        println!("{}", "No group chats found, nothing saved.".yellow());
        return Ok(());
    }

    let journal = Journal::new(&settings.paths.data_dir);
    let path = args
        .output
        .unwrap_or_else(|| settings.paths.data_dir.join("group_names.txt"));
    let saved = save_group_names(&path, &names, &journal.now())
        .with_context(|| format!("Writing {}", path.display()))?;
    if let Some(backup) = &saved.backup {
        println!("💾 Previous list backed up to {}", backup.display());
    }
    println!(
        "{} {} group chats saved to {}",
        "✓".green(),
        names.len().to_string().bold(),
        saved.path.display()
    );
    if let Err(e) = journal.record_event("groups", &format!("Extracted {} group names", names.len())) {
        warn!("Could not write the event log: {}", e);
    }
    Ok(())
}
