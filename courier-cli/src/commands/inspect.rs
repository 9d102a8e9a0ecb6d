use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use courier::driver::DriverFactory;
use courier::inspect::{render, save_page_source, visible_elements};
use courier::Settings;
use std::path::PathBuf;

use super::ServerArgs;

#[derive(Args, Debug)]
pub struct InspectArgs {
    #[command(flatten)]
    pub server: ServerArgs,

    /// Also save the raw UI hierarchy XML here
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Include elements with no id, text or description
    #[arg(long)]
    pub all: bool,

    /// Bring the messenger to its chat list before looking
    #[arg(long)]
    pub open_app: bool,

    /// Handset profile used with --open-app
    #[arg(long, short = 'd', env = "COURIER_DEVICE")]
    pub device: Option<String>,
}

pub async fn execute(args: InspectArgs, mut settings: Settings) -> Result<()> {
    args.server.apply(&mut settings);

    let session = if args.open_app {
        Some(
            courier::start_session(&settings, args.device.as_deref())
                .await
                .context("Could not open the messenger")?,
        )
    } else {
        None
    };
    let driver = match &session {
        Some(session) => session.driver(),
        None => courier::connector(&settings)?
            .connect()
            .await
            .context("Could not connect to the Appium server")?,
    };

    let outcome = async {
        let elements = visible_elements(&*driver, args.all).await?;
        println!("{} {} elements on screen", "🔍".bold(), elements.len());
        print!("{}", render(&elements));
        if let Some(path) = &args.output {
            let bytes = save_page_source(&*driver, path).await?;
            println!("{} hierarchy saved to {} ({bytes} bytes)", "✓".green(), path.display());
        }
        Ok::<_, courier::AutomationError>(())
    }
    .await;

    match &session {
        Some(session) => session.quit().await,
        None => {
            if let Err(e) = driver.quit().await {
                tracing::warn!("Could not close the session: {}", e);
            }
        }
    }
    outcome.context("Inspection failed")
}
