use anyhow::{bail, Context, Result};
use colored::Colorize;
use courier::adb::Adb;
use courier::Settings;
use tracing::warn;

use crate::prompt;

pub async fn list() -> Result<()> {
    let devices = Adb::default()
        .devices()
        .await
        .context("Could not run adb. Is the Android platform-tools folder on PATH?")?;

    if devices.is_empty() {
        println!("{}", "No devices ready. Check the cable and USB debugging.".yellow());
        return Ok(());
    }
    println!("{}", "📱 Devices".bold());
    for d in devices {
        println!("  {}  {} ({})", d.udid.green(), d.model, d.product);
    }
    Ok(())
}

pub fn profiles(settings: &Settings) {
    println!("{}", "📐 Device profiles".bold());
    for (name, p) in settings.profiles() {
        let marker = if name.eq_ignore_ascii_case(&settings.device) {
            " (default)".cyan().to_string()
        } else {
            String::new()
        };
        println!("  {}{}", name.green(), marker);
        println!(
            "      photo {} / {}  caption x+{} y={}  send {}  search {}",
            p.photo_select,
            p.photo_select_fallback,
            p.caption_x_offset,
            p.caption_y,
            p.send_button,
            p.search_button
        );
    }
}

/// The handset to drive when none was named. `None` lets Appium pick.
pub async fn pick_device(interactive: bool) -> Result<Option<String>> {
    let devices = match Adb::default().devices().await {
        Ok(devices) => devices,
        Err(e) => {
            warn!("Could not list devices with adb: {}", e);
            return Ok(None);
        }
    };

    match devices.as_slice() {
        [] => {
            println!("{}", "No devices ready in adb, leaving the choice to Appium".yellow());
            Ok(None)
        }
        [only] => {
            println!("Using device {} ({})", only.udid.green(), only.model);
            Ok(Some(only.udid.clone()))
        }
        many if interactive => prompt::choose_device(many).map(Some),
        many => bail!("{} devices are connected, pass --udid to pick one", many.len()),
    }
}
