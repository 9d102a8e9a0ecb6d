use anyhow::Result;
use colored::Colorize;
use courier::adb::{Adb, DeviceLink};
use courier::health::{check_health, HealthStatus};
use courier::journal::read_daily_message;
use courier::photo::find_daily_photo;
use courier::targets::{load_chat_list, summarize};
use courier::Settings;

use super::ServerArgs;

fn check(label: &str, outcome: Result<String, String>) -> bool {
    match outcome {
        Ok(detail) => {
            println!("  {} {label}: {detail}", "✓".green());
            true
        }
        Err(detail) => {
            println!("  {} {label}: {}", "✗".red(), detail.red());
            false
        }
    }
}

pub async fn execute(server: ServerArgs, mut settings: Settings) -> Result<()> {
    server.apply(&mut settings);
    let connector = courier::connector(&settings)?;
    let adb = Adb::new("adb", settings.pacing());
    let device = settings
        .server
        .udid
        .as_deref()
        .map(|udid| (&adb as &dyn DeviceLink, udid));

    println!("{}", "🩺 Courier doctor".bold());
    let report = check_health(Some(&connector), None, device).await;
    let status = match report.status {
        HealthStatus::Healthy => report.status.to_string().green(),
        HealthStatus::Degraded => report.status.to_string().yellow(),
        HealthStatus::Unhealthy => report.status.to_string().red(),
    };
    println!("  Automation: {status} ({} ms)", report.check_duration_ms);
    if let Some(error) = &report.error_message {
        println!("    {}", error.red());
    }
    tracing::debug!("Health report: {}", serde_json::to_string_pretty(&report)?);

    let paths = &settings.paths;
    let mut files_ok = check(
        "Chat list",
        load_chat_list(&paths.chat_list)
            .map(|entries| summarize(&entries, &settings.name_prefix).to_string())
            .map_err(|e| e.to_string()),
    );
    files_ok &= check(
        "Message",
        read_daily_message(&paths.message)
            .map(|m| format!("{} characters", m.chars().count()))
            .map_err(|e| e.to_string()),
    );
    check(
        "Photo",
        match find_daily_photo(&paths.photo_dir) {
            Ok(Some(photo)) => Ok(photo.display().to_string()),
            Ok(None) => Ok("none, messages go out as text".to_string()),
            Err(e) => Err(e.to_string()),
        },
    );

    if report.status == HealthStatus::Unhealthy || !files_ok {
        anyhow::bail!("not ready to run");
    }
    println!("{}", "Ready to run.".green().bold());
    Ok(())
}
