//! Thin wrapper over the `adb` command line, used to pick a handset and to
//! keep its USB link up during long runs.

use crate::pacing::Pacing;
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const QUICK_TIMEOUT: Duration = Duration::from_secs(5);
const SLOW_TIMEOUT: Duration = Duration::from_secs(10);

/// A handset as listed by `adb devices -l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdbDevice {
    pub udid: String,
    pub model: String,
    pub product: String,
}

/// Parse `adb devices -l`. Only devices in the `device` state are returned;
/// `offline` and `unauthorized` entries are skipped.
pub fn parse_devices(output: &str) -> Vec<AdbDevice> {
    let mut devices = Vec::new();
    for line in output.lines().skip(1) {
        let mut parts = line.split_whitespace();
        let (Some(udid), Some(state)) = (parts.next(), parts.next()) else {
            continue;
        };
        if state != "device" {
            continue;
        }
        let mut model = "Unknown".to_string();
        let mut product = "Unknown".to_string();
        for part in parts {
            if let Some(v) = part.strip_prefix("model:") {
                model = v.to_string();
            } else if let Some(v) = part.strip_prefix("product:") {
                product = v.to_string();
            }
        }
        devices.push(AdbDevice {
            udid: udid.to_string(),
            model,
            product,
        });
    }
    devices
}

/// What the automation needs from the device link, so runs can be tested
/// without a real `adb`.
#[async_trait::async_trait]
pub trait DeviceLink: Send + Sync {
    async fn is_online(&self, udid: &str) -> bool;

    /// Bring the device back, falling back to restarting the server.
    async fn reconnect(&self, udid: &str) -> bool;

    async fn keep_awake(&self, udid: &str) -> Result<(), AutomationError>;

    /// Reconnect if needed, then keep the screen on. False when the device
    /// could not be brought back.
    async fn maintain(&self, udid: &str) -> bool {
        debug!("Checking ADB connection health...");
        if self.is_online(udid).await {
            debug!("Device {} is online", udid);
        } else {
            warn!("Device {} is OFFLINE, attempting recovery", udid);
            if !self.reconnect(udid).await {
                warn!("Failed to reconnect device {}", udid);
                return false;
            }
            info!("Device {} reconnected", udid);
        }
        if let Err(e) = self.keep_awake(udid).await {
            warn!("Could not keep {} awake: {}", udid, e);
        }
        true
    }
}

/// The `adb` binary on `PATH` (or a configured one).
#[derive(Debug, Clone)]
pub struct Adb {
    program: String,
    pace: Pacing,
}

impl Default for Adb {
    fn default() -> Self {
        Self::new("adb", Pacing::default())
    }
}

impl Adb {
    pub fn new(program: impl Into<String>, pace: Pacing) -> Self {
        Self {
            program: program.into(),
            pace,
        }
    }

    async fn run(&self, args: &[&str], limit: Duration) -> Result<String, AutomationError> {
        debug!("{} {}", self.program, args.join(" "));
        let output = tokio::time::timeout(limit, Command::new(&self.program).args(args).output())
            .await
            .map_err(|_| {
                AutomationError::Timeout(format!("{} {} took longer than {limit:?}", self.program, args.join(" ")))
            })?
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    AutomationError::UnsupportedOperation(format!(
                        "'{}' not found, install the Android platform tools and put adb on PATH",
                        self.program
                    ))
                } else {
                    e.into()
                }
            })?;
        if !output.status.success() {
            return Err(AutomationError::Internal(format!(
                "{} {} failed: {}",
                self.program,
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Devices ready for automation.
    pub async fn devices(&self) -> Result<Vec<AdbDevice>, AutomationError> {
        let output = self.run(&["devices", "-l"], QUICK_TIMEOUT).await?;
        Ok(parse_devices(&output))
    }

    #[instrument(skip(self))]
    pub async fn restart_server(&self) -> Result<(), AutomationError> {
        info!("Restarting ADB server...");
        // kill-server fails when no server is running
        if let Err(e) = self.run(&["kill-server"], SLOW_TIMEOUT).await {
            debug!("kill-server: {}", e);
        }
        self.pace.pause(2.0).await;
        self.run(&["start-server"], SLOW_TIMEOUT).await?;
        self.pace.pause(3.0).await;
        info!("ADB server restarted");
        Ok(())
    }

    async fn shell(&self, udid: &str, command: &[&str]) -> Result<String, AutomationError> {
        let mut args = vec!["-s", udid, "shell"];
        args.extend_from_slice(command);
        self.run(&args, QUICK_TIMEOUT).await
    }
}

#[async_trait::async_trait]
impl DeviceLink for Adb {
    async fn is_online(&self, udid: &str) -> bool {
        match self.devices().await {
            Ok(devices) => devices.iter().any(|d| d.udid == udid),
            Err(e) => {
                warn!("Could not list ADB devices: {}", e);
                false
            }
        }
    }

    async fn reconnect(&self, udid: &str) -> bool {
        info!("Reconnecting to device {}...", udid);
        if let Err(e) = self.run(&["-s", udid, "reconnect"], SLOW_TIMEOUT).await {
            debug!("adb reconnect: {}", e);
        }
        self.pace.pause(2.0).await;
        if self.is_online(udid).await {
            return true;
        }
        warn!("Reconnect failed, trying a server restart");
        match self.restart_server().await {
            Ok(()) => self.is_online(udid).await,
            Err(e) => {
                warn!("ADB server restart failed: {}", e);
                false
            }
        }
    }

    async fn keep_awake(&self, udid: &str) -> Result<(), AutomationError> {
        self.shell(udid, &["input", "keyevent", "KEYCODE_WAKEUP"]).await?;
        self.shell(udid, &["svc", "power", "stayon", "true"]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ready_devices_with_details() {
        let output = "List of devices attached\n\
            R58M12ABCDE            device usb:1-1 product:sweet model:Redmi_Note_13_Pro device:sweet transport_id:1\n\
            emulator-5554          offline\n\
            0123456789ABCDEF       unauthorized usb:1-2 transport_id:2\n\
            192.168.1.20:5555      device product:a3 transport_id:3\n\n";
        let devices = parse_devices(output);
        assert_eq!(
            devices,
            vec![
                AdbDevice {
                    udid: "R58M12ABCDE".into(),
                    model: "Redmi_Note_13_Pro".into(),
                    product: "sweet".into()
                },
                AdbDevice {
                    udid: "192.168.1.20:5555".into(),
                    model: "Unknown".into(),
                    product: "a3".into()
                },
            ]
        );
    }

    #[test]
    fn empty_listing_has_no_devices() {
        assert!(parse_devices("List of devices attached\n\n").is_empty());
    }

    #[tokio::test]
    async fn missing_binary_is_reported_clearly() {
        let adb = Adb::new("definitely-not-adb-on-this-machine", Pacing::immediate());
        let err = adb.devices().await.unwrap_err();
        assert!(matches!(err, AutomationError::UnsupportedOperation(_)));
    }
}
