//! Run settings, loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or none at all) gives the
//! stock setup: a local Appium server, the `default` handset profile and
//! the data files under `txt/`.

use crate::app::AppProfile;
use crate::campaign::CampaignOptions;
use crate::device::{builtin_profiles, find_profile, DeviceProfile};
use crate::driver::Capabilities;
use crate::groups::WebClientProfile;
use crate::pacing::Pacing;
use crate::AutomationError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "courier.yaml";
/// Slowest pace accepted; higher values only make every wait endless.
pub const MAX_PACE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    /// Handset to drive; the server picks one when unset.
    pub udid: Option<String>,
    /// Seconds the server keeps an idle session.
    pub new_command_timeout: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 4723,
            udid: None,
            new_command_timeout: 300,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    /// Where the run, processed and not-found logs are written.
    pub data_dir: PathBuf,
    pub chat_list: PathBuf,
    pub message: PathBuf,
    pub photo_dir: PathBuf,
    /// Rolling diagnostic logs.
    pub log_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("txt"),
            chat_list: PathBuf::from("txt/chat_name.txt"),
            message: PathBuf::from("txt/daily_message.txt"),
            photo_dir: PathBuf::from("daily_photos"),
            log_dir: PathBuf::from("logs"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    /// Handset profile name.
    pub device: String,
    /// Multiplier on every fixed pause.
    pub pace: f64,
    pub mention: bool,
    /// Stripped from chat names before searching.
    pub name_prefix: String,
    pub photo_refresh_every: usize,
    pub maintenance_every: usize,
    pub paths: PathSettings,
    pub app: AppProfile,
    /// Web client layout for group extraction.
    pub web: WebClientProfile,
    /// Added to the built-in handset profiles, replacing same-named ones.
    pub devices: BTreeMap<String, DeviceProfile>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            device: crate::device::DEFAULT_PROFILE.to_string(),
            pace: 1.0,
            mention: true,
            name_prefix: "NepalWin🇳🇵".to_string(),
            photo_refresh_every: 5,
            maintenance_every: 5,
            paths: PathSettings::default(),
            app: AppProfile::default(),
            web: WebClientProfile::default(),
            devices: BTreeMap::new(),
        }
    }
}

impl Settings {
    pub fn from_yaml(content: &str) -> Result<Self, AutomationError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let settings: Settings = serde_yaml::from_str(content)
            .map_err(|e| AutomationError::InvalidArgument(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, AutomationError> {
        let content = fs::read_to_string(path).map_err(|e| {
            AutomationError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
        })?;
        debug!("Loaded settings from {}", path.display());
        Self::from_yaml(&content)
    }

    /// An explicit path must exist; otherwise `courier.yaml` is used when
    /// present and the defaults when not.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, AutomationError> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.exists() {
                    Self::load(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<(), AutomationError> {
        if !(self.pace.is_finite() && (0.0..=MAX_PACE).contains(&self.pace)) {
            return Err(AutomationError::InvalidArgument(format!(
                "pace must be a number from 0 to {MAX_PACE}, got {}",
                self.pace
            )));
        }
        if self.photo_refresh_every == 0 || self.maintenance_every == 0 {
            return Err(AutomationError::InvalidArgument(
                "photo_refresh_every and maintenance_every must be at least 1".to_string(),
            ));
        }
        if self.app.package.is_empty() {
            return Err(AutomationError::InvalidArgument(
                "app.package must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Built-in profiles with the configured ones laid over them.
    pub fn profiles(&self) -> BTreeMap<String, DeviceProfile> {
        let mut profiles = builtin_profiles();
        profiles.extend(self.devices.clone());
        profiles
    }

    /// The profile named by `name`, or by `device` when `name` is `None`.
    pub fn device_profile(&self, name: Option<&str>) -> Result<(String, DeviceProfile), AutomationError> {
        let profiles = self.profiles();
        let wanted = name.unwrap_or(&self.device);
        find_profile(&profiles, wanted)
            .map(|(key, profile)| (key.to_string(), profile.clone()))
            .ok_or_else(|| {
                let known = profiles.keys().cloned().collect::<Vec<_>>().join(", ");
                AutomationError::InvalidArgument(format!(
                    "unknown device profile '{wanted}' (known: {known})"
                ))
            })
    }

    pub fn capabilities(&self) -> Capabilities {
        let mut capabilities = Capabilities::for_app(&self.app.package, &self.app.activity)
            .with_udid(self.server.udid.clone());
        capabilities.new_command_timeout_secs = self.server.new_command_timeout;
        capabilities
    }

    pub fn pacing(&self) -> Pacing {
        Pacing::new(self.pace)
    }

    pub fn campaign_options(&self) -> CampaignOptions {
        CampaignOptions {
            mention: self.mention,
            name_prefix: self.name_prefix.clone(),
            photo_dir: Some(self.paths.photo_dir.clone()),
            photo_refresh_every: self.photo_refresh_every,
            maintenance_every: self.maintenance_every,
            device_udid: self.server.udid.clone(),
        }
    }
}
