//! Search-and-send automation for a mobile messenger
//!
//! This crate drives an Android messenger through an Appium (W3C WebDriver)
//! session: it opens the app, searches each chat from a list, opens the
//! matching conversation and sends a daily message, optionally with a photo.
//! Long runs survive session deaths by recreating the session and picking up
//! where they left off. A browser session on the web client collects the
//! names of group chats.

use std::sync::Arc;
use tracing::instrument;

pub mod adb;
pub mod app;
pub mod campaign;
pub mod config;
pub mod device;
pub mod driver;
pub mod element;
pub mod errors;
pub mod groups;
pub mod health;
pub mod inspect;
pub mod journal;
pub mod locator;
pub mod pacing;
pub mod photo;
pub mod prune;
pub mod search;
pub mod selector;
pub mod send;
pub mod session;
pub mod targets;
#[cfg(test)]
mod tests;

pub use app::{AppProfile, Messenger};
pub use campaign::{Campaign, CampaignOptions, CampaignReport, ChatResult};
pub use config::Settings;
pub use device::{DeviceProfile, Point};
pub use driver::{AppiumConnector, AutomationDriver, DriverFactory};
pub use element::Element;
pub use errors::AutomationError;
pub use groups::{GroupExtractor, WebClientProfile};
pub use journal::{ChatStatus, Journal};
pub use locator::Locator;
pub use pacing::Pacing;
pub use search::{NotFoundReason, SearchOutcome};
pub use selector::Selector;
pub use session::Session;
pub use targets::{ChatEntry, Selection};

/// Appium connector for the configured server and app.
pub fn connector(settings: &Settings) -> Result<AppiumConnector, AutomationError> {
    AppiumConnector::local(
        &settings.server.host,
        settings.server.port,
        settings.capabilities(),
    )
}

/// Connect with the configured server, app and handset profile, and bring
/// the app to its chat list.
#[instrument(skip(settings))]
pub async fn start_session(
    settings: &Settings,
    device: Option<&str>,
) -> Result<Session, AutomationError> {
    let (profile_name, profile) = settings.device_profile(device)?;
    tracing::info!("Using device profile '{}'", profile_name);
    let factory: Arc<dyn DriverFactory> = Arc::new(connector(settings)?);
    Session::start(
        factory,
        Arc::new(settings.app.clone()),
        Arc::new(profile),
        settings.pacing(),
    )
    .await
}
