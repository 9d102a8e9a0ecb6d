pub mod devices;
pub mod doctor;
pub mod groups;
pub mod inspect;
pub mod lists;
pub mod run;

use clap::Args;
use courier::Settings;

/// Where the Appium server and the handset are. Unset flags keep the
/// values from the settings file.
#[derive(Args, Debug, Clone, Default)]
pub struct ServerArgs {
    /// Appium server host
    #[arg(long, env = "APPIUM_HOST")]
    pub host: Option<String>,

    /// Appium server port
    #[arg(long, short, env = "APPIUM_PORT")]
    pub port: Option<u16>,

    /// Handset serial (see `courier devices`)
    #[arg(long, env = "ANDROID_UDID")]
    pub udid: Option<String>,
}

impl ServerArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(host) = &self.host {
            settings.server.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if self.udid.is_some() {
            settings.server.udid = self.udid.clone();
        }
    }
}
