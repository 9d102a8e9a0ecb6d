use crate::{AutomationError, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod appium;
pub mod mock;

pub use appium::{
    element_arg, AppiumConnector, AppiumDriver, BrowserCapabilities, BrowserConnector,
    Capabilities, ServerStatus,
};
pub use mock::{MockAction, MockConnector, MockDriver, MockNode};

/// Android key codes used by the automation.
pub mod keycode {
    pub const BACK: u32 = 4;
    pub const WAKEUP: u32 = 224;
}

/// Width and height of the device screen in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: i64,
    pub height: i64,
}

/// Element bounds in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn center(&self) -> (i64, i64) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }
}

/// The seam between the automation logic and whatever is actually driving
/// the device. Elements are addressed by the opaque ids the driver hands out.
#[async_trait::async_trait]
pub trait AutomationDriver: Send + Sync {
    /// Find every element matching a single-strategy selector, optionally
    /// scoped to the descendants of `root`. No waiting happens here.
    async fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&str>,
    ) -> Result<Vec<String>, AutomationError>;

    async fn click(&self, element: &str) -> Result<(), AutomationError>;

    async fn clear(&self, element: &str) -> Result<(), AutomationError>;

    async fn send_keys(&self, element: &str, text: &str) -> Result<(), AutomationError>;

    async fn text(&self, element: &str) -> Result<String, AutomationError>;

    async fn attribute(&self, element: &str, name: &str)
        -> Result<Option<String>, AutomationError>;

    async fn is_displayed(&self, element: &str) -> Result<bool, AutomationError>;

    async fn is_enabled(&self, element: &str) -> Result<bool, AutomationError>;

    async fn rect(&self, element: &str) -> Result<Rect, AutomationError>;

    /// Also serves as the cheapest liveness check for the session.
    async fn window_size(&self) -> Result<WindowSize, AutomationError>;

    async fn press_keycode(&self, keycode: u32) -> Result<(), AutomationError>;

    /// Single-finger tap at absolute screen coordinates.
    async fn tap(&self, x: i64, y: i64) -> Result<(), AutomationError>;

    /// Run a driver extension such as `mobile: type`.
    async fn execute_mobile(
        &self,
        command: &str,
        args: serde_json::Value,
    ) -> Result<serde_json::Value, AutomationError>;

    async fn activate_app(&self, package: &str) -> Result<(), AutomationError>;

    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), AutomationError>;

    /// Write base64-encoded content to a path on the device.
    async fn push_file(&self, device_path: &str, base64_data: &str)
        -> Result<(), AutomationError>;

    /// Read a device file, base64-encoded.
    async fn pull_file(&self, device_path: &str) -> Result<String, AutomationError>;

    async fn page_source(&self) -> Result<String, AutomationError>;

    /// Load a page. Browser sessions only.
    async fn navigate(&self, url: &str) -> Result<(), AutomationError>;

    async fn current_url(&self) -> Result<String, AutomationError>;

    /// Run a synchronous script in the page. Elements are passed with
    /// [`element_arg`].
    async fn execute_script(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, AutomationError>;

    /// End the session. Safe to call on a session that is already gone.
    async fn quit(&self) -> Result<(), AutomationError>;
}

/// Creates fresh automation sessions. Recovery throws the old session away
/// and asks the factory for a new one.
#[async_trait::async_trait]
pub trait DriverFactory: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn AutomationDriver>, AutomationError>;

    /// Where sessions are created, for log lines.
    fn describe(&self) -> String;
}
