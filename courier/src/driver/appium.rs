//! W3C WebDriver client for an Appium server, also used against browser
//! drivers for the web client.
//!
//! Only the endpoints the messenger automation needs are covered. Every
//! response is `{"value": ...}`; failures carry `{"value": {"error", "message"}}`.

use super::{AutomationDriver, DriverFactory, Rect, WindowSize};
use crate::{AutomationError, Selector};
use reqwest::{Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a23d-7e6bb7a7e3b7";
/// Legacy JSONWP key some older servers still use.
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// UiAutomator2 session capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub platform_name: String,
    pub automation_name: String,
    pub device_name: String,
    pub app_package: String,
    pub app_activity: String,
    pub udid: Option<String>,
    pub no_reset: bool,
    pub full_reset: bool,
    pub new_command_timeout_secs: u64,
    pub server_launch_timeout_ms: u64,
    pub server_install_timeout_ms: u64,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            platform_name: "Android".to_string(),
            automation_name: "UiAutomator2".to_string(),
            device_name: "Android Device".to_string(),
            app_package: String::new(),
            app_activity: String::new(),
            udid: None,
            no_reset: true,
            full_reset: false,
            new_command_timeout_secs: 300,
            server_launch_timeout_ms: 60_000,
            server_install_timeout_ms: 60_000,
        }
    }
}

impl Capabilities {
    pub fn for_app(package: impl Into<String>, activity: impl Into<String>) -> Self {
        Self {
            app_package: package.into(),
            app_activity: activity.into(),
            ..Self::default()
        }
    }

    pub fn with_udid(mut self, udid: Option<String>) -> Self {
        self.udid = udid;
        self
    }

    /// Vendor-prefixed W3C capability map.
    pub fn to_w3c(&self) -> Value {
        let mut caps = Map::new();
        caps.insert("platformName".into(), json!(self.platform_name));
        caps.insert("appium:automationName".into(), json!(self.automation_name));
        caps.insert("appium:deviceName".into(), json!(self.device_name));
        if !self.app_package.is_empty() {
            caps.insert("appium:appPackage".into(), json!(self.app_package));
        }
        if !self.app_activity.is_empty() {
            caps.insert("appium:appActivity".into(), json!(self.app_activity));
        }
        if let Some(udid) = &self.udid {
            caps.insert("appium:udid".into(), json!(udid));
        }
        caps.insert("appium:noReset".into(), json!(self.no_reset));
        caps.insert("appium:fullReset".into(), json!(self.full_reset));
        caps.insert(
            "appium:newCommandTimeout".into(),
            json!(self.new_command_timeout_secs),
        );
        caps.insert(
            "appium:uiautomator2ServerLaunchTimeout".into(),
            json!(self.server_launch_timeout_ms),
        );
        caps.insert(
            "appium:uiautomator2ServerInstallTimeout".into(),
            json!(self.server_install_timeout_ms),
        );
        json!({
            "capabilities": {
                "alwaysMatch": Value::Object(caps),
                "firstMatch": [{}],
            }
        })
    }
}

/// Desktop browser session for a web client, as served by geckodriver or
/// chromedriver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserCapabilities {
    /// `firefox`, `chrome` or `chromium`
    pub browser_name: String,
    /// Existing browser profile, so a logged-in web session is reused
    pub profile_dir: Option<PathBuf>,
    pub args: Vec<String>,
}

impl Default for BrowserCapabilities {
    fn default() -> Self {
        Self {
            browser_name: "firefox".to_string(),
            profile_dir: None,
            args: Vec::new(),
        }
    }
}

impl BrowserCapabilities {
    pub fn new(browser_name: impl Into<String>, profile_dir: Option<PathBuf>) -> Self {
        Self {
            browser_name: browser_name.into(),
            profile_dir,
            ..Self::default()
        }
    }

    pub fn to_w3c(&self) -> Value {
        let name = self.browser_name.to_lowercase();
        let mut args = self.args.clone();
        let mut caps = Map::new();
        match name.as_str() {
            "firefox" => {
                if let Some(dir) = &self.profile_dir {
                    args.push("-profile".to_string());
                    args.push(dir.display().to_string());
                }
                caps.insert("moz:firefoxOptions".into(), json!({ "args": args }));
            }
            "chrome" | "chromium" => {
                if let Some(dir) = &self.profile_dir {
                    args.push(format!("--user-data-dir={}", dir.display()));
                }
                caps.insert("goog:chromeOptions".into(), json!({ "args": args }));
            }
            _ => {}
        }
        let browser = if name == "chromium" { "chrome".to_string() } else { name };
        caps.insert("browserName".into(), json!(browser));
        json!({
            "capabilities": {
                "alwaysMatch": Value::Object(caps),
                "firstMatch": [{}],
            }
        })
    }
}

/// Script argument referring to an element of the session.
pub fn element_arg(element: &str) -> Value {
    json!({ ELEMENT_KEY: element, LEGACY_ELEMENT_KEY: element })
}

/// One live W3C session, on Appium or on a browser driver.
pub struct AppiumDriver {
    client: Client,
    base_url: String,
    session_id: String,
}

impl std::fmt::Debug for AppiumDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppiumDriver")
            .field("base_url", &self.base_url)
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl AppiumDriver {
    /// Open a new session on the server at `base_url`.
    pub async fn create(
        client: Client,
        base_url: &str,
        capabilities: &Capabilities,
    ) -> Result<Self, AutomationError> {
        Self::create_with(client, base_url, capabilities.to_w3c()).await
    }

    /// Open a new session from a ready-made `POST /session` body.
    #[instrument(skip(client, body))]
    pub async fn create_with(
        client: Client,
        base_url: &str,
        body: Value,
    ) -> Result<Self, AutomationError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        info!("Creating automation session at {}", base_url);
        let value = send(
            &client,
            Method::POST,
            &format!("{base_url}/session"),
            Some(body),
        )
        .await
        .map_err(|e| match e {
            AutomationError::SessionNotCreated(_) | AutomationError::Connection(_) => e,
            other => AutomationError::SessionNotCreated(other.to_string()),
        })?;

        let session_id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AutomationError::SessionNotCreated(format!("No sessionId in response: {value}"))
            })?
            .to_string();
        info!(session_id = %session_id, "Automation session created");

        Ok(Self {
            client,
            base_url,
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}/session/{}{}", self.base_url, self.session_id, path)
    }

    async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, AutomationError> {
        send(&self.client, method, &self.url(path), body).await
    }

    async fn element_bool(&self, element: &str, prop: &str) -> Result<bool, AutomationError> {
        let value = self
            .call(Method::GET, &format!("/element/{element}/{prop}"), None)
            .await?;
        // UiAutomator2 sometimes answers with "true"/"false" strings
        Ok(match value {
            Value::Bool(b) => b,
            Value::String(s) => s.eq_ignore_ascii_case("true"),
            _ => false,
        })
    }
}

async fn send(
    client: &Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, AutomationError> {
    debug!(%method, %url, "driver request");
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;
    let parsed: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&text).map_err(|e| {
            AutomationError::Internal(format!("Unparseable driver response ({status}): {e}"))
        })?
    };
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        // Some servers report errors with a 200 and an error object
        if let Some(code) = value.get("error").and_then(Value::as_str) {
            let message = value.get("message").and_then(Value::as_str).unwrap_or("");
            return Err(AutomationError::from_w3c(code, message));
        }
        return Ok(value);
    }

    let code = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| status_code_error(status).to_string());
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(text);
    Err(AutomationError::from_w3c(&code, message))
}

fn status_code_error(status: StatusCode) -> &'static str {
    match status {
        StatusCode::NOT_FOUND => "unknown command",
        StatusCode::REQUEST_TIMEOUT => "timeout",
        _ => "unknown error",
    }
}

fn element_id(value: &Value) -> Option<String> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait::async_trait]
impl AutomationDriver for AppiumDriver {
    async fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&str>,
    ) -> Result<Vec<String>, AutomationError> {
        let (using, value) = selector.strategy(root.is_some()).ok_or_else(|| {
            AutomationError::InvalidSelector(format!(
                "{selector} has no single lookup strategy; expand alternatives first"
            ))
        })?;
        let path = match root {
            Some(root) => format!("/element/{root}/elements"),
            None => "/elements".to_string(),
        };
        let found = self
            .call(
                Method::POST,
                &path,
                Some(json!({ "using": using, "value": value })),
            )
            .await;
        match found {
            Ok(Value::Array(items)) => Ok(items.iter().filter_map(element_id).collect()),
            Ok(other) => Err(AutomationError::Internal(format!(
                "Expected element list, got {other}"
            ))),
            // find_elements never fails for "nothing matched"
            Err(AutomationError::ElementNotFound(_)) => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, element: &str) -> Result<(), AutomationError> {
        self.call(Method::POST, &format!("/element/{element}/click"), Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn clear(&self, element: &str) -> Result<(), AutomationError> {
        self.call(Method::POST, &format!("/element/{element}/clear"), Some(json!({})))
            .await
            .map(|_| ())
    }

    async fn send_keys(&self, element: &str, text: &str) -> Result<(), AutomationError> {
        self.call(
            Method::POST,
            &format!("/element/{element}/value"),
            Some(json!({ "text": text })),
        )
        .await
        .map(|_| ())
    }

    async fn text(&self, element: &str) -> Result<String, AutomationError> {
        let value = self
            .call(Method::GET, &format!("/element/{element}/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &self,
        element: &str,
        name: &str,
    ) -> Result<Option<String>, AutomationError> {
        let value = self
            .call(
                Method::GET,
                &format!("/element/{element}/attribute/{name}"),
                None,
            )
            .await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn is_displayed(&self, element: &str) -> Result<bool, AutomationError> {
        self.element_bool(element, "displayed").await
    }

    async fn is_enabled(&self, element: &str) -> Result<bool, AutomationError> {
        self.element_bool(element, "enabled").await
    }

    async fn rect(&self, element: &str) -> Result<Rect, AutomationError> {
        let value = self
            .call(Method::GET, &format!("/element/{element}/rect"), None)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn window_size(&self) -> Result<WindowSize, AutomationError> {
        let value = self.call(Method::GET, "/window/rect", None).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn press_keycode(&self, keycode: u32) -> Result<(), AutomationError> {
        self.call(
            Method::POST,
            "/appium/device/press_keycode",
            Some(json!({ "keycode": keycode })),
        )
        .await
        .map(|_| ())
    }

    async fn tap(&self, x: i64, y: i64) -> Result<(), AutomationError> {
        let actions = json!({
            "actions": [{
                "type": "pointer",
                "id": "finger1",
                "parameters": { "pointerType": "touch" },
                "actions": [
                    { "type": "pointerMove", "duration": 0, "x": x, "y": y },
                    { "type": "pointerDown", "button": 0 },
                    { "type": "pause", "duration": 100 },
                    { "type": "pointerUp", "button": 0 }
                ]
            }]
        });
        self.call(Method::POST, "/actions", Some(actions)).await?;
        if let Err(e) = self.call(Method::DELETE, "/actions", None).await {
            debug!("Releasing actions failed (ignored): {}", e);
        }
        Ok(())
    }

    async fn execute_mobile(&self, command: &str, args: Value) -> Result<Value, AutomationError> {
        self.call(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": command, "args": [args] })),
        )
        .await
    }

    async fn activate_app(&self, package: &str) -> Result<(), AutomationError> {
        self.call(
            Method::POST,
            "/appium/device/activate_app",
            Some(json!({ "appId": package })),
        )
        .await
        .map(|_| ())
    }

    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), AutomationError> {
        self.execute_mobile(
            "mobile: startActivity",
            json!({ "component": format!("{package}/{activity}") }),
        )
        .await
        .map(|_| ())
    }

    async fn push_file(&self, device_path: &str, base64_data: &str) -> Result<(), AutomationError> {
        self.call(
            Method::POST,
            "/appium/device/push_file",
            Some(json!({ "path": device_path, "data": base64_data })),
        )
        .await
        .map(|_| ())
    }

    async fn pull_file(&self, device_path: &str) -> Result<String, AutomationError> {
        let value = self
            .call(
                Method::POST,
                "/appium/device/pull_file",
                Some(json!({ "path": device_path })),
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_source(&self) -> Result<String, AutomationError> {
        let value = self.call(Method::GET, "/source", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        self.call(Method::POST, "/url", Some(json!({ "url": url })))
            .await
            .map(|_| ())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        let value = self.call(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, AutomationError> {
        self.call(
            Method::POST,
            "/execute/sync",
            Some(json!({ "script": script, "args": args })),
        )
        .await
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        match self.call(Method::DELETE, "", None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_session_fault() => {
                warn!("Session already gone while quitting: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Creates [`AppiumDriver`] sessions against one server.
#[derive(Debug, Clone)]
pub struct AppiumConnector {
    client: Client,
    base_url: String,
    capabilities: Capabilities,
}

impl AppiumConnector {
    pub fn new(base_url: impl Into<String>, capabilities: Capabilities) -> Result<Self, AutomationError> {
        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AutomationError::Internal(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            capabilities,
        })
    }

    /// `http://{host}:{port}`
    pub fn local(host: &str, port: u16, capabilities: Capabilities) -> Result<Self, AutomationError> {
        Self::new(format!("http://{host}:{port}"), capabilities)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// `GET /status`: whether the server is up and ready for new sessions.
    pub async fn server_status(&self) -> Result<ServerStatus, AutomationError> {
        let url = format!("{}/status", self.base_url.trim_end_matches('/'));
        let value = send(&self.client, Method::GET, &url, None).await?;
        Ok(ServerStatus {
            // Appium 1.x omits `ready`
            ready: value.get("ready").and_then(Value::as_bool).unwrap_or(true),
            message: value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            version: value
                .pointer("/build/version")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

/// Answer of the server's `/status` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerStatus {
    pub ready: bool,
    pub message: String,
    pub version: Option<String>,
}

#[async_trait::async_trait]
impl DriverFactory for AppiumConnector {
    async fn connect(&self) -> Result<Arc<dyn AutomationDriver>, AutomationError> {
        if let Some(udid) = &self.capabilities.udid {
            info!("Using device UDID: {}", udid);
        } else {
            warn!("No specific device UDID set, the server will pick a device");
        }
        let driver =
            AppiumDriver::create(self.client.clone(), &self.base_url, &self.capabilities).await?;
        Ok(Arc::new(driver))
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

/// Creates browser sessions against a WebDriver server such as geckodriver.
#[derive(Debug, Clone)]
pub struct BrowserConnector {
    client: Client,
    base_url: String,
    capabilities: BrowserCapabilities,
}

impl BrowserConnector {
    pub fn new(
        base_url: impl Into<String>,
        capabilities: BrowserCapabilities,
    ) -> Result<Self, AutomationError> {
        let client = Client::builder()
            .timeout(DEFAULT_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AutomationError::Internal(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            capabilities,
        })
    }

    pub fn capabilities(&self) -> &BrowserCapabilities {
        &self.capabilities
    }
}

#[async_trait::async_trait]
impl DriverFactory for BrowserConnector {
    async fn connect(&self) -> Result<Arc<dyn AutomationDriver>, AutomationError> {
        match &self.capabilities.profile_dir {
            Some(dir) => info!("Starting {} with profile {}", self.capabilities.browser_name, dir.display()),
            None => info!("Starting {} with a fresh profile", self.capabilities.browser_name),
        }
        let driver = AppiumDriver::create_with(
            self.client.clone(),
            &self.base_url,
            self.capabilities.to_w3c(),
        )
        .await?;
        Ok(Arc::new(driver))
    }

    fn describe(&self) -> String {
        format!("{} at {}", self.capabilities.browser_name, self.base_url)
    }
}
