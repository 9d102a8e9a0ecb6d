//! The messenger being driven: where its widgets live and how to bring it to
//! the chat list.

use crate::device::DeviceProfile;
use crate::driver::{keycode, AutomationDriver};
use crate::pacing::Pacing;
use crate::selector::Query;
use crate::{AutomationError, Locator, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub(crate) const TEXT_VIEW: &str = "android.widget.TextView";
const IMAGE_BUTTON: &str = "android.widget.ImageButton";
const EDIT_TEXT: &str = "android.widget.EditText";

const OPEN_ROUNDS: usize = 3;
const LOAD_TIMEOUT_SECS: f64 = 15.0;
const HOME_CHECK_SECS: f64 = 5.0;

/// Resource ids are stored without the `package:id/` prefix so a variant of
/// the app (e.g. a business build) only needs a different `package`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppProfile {
    pub package: String,
    pub activity: String,
    /// Launcher label of the app.
    pub display_name: String,
    /// Extra launcher labels to try when tapping the icon.
    pub launcher_labels: Vec<String>,
    /// Texts that only appear on the chat list.
    pub home_texts: Vec<String>,
    /// Resource ids that only appear on the chat list.
    pub home_ids: Vec<String>,
    pub search_button_id: String,
    pub search_field_id: String,
    pub entry_id: String,
    pub send_id: String,
    pub attach_id: String,
    pub gallery_label: String,
    /// Fragment of the resource id shared by search-result section titles.
    pub section_title_id: String,
    pub chats_section: String,
    pub contacts_sections: Vec<String>,
    pub messages_section: String,
    pub row_container_id: String,
    /// Name label inside a result row, most specific first.
    pub row_name_ids: Vec<String>,
    pub no_results_texts: Vec<String>,
    /// Row labels containing these are system notices, not chat names.
    pub notice_markers: Vec<String>,
}

impl Default for AppProfile {
    fn default() -> Self {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            package: "com.whatsapp".to_string(),
            activity: "com.whatsapp.home.ui.HomeActivity".to_string(),
            display_name: "WhatsApp".to_string(),
            launcher_labels: strings(&["WA"]),
            home_texts: strings(&["WhatsApp", "Chats"]),
            home_ids: strings(&["menuitem_search", "search", "fab"]),
            search_button_id: "menuitem_search".to_string(),
            search_field_id: "search_src_text".to_string(),
            entry_id: "entry".to_string(),
            send_id: "send".to_string(),
            attach_id: "attach".to_string(),
            gallery_label: "Gallery".to_string(),
            section_title_id: ":id/title".to_string(),
            chats_section: "Chats".to_string(),
            contacts_sections: strings(&["Contacts", "Other contacts"]),
            messages_section: "Messages".to_string(),
            row_container_id: ":id/contact_row_container".to_string(),
            row_name_ids: strings(&[":id/conversations_row_contact_name", "contact_name"]),
            no_results_texts: strings(&["No results found", "No results"]),
            notice_markers: strings(&["tap to", "changed"]),
        }
    }
}

impl AppProfile {
    /// Full resource id for a short name.
    pub fn resource_id(&self, name: &str) -> String {
        format!("{}:id/{}", self.package, name)
    }

    /// Any of the widgets that prove the chat list is showing.
    pub fn home_indicators(&self) -> Selector {
        let mut alternatives: Vec<Selector> = self
            .home_texts
            .iter()
            .map(|t| Selector::Text(t.clone()))
            .collect();
        alternatives.extend(
            self.home_ids
                .iter()
                .map(|id| Selector::Id(self.resource_id(id))),
        );
        Selector::Any(alternatives)
    }

    /// Exact id first, then any widget of `class` whose id mentions `name`.
    fn widget(&self, name: &str, class: &str) -> Selector {
        Selector::Any(vec![
            Selector::Id(self.resource_id(name)),
            Query::class(class).contains("resource-id", name).into(),
        ])
    }

    pub fn attach_button(&self) -> Selector {
        self.widget(&self.attach_id, IMAGE_BUTTON)
    }

    pub fn send_button(&self) -> Selector {
        self.widget(&self.send_id, IMAGE_BUTTON)
    }

    pub fn message_entry(&self) -> Selector {
        self.widget(&self.entry_id, EDIT_TEXT)
    }

    pub fn search_button(&self) -> Selector {
        Selector::Id(self.resource_id(&self.search_button_id))
    }

    pub fn search_field(&self) -> Selector {
        Selector::Id(self.resource_id(&self.search_field_id))
    }

    pub fn gallery(&self) -> Selector {
        Selector::Any(vec![
            Selector::Text(self.gallery_label.clone()),
            Query::class(TEXT_VIEW)
                .equals("text", self.gallery_label.clone())
                .into(),
        ])
    }

    /// Section header in the search results, matched case-insensitively.
    pub fn section_title(&self, names: &[&str]) -> Selector {
        let mut alternatives: Vec<Selector> = names
            .iter()
            .map(|name| {
                Query::class(TEXT_VIEW)
                    .contains("resource-id", self.section_title_id.clone())
                    .equals_ignore_case("text", *name)
                    .into()
            })
            .collect();
        if alternatives.len() == 1 {
            alternatives.swap_remove(0)
        } else {
            Selector::Any(alternatives)
        }
    }

    pub fn result_rows(&self) -> Selector {
        Selector::Any(vec![
            Query::class("android.widget.RelativeLayout")
                .contains("resource-id", self.row_container_id.clone())
                .into(),
            Query::class("android.widget.LinearLayout")
                .contains("resource-id", self.row_container_id.clone())
                .into(),
            Query::any()
                .contains("resource-id", self.row_container_id.clone())
                .into(),
        ])
    }

    pub fn row_name_labels(&self) -> Vec<Selector> {
        self.row_name_ids
            .iter()
            .map(|id| Query::class(TEXT_VIEW).contains("resource-id", id.clone()).into())
            .collect()
    }

    pub fn no_results(&self) -> Selector {
        let mut alternatives = Vec::new();
        for text in &self.no_results_texts {
            alternatives.push(Selector::Text(text.clone()));
            alternatives.push(Query::any().contains("text", text.clone()).into());
        }
        Selector::Any(alternatives)
    }

    pub fn launcher_icons(&self) -> Vec<Selector> {
        let mut labels = vec![self.display_name.clone()];
        labels.extend(self.launcher_labels.iter().cloned());
        let mut out: Vec<Selector> = labels
            .iter()
            .map(|l| Query::class(TEXT_VIEW).equals("text", l.clone()).into())
            .collect();
        out.push(Query::any().contains("text", self.display_name.clone()).into());
        out.push(Query::any().equals("content-desc", self.display_name.clone()).into());
        out.push(Query::any().contains("content-desc", self.display_name.clone()).into());
        out
    }

    pub fn is_notice(&self, label: &str) -> bool {
        let lower = label.to_lowercase();
        self.notice_markers
            .iter()
            .any(|m| lower.contains(&m.to_lowercase()))
    }
}

/// One automation session bound to the messenger and a handset profile.
///
/// Cheap to clone; recovery builds a new one around the fresh session.
#[derive(Clone)]
pub struct Messenger {
    driver: Arc<dyn AutomationDriver>,
    app: Arc<AppProfile>,
    device: Arc<DeviceProfile>,
    pace: Pacing,
}

impl Messenger {
    pub fn new(
        driver: Arc<dyn AutomationDriver>,
        app: Arc<AppProfile>,
        device: Arc<DeviceProfile>,
        pace: Pacing,
    ) -> Self {
        Self {
            driver,
            app,
            device,
            pace,
        }
    }

    /// Same profiles and pace on another session.
    pub fn with_driver(&self, driver: Arc<dyn AutomationDriver>) -> Self {
        Self {
            driver,
            app: self.app.clone(),
            device: self.device.clone(),
            pace: self.pace,
        }
    }

    pub fn driver(&self) -> &Arc<dyn AutomationDriver> {
        &self.driver
    }

    pub fn app(&self) -> &AppProfile {
        &self.app
    }

    pub fn device(&self) -> &DeviceProfile {
        &self.device
    }

    pub fn pace(&self) -> Pacing {
        self.pace
    }

    /// Locator with pace-scaled timeout (in seconds) and a 0.5 s poll.
    pub fn locator(&self, selector: impl Into<Selector>, timeout_secs: f64) -> Locator {
        Locator::new(self.driver.clone(), selector.into())
            .set_default_timeout(self.pace.duration(timeout_secs))
            .poll_every(self.pace.duration(0.5))
    }

    pub async fn tap(&self, x: i64, y: i64) -> Result<(), AutomationError> {
        debug!("Tapping at ({}, {})", x, y);
        self.driver.tap(x, y).await
    }

    /// Wake the screen and register a bit of user activity.
    #[instrument(skip(self))]
    pub async fn wake_device(&self) -> Result<(), AutomationError> {
        info!("Checking device screen state...");
        self.driver.press_keycode(keycode::WAKEUP).await?;
        self.pace.pause(0.5).await;
        let size = self.driver.window_size().await?;
        info!("Screen active - size: {}x{}", size.width, size.height);
        self.driver.press_keycode(keycode::WAKEUP).await?;
        self.driver.tap(50, 50).await?;
        info!("Device awake");
        Ok(())
    }

    /// Wait for the chat list, then give the app time to settle and check
    /// it still answers. `Ok(false)` means the chat list never showed up.
    #[instrument(skip(self))]
    pub async fn wait_until_loaded(&self, timeout_secs: f64) -> Result<bool, AutomationError> {
        let found = self
            .locator(self.app.home_indicators(), timeout_secs)
            .wait_displayed(None)
            .await;
        let element = match found {
            Ok(element) => element,
            Err(e) if e.is_session_fault() => return Err(e),
            Err(e) => {
                info!("No chat list elements found: {}", e);
                return Ok(false);
            }
        };
        info!("Found main element: {}", element.label().await);
        self.pace.pause(2.5).await;
        match self.driver.window_size().await {
            Ok(_) => {
                info!("{} is loaded and responsive", self.app.display_name);
                Ok(true)
            }
            Err(e) if e.is_session_fault() => Err(e),
            Err(e) => {
                warn!("App became unresponsive: {}", e);
                Ok(false)
            }
        }
    }

    /// Bring the app to the chat list: activate, then start the launch
    /// activity, then tap the launcher icon, for up to three rounds.
    #[instrument(skip(self))]
    pub async fn open_app(&self) -> Result<bool, AutomationError> {
        let app = &self.app;
        for round in 0..OPEN_ROUNDS {
            info!("Opening {}... (attempt {}/{})", app.display_name, round + 1, OPEN_ROUNDS);

            match self.driver.activate_app(&app.package).await {
                Ok(()) => {
                    self.pace.pause(1.0).await;
                    if self.wait_until_loaded(LOAD_TIMEOUT_SECS).await? {
                        info!("{} opened by activating it", app.display_name);
                        return Ok(true);
                    }
                    warn!("activate_app launched but the app did not load");
                }
                Err(e) if e.is_session_fault() => return Err(e),
                Err(e) => warn!("activate_app failed: {}", e),
            }

            match self.driver.start_activity(&app.package, &app.activity).await {
                Ok(()) => {
                    self.pace.pause(1.5).await;
                    if self.wait_until_loaded(LOAD_TIMEOUT_SECS).await? {
                        info!("{} opened by starting its activity", app.display_name);
                        return Ok(true);
                    }
                    warn!("start_activity launched but the app did not load");
                }
                Err(e) if e.is_session_fault() => return Err(e),
                Err(e) => warn!("start_activity failed: {}", e),
            }

            if self.open_from_launcher().await? {
                return Ok(true);
            }

            if round + 1 < OPEN_ROUNDS {
                info!("All launch methods failed, retrying");
                self.pace.pause(3.0).await;
            }
        }
        warn!(
            "Could not open {}. Check it is installed, has its permissions and the device is not in power saving mode",
            app.display_name
        );
        Ok(false)
    }

    async fn open_from_launcher(&self) -> Result<bool, AutomationError> {
        for selector in self.app.launcher_icons() {
            let icon = match self.locator(selector, 0.0).first_now().await {
                Ok(Some(icon)) => icon,
                Ok(None) => continue,
                Err(e) if e.is_session_fault() => return Err(e),
                Err(_) => continue,
            };
            if !icon.is_displayed().await.unwrap_or(false) {
                continue;
            }
            icon.click().await?;
            self.pace.pause(1.5).await;
            if self.wait_until_loaded(LOAD_TIMEOUT_SECS).await? {
                info!("{} opened from its launcher icon", self.app.display_name);
                return Ok(true);
            }
            warn!("Icon tap launched but the app did not load");
            return Ok(false);
        }
        info!("Launcher icon not found on current screen");
        Ok(false)
    }

    /// Make sure the chat list is in front, relaunching the app if not.
    pub async fn ensure_home(&self) -> Result<(), AutomationError> {
        let found = self
            .locator(self.app.home_indicators(), HOME_CHECK_SECS)
            .wait_displayed(None)
            .await;
        match found {
            Ok(element) => {
                debug!("On chat list ({})", element.label().await);
                Ok(())
            }
            Err(e) if e.is_session_fault() => Err(e),
            Err(_) => {
                warn!("Chat list not showing, pressing back and relaunching");
                self.driver.press_keycode(keycode::BACK).await?;
                self.pace.pause(0.5).await;
                self.open_app().await?;
                self.pace.pause(1.0).await;
                Ok(())
            }
        }
    }

    /// Back key, then let the previous screen settle.
    pub async fn go_back(&self, settle_secs: f64) -> Result<(), AutomationError> {
        self.driver.press_keycode(keycode::BACK).await?;
        self.pace.pause(settle_secs).await;
        Ok(())
    }
}
