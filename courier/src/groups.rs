//! Group names from the messenger's web client.
//!
//! Runs in a desktop browser session: opens the web client, applies its
//! Groups filter, then walks the chat pane while scrolling it and keeps every
//! name that looks like a group chat. The result is written next to the chat
//! lists with a header, after backing up the previous file.

use crate::driver::{element_arg, AutomationDriver};
use crate::journal::format_stamp;
use crate::{AutomationError, Element, Locator, Pacing, Selector};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Scrolls the pane given as the first argument and reports where it ended.
pub const SCROLL_SCRIPT: &str = "const pane = arguments[0]; pane.scrollTop += arguments[1]; \
     return [pane.scrollTop, pane.scrollHeight, pane.clientHeight];";
pub const REVEAL_SCRIPT: &str = "arguments[0].scrollIntoView();";

const SCROLL_STEP_PX: i64 = 500;
/// Scrolls in a row that turn up nothing new before giving up.
const MAX_IDLE_SCROLLS: usize = 50;
const END_SLACK_PX: f64 = 10.0;
const MAX_NAME_CHARS: usize = 200;
const LONG_NAME_CHARS: usize = 15;

const CHAT_LIST_SECS: f64 = 10.0;
const LOGGED_IN_SECS: f64 = 8.0;
const QR_LOGIN_SECS: f64 = 120.0;

const GROUP_WORDS: [&str; 9] = [
    "group",
    "team",
    "family",
    "friends",
    "office",
    "work",
    "project",
    "community",
    "club",
];
const GROUP_EMOJI: [char; 6] = ['📱', '💼', '🏠', '🎮', '🎯', '⚽'];

/// Where the web client lives and how its chat pane is laid out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebClientProfile {
    pub url: String,
    /// Part of the address that shows the browser is on the client
    pub url_marker: String,
    /// The scrollable chat pane; the first alternative present is used
    pub chat_list: Selector,
    pub groups_filter: Selector,
    /// Rows of the pane; the first alternative with matches wins
    pub chat_rows: Selector,
    /// Name labels inside a row, tried in order
    pub chat_name: Selector,
    /// Anything inside a row that marks it as a group
    pub group_indicators: Selector,
}

impl Default for WebClientProfile {
    fn default() -> Self {
        let css = |s: &str| Selector::Css(s.to_string());
        Self {
            url: "https://web.whatsapp.com".to_string(),
            url_marker: "web.whatsapp.com".to_string(),
            chat_list: Selector::Any(vec![
                css("div[data-testid='chat-list']"),
                css("#pane-side"),
                css("div[role='grid']"),
                css("div._ak72"),
            ]),
            groups_filter: Selector::Any(vec![
                css("button[title*='Groups']"),
                css("button[aria-label*='Groups']"),
                css("div[title*='Groups']"),
                css("div[aria-label*='Groups']"),
                css("[data-testid*='filter-group']"),
                Selector::XPath("//*[contains(text(), 'Groups')]".to_string()),
            ]),
            chat_rows: Selector::Any(vec![
                css("div._ak72"),
                css("div[role='listitem']"),
                css("div[data-testid*='chat']"),
            ]),
            chat_name: Selector::Any(vec![
                css("span[title]"),
                css("span._ak8o"),
                css("span[dir='auto']"),
                css("div[title]"),
                css(".copyable-text span"),
                css("[data-testid*='name']"),
            ]),
            group_indicators: Selector::Any(vec![
                css("svg[data-testid*='group']"),
                css("span[data-testid*='group']"),
                css("[title*='admin']"),
                css("[title*='participant']"),
                Selector::XPath(".//*[contains(text(), '~')]".to_string()),
            ]),
        }
    }
}

/// Whether a chat looks like a group: a group marker in its row, a typical
/// group word or emoji in its name, three or more words, or a name longer
/// than most contact names.
pub fn is_likely_group(name: &str, has_indicator: bool) -> bool {
    if has_indicator {
        return true;
    }
    let lower = name.to_lowercase();
    GROUP_WORDS.iter().any(|w| lower.contains(w))
        || name.contains(&GROUP_EMOJI[..])
        || has_three_words(name)
        || name.chars().count() > LONG_NAME_CHARS
}

/// Two spaces with something before, between and after them.
fn has_three_words(name: &str) -> bool {
    let first = name.char_indices().find(|&(i, c)| c == ' ' && i > 0);
    let last = name
        .char_indices()
        .rev()
        .find(|&(i, c)| c == ' ' && i + 1 < name.len());
    matches!((first, last), (Some((i, _)), Some((j, _))) if j > i + 1)
}

/// Where a scroll left the chat pane.
#[derive(Debug, Clone, Copy, PartialEq)]
struct ScrollPosition {
    top: f64,
    height: f64,
    client: f64,
}

impl ScrollPosition {
    fn from_script(value: &Value) -> Option<Self> {
        match value.as_array()?.as_slice() {
            [top, height, client] => Some(Self {
                top: top.as_f64()?,
                height: height.as_f64()?,
                client: client.as_f64()?,
            }),
            _ => None,
        }
    }

    fn at_end(&self) -> bool {
        self.top >= self.height - self.client - END_SLACK_PX
    }
}

/// Collects group names from a browser session on the web client.
pub struct GroupExtractor {
    driver: Arc<dyn AutomationDriver>,
    profile: WebClientProfile,
    pace: Pacing,
}

impl GroupExtractor {
    pub fn new(driver: Arc<dyn AutomationDriver>, profile: WebClientProfile, pace: Pacing) -> Self {
        Self {
            driver,
            profile,
            pace,
        }
    }

    fn chat_list(&self, timeout_secs: f64) -> Locator {
        Locator::new(self.driver.clone(), self.profile.chat_list.clone())
            .set_default_timeout(self.pace.duration(timeout_secs))
            .poll_every(self.pace.duration(0.5))
    }

    /// Load the web client unless the browser is already on it, and wait
    /// for the chat list. A browser profile that is not logged in gets two
    /// minutes for the QR code to be scanned.
    pub async fn open(&self) -> Result<(), AutomationError> {
        let url = self.driver.current_url().await?;
        if !url.contains(&self.profile.url_marker) {
            info!("Opening {}", self.profile.url);
            self.driver.navigate(&self.profile.url).await?;
        }

        match self.chat_list(LOGGED_IN_SECS).wait(None).await {
            Ok(_) => {
                info!("Already logged in to the web client");
                return Ok(());
            }
            Err(e) if e.is_session_fault() => return Err(e),
            Err(_) => {}
        }

        warn!("Not logged in: scan the QR code with the phone to continue");
        match self.chat_list(QR_LOGIN_SECS).wait(None).await {
            Ok(_) => {
                info!("Web client loaded");
                Ok(())
            }
            Err(e) if e.is_session_fault() => Err(e),
            Err(_) => Err(AutomationError::AppNotReady(
                "the chat list never appeared; was the QR code scanned?".to_string(),
            )),
        }
    }

    /// Names of the group chats, in pane order, without duplicates.
    #[instrument(skip(self))]
    pub async fn extract(&self) -> Result<Vec<String>, AutomationError> {
        let url = self.driver.current_url().await?;
        if !url.contains(&self.profile.url_marker) {
            return Err(AutomationError::AppNotReady(format!(
                "browser is on {url}, not on {}",
                self.profile.url
            )));
        }

        match self.chat_list(CHAT_LIST_SECS).wait(None).await {
            Ok(_) => {}
            Err(e) if e.is_session_fault() => return Err(e),
            Err(e) => {
                return Err(AutomationError::AppNotReady(format!(
                    "chat list did not load: {e}"
                )))
            }
        }

        if !self.apply_groups_filter().await? {
            warn!("Groups filter not found, extracting from all chats");
        }
        self.collect().await
    }

    async fn apply_groups_filter(&self) -> Result<bool, AutomationError> {
        self.pace.pause(3.0).await;
        let Some(button) = self
            .first_alternative(&self.profile.groups_filter, None)
            .await?
            .into_iter()
            .next()
        else {
            return Ok(false);
        };

        self.driver
            .execute_script(REVEAL_SCRIPT, vec![element_arg(button.id())])
            .await?;
        self.pace.pause(1.0).await;
        match button.click().await {
            Ok(()) => {
                info!("Groups filter applied");
                self.pace.pause(2.0).await;
                Ok(true)
            }
            Err(e) if e.is_session_fault() => Err(e),
            Err(e) => {
                warn!("Groups filter could not be clicked: {}", e);
                Ok(false)
            }
        }
    }

    async fn collect(&self) -> Result<Vec<String>, AutomationError> {
        let Some(pane) = self
            .first_alternative(&self.profile.chat_list, None)
            .await?
            .into_iter()
            .next()
        else {
            warn!("Chat list container not found");
            return Ok(Vec::new());
        };

        let mut groups: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        let mut idle_scrolls = 0;
        while idle_scrolls < MAX_IDLE_SCROLLS {
            let rows = self.first_alternative(&self.profile.chat_rows, None).await?;
            if rows.is_empty() {
                warn!("No chat rows found");
                break;
            }

            let mut new_groups = 0;
            for row in rows {
                let name = match self.row_name(&row).await {
                    Ok(Some(name)) => name,
                    Ok(None) => continue,
                    Err(e) if e.is_session_fault() => return Err(e),
                    Err(e) => {
                        debug!("Skipping unreadable row: {}", e);
                        continue;
                    }
                };
                if !seen.insert(name.clone()) {
                    continue;
                }
                let indicator = self
                    .first_alternative(&self.profile.group_indicators, Some(&row))
                    .await?;
                if is_likely_group(&name, !indicator.is_empty()) {
                    info!("{:3}. {}", groups.len() + 1, name);
                    groups.push(name);
                    new_groups += 1;
                }
            }

            if new_groups > 0 {
                idle_scrolls = 0;
                continue;
            }
            idle_scrolls += 1;
            let position = self
                .driver
                .execute_script(SCROLL_SCRIPT, vec![element_arg(pane.id()), json!(SCROLL_STEP_PX)])
                .await?;
            self.pace.pause(1.0).await;
            match ScrollPosition::from_script(&position) {
                Some(p) if !p.at_end() => debug!("Scrolled chat pane to {}", p.top),
                _ => {
                    info!("Reached the end of the chat list");
                    break;
                }
            }
        }
        info!("Found {} group chats", groups.len());
        Ok(groups)
    }

    /// Title of the first name label with a usable one, else its text.
    async fn row_name(&self, row: &Element) -> Result<Option<String>, AutomationError> {
        for alternative in self.profile.chat_name.alternatives() {
            let Some(label) = row.locator(alternative.clone()).first_now().await? else {
                continue;
            };
            let name = match label.attribute("title").await? {
                Some(title) if !title.trim().is_empty() => title,
                _ => label.text().await?,
            };
            let name = name.trim();
            if !name.is_empty() && name.chars().count() < MAX_NAME_CHARS {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(None)
    }

    /// Elements of the first alternative that matches anything. Lookups the
    /// browser rejects are skipped.
    async fn first_alternative(
        &self,
        selector: &Selector,
        root: Option<&Element>,
    ) -> Result<Vec<Element>, AutomationError> {
        for alternative in selector.alternatives() {
            let locator = match root {
                Some(root) => root.locator(alternative.clone()),
                None => Locator::new(self.driver.clone(), alternative.clone()),
            };
            match locator.all().await {
                Ok(found) if !found.is_empty() => return Ok(found),
                Ok(_) => {}
                Err(e) if e.is_session_fault() => return Err(e),
                Err(e) => debug!("Skipping {}: {}", alternative, e),
            }
        }
        Ok(Vec::new())
    }
}

/// Where [`save_group_names`] put things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGroups {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
}

/// `dir/backup/{file}.backup_{YYYYmmdd_HHMMSS}` for a file in `dir`.
pub fn backup_path(path: &Path, at: &DateTime<FixedOffset>) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    dir.join("backup")
        .join(format!("{name}.backup_{}", at.format("%Y%m%d_%H%M%S")))
}

/// File content: a two-line header, a blank line, then one name per line.
pub fn render_group_names(names: &[String], at: &DateTime<FixedOffset>) -> String {
    let mut out = format!(
        "# Group names extracted on {}\n# Total groups found: {}\n\n",
        format_stamp(at),
        names.len()
    );
    for name in names {
        out.push_str(name);
        out.push('\n');
    }
    out
}

/// Write `names` to `path`, copying an existing file to [`backup_path`]
/// first.
pub fn save_group_names(
    path: &Path,
    names: &[String],
    at: &DateTime<FixedOffset>,
) -> Result<SavedGroups, AutomationError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let backup = if path.exists() {
        let target = backup_path(path, at);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::copy(path, &target)?;
        info!("Backed up {} to {}", path.display(), target.display());
        Some(target)
    } else {
        None
    };
    fs::write(path, render_group_names(names, at))?;
    info!("Saved {} group names to {}", names.len(), path.display());
    Ok(SavedGroups {
        path: path.to_path_buf(),
        backup,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::gmt7;
    use chrono::TimeZone;

    fn at() -> DateTime<FixedOffset> {
        gmt7().with_ymd_and_hms(2025, 3, 9, 21, 5, 0).unwrap()
    }

    #[test]
    fn group_heuristics() {
        assert!(is_likely_group("Ram", true));
        assert!(is_likely_group("Thapa Family", false));
        assert!(is_likely_group("OFFICE", false));
        assert!(is_likely_group("Futsal ⚽", false));
        assert!(is_likely_group("Hari Bahadur Thapa", false));
        assert!(is_likely_group("Sitaram Adhikari Jr", false));
        assert!(is_likely_group("Bishnuprasadkoirala", false));

        assert!(!is_likely_group("Ram", false));
        assert!(!is_likely_group("Sita Sharma", false));
        assert!(!is_likely_group("9779812345678", false));
    }

    #[test]
    fn three_words_need_text_around_both_spaces() {
        assert!(has_three_words("a b c"));
        assert!(has_three_words(" a b c"));
        assert!(!has_three_words("a  b"));
        assert!(!has_three_words(" a b"));
        assert!(!has_three_words("a b "));
    }

    #[test]
    fn scroll_end_allows_some_slack() {
        let position = |top: f64| ScrollPosition {
            top,
            height: 3000.0,
            client: 800.0,
        };
        assert!(!position(500.0).at_end());
        assert!(position(2195.0).at_end());
        assert_eq!(
            ScrollPosition::from_script(&json!([500, 3000, 800])),
            Some(position(500.0))
        );
        assert_eq!(ScrollPosition::from_script(&Value::Null), None);
        assert_eq!(ScrollPosition::from_script(&json!([1, 2])), None);
    }

    #[test]
    fn saving_backs_up_the_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("txt").join("group_names.txt");

        let first = save_group_names(&path, &["Thapa Family".to_string()], &at()).unwrap();
        assert_eq!(first.backup, None);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "# Group names extracted on 2025-03-09 21:05:00 GMT+7\n\
             # Total groups found: 1\n\nThapa Family\n"
        );

        let names = vec!["Office Crew".to_string(), "Futsal ⚽".to_string()];
        let second = save_group_names(&path, &names, &at()).unwrap();
        let backup = second.backup.unwrap();
        assert_eq!(
            backup,
            dir.path()
                .join("txt")
                .join("backup")
                .join("group_names.txt.backup_20250309_210500")
        );
        assert!(fs::read_to_string(&backup).unwrap().ends_with("Thapa Family\n"));
        assert!(fs::read_to_string(&path)
            .unwrap()
            .ends_with("# Total groups found: 2\n\nOffice Crew\nFutsal ⚽\n"));
    }
}
