//! Finding a conversation through the messenger's search screen.
//!
//! Search results come in sections ("Chats", "Other contacts", "Messages").
//! Only rows inside the "Chats" section are real conversations; a
//! "No results" label only means the chat does not exist when no section is
//! showing at all.

use crate::app::{Messenger, TEXT_VIEW};
use crate::element::Element;
use crate::{AutomationError, Selector};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn, Level};

const SEARCH_BUTTON_SECS: f64 = 2.0;
const SEARCH_FIELD_SECS: f64 = 3.0;
const RESULTS_BUDGET_SECS: f64 = 20.0;
const RESULTS_POLL_SECS: f64 = 0.5;
/// Share of the budget spent waiting for a "Chats" section to fill.
const CHATS_PATIENCE: f64 = 0.75;
/// Polls showing only message hits before the chat is declared missing.
const MESSAGE_ONLY_LIMIT: usize = 5;
const DUMP_LIMIT: usize = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// "No results" with no result sections on screen.
    NoResults,
    /// Only message hits kept coming back.
    ManyMessageOnlyResults,
    /// Nothing conclusive before the budget ran out.
    Timeout,
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotFoundReason::NoResults => "no results",
            NotFoundReason::ManyMessageOnlyResults => "only message results",
            NotFoundReason::Timeout => "timed out",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The conversation is open. `matched` is the row label that was tapped.
    Opened { matched: String },
    NotFound(NotFoundReason),
}

impl SearchOutcome {
    pub fn is_opened(&self) -> bool {
        matches!(self, SearchOutcome::Opened { .. })
    }
}

/// Vertical extent of the "Chats" section: strictly below its title and
/// strictly above the next section's title, if there is one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub top: i64,
    pub bottom: Option<i64>,
}

impl Band {
    pub fn contains(&self, y: i64) -> bool {
        y > self.top && self.bottom.map_or(true, |bottom| y < bottom)
    }
}

/// Choose which result row to open.
///
/// `names` holds each row's readable name, `None` when it could not be
/// read. Rows whose name contains the query (ignoring case) win, in
/// order. Unreadable rows are the fallback and rows naming another chat
/// are never picked. A lone result row never gets here: it is opened
/// without reading it.
pub fn pick_row(query: &str, names: &[Option<String>]) -> Option<usize> {
    let needle = query.to_lowercase();
    names
        .iter()
        .position(|n| n.as_ref().is_some_and(|n| n.to_lowercase().contains(&needle)))
        .or_else(|| names.iter().position(Option::is_none))
}

enum SectionPoll {
    Absent,
    Pending,
    Opened(String),
}

impl Messenger {
    /// Search for `name` and open the matching conversation.
    ///
    /// Errors are reserved for driver failures; a chat that cannot be found
    /// is an `Ok(NotFound)`. Whenever the chat is not opened the search
    /// screen is left with the back key.
    #[instrument(skip(self), fields(chat = %name))]
    pub async fn search_and_open(&self, name: &str) -> Result<SearchOutcome, AutomationError> {
        let started = Instant::now();
        info!("Searching for chat: {}", name);

        self.ensure_home().await?;
        self.activate_search().await?;
        self.pace().pause(1.0).await;
        self.enter_query(name).await?;

        debug!("Waiting for search results...");
        self.pace().pause(1.5).await;
        let outcome = self.await_results(name).await?;
        match &outcome {
            SearchOutcome::Opened { matched } => info!(
                "Opened '{}' after {:.2}s",
                matched,
                started.elapsed().as_secs_f64()
            ),
            SearchOutcome::NotFound(reason) => {
                info!(
                    "Chat '{}' not found ({}) after {:.2}s",
                    name,
                    reason,
                    started.elapsed().as_secs_f64()
                );
                self.go_back(0.5).await?;
            }
        }
        Ok(outcome)
    }

    async fn activate_search(&self) -> Result<(), AutomationError> {
        let found = self
            .locator(self.app().search_button(), SEARCH_BUTTON_SECS)
            .wait_clickable(None)
            .await;
        match found {
            Ok(button) => {
                button.click().await?;
                debug!("Search activated via element click");
            }
            Err(e) if e.is_session_fault() => return Err(e),
            Err(_) => {
                let point = self.device().search_button;
                self.tap(point.x, point.y).await?;
                debug!("Search activated by coordinate tap at ({}, {})", point.x, point.y);
            }
        }
        Ok(())
    }

    async fn enter_query(&self, name: &str) -> Result<(), AutomationError> {
        let field = self
            .locator(self.app().search_field(), SEARCH_FIELD_SECS)
            .wait_clickable(None)
            .await;
        match field {
            Ok(field) => {
                field.click().await?;
                field.clear().await?;
                field.send_keys(name).await?;
                debug!("Query typed into search field");
            }
            Err(e) if e.is_session_fault() => return Err(e),
            Err(_) => {
                self.driver()
                    .execute_mobile("mobile: type", json!({ "text": name }))
                    .await?;
                debug!("Query typed via mobile: type");
            }
        }
        Ok(())
    }

    async fn await_results(&self, name: &str) -> Result<SearchOutcome, AutomationError> {
        let budget = self.pace().duration(RESULTS_BUDGET_SECS);
        let patience = budget.mul_f64(CHATS_PATIENCE);
        let started = Instant::now();
        let mut message_only_polls = 0usize;
        let mut dumped = false;

        loop {
            if !dumped {
                dumped = true;
                self.dump_visible_texts().await;
            }

            match self.poll_results(name, &mut message_only_polls, started.elapsed() < patience).await {
                Ok(Some(outcome)) => return Ok(outcome),
                Ok(None) => {}
                Err(e) if e.is_session_fault() => return Err(e),
                Err(e) => debug!("Result check failed, retrying: {}", e),
            }

            if started.elapsed() >= budget {
                break;
            }
            self.pace().pause(RESULTS_POLL_SECS).await;
        }
        warn!("Neither a chat nor 'No results' appeared, assuming not found");
        Ok(SearchOutcome::NotFound(NotFoundReason::Timeout))
    }

    /// One look at the result screen. `Ok(None)` means keep waiting.
    async fn poll_results(
        &self,
        name: &str,
        message_only_polls: &mut usize,
        patient: bool,
    ) -> Result<Option<SearchOutcome>, AutomationError> {
        match self.poll_chats_section(name).await? {
            SectionPoll::Opened(matched) => return Ok(Some(SearchOutcome::Opened { matched })),
            SectionPoll::Pending if patient => {
                debug!("'Chats' section has no matching chat yet");
                return Ok(None);
            }
            SectionPoll::Pending | SectionPoll::Absent => {}
        }

        let app = self.app();
        let messages_showing = self
            .first_displayed(app.section_title(&[app.messages_section.as_str()]))
            .await?
            .is_some();
        let chats_showing = self
            .first_displayed(app.section_title(&[app.chats_section.as_str()]))
            .await?
            .is_some();

        if messages_showing {
            *message_only_polls += 1;
            debug!("'Messages' section showing ({} times)", message_only_polls);
            if *message_only_polls >= MESSAGE_ONLY_LIMIT {
                return Ok(Some(SearchOutcome::NotFound(
                    NotFoundReason::ManyMessageOnlyResults,
                )));
            }
        }

        if !messages_showing && !chats_showing {
            if let Some(label) = self.first_displayed(app.no_results()).await? {
                debug!("Standalone '{}' shown", label.label().await);
                return Ok(Some(SearchOutcome::NotFound(NotFoundReason::NoResults)));
            }
        }
        Ok(None)
    }

    async fn poll_chats_section(&self, name: &str) -> Result<SectionPoll, AutomationError> {
        let app = self.app();
        let Some(chats_title) = self
            .first_displayed(app.section_title(&[app.chats_section.as_str()]))
            .await?
        else {
            return Ok(SectionPoll::Absent);
        };
        let top = chats_title.y().await?;
        let contact_titles: Vec<&str> = app.contacts_sections.iter().map(String::as_str).collect();
        let bottom = match self.first_displayed(app.section_title(&contact_titles)).await? {
            Some(title) => Some(title.y().await?),
            None => None,
        };
        let band = Band { top, bottom };
        debug!(?band, "'Chats' section located");

        for selector in app.result_rows().alternatives() {
            let rows = self.rows_in_band(selector, band).await?;
            if rows.is_empty() {
                continue;
            }
            if let [only] = rows.as_slice() {
                debug!("Single row under 'Chats', opening it");
                only.click().await?;
                return Ok(SectionPoll::Opened(name.to_string()));
            }
            let mut names = Vec::with_capacity(rows.len());
            for row in &rows {
                names.push(self.read_row_name(row).await);
            }
            debug!(?names, "Candidate rows under 'Chats'");
            if let Some(index) = pick_row(name, &names) {
                let matched = names[index].clone().unwrap_or_else(|| "unknown".to_string());
                rows[index].click().await?;
                return Ok(SectionPoll::Opened(matched));
            }
            debug!("No row under 'Chats' matches '{}'", name);
        }
        Ok(SectionPoll::Pending)
    }

    async fn rows_in_band(&self, selector: &Selector, band: Band) -> Result<Vec<Element>, AutomationError> {
        let mut rows = Vec::new();
        for row in self.locator(selector.clone(), 0.0).all().await? {
            if !row.is_displayed().await? {
                continue;
            }
            let y = row.y().await?;
            if band.contains(y) {
                rows.push(row);
            } else {
                debug!(y, "Row outside the 'Chats' section, skipping");
            }
        }
        Ok(rows)
    }

    /// Name shown in a result row, skipping system notices.
    async fn read_row_name(&self, row: &Element) -> Option<String> {
        for selector in self.app().row_name_labels() {
            let Ok(Some(label)) = row.locator(selector).first_now().await else {
                continue;
            };
            match label.text().await {
                Ok(text) if text.is_empty() => continue,
                Ok(text) if self.app().is_notice(&text) => {
                    debug!("Skipping notice text '{}'", text);
                    continue;
                }
                Ok(text) => return Some(text),
                Err(_) => continue,
            }
        }
        None
    }

    pub(crate) async fn first_displayed(
        &self,
        selector: Selector,
    ) -> Result<Option<Element>, AutomationError> {
        for element in self.locator(selector, 0.0).all().await? {
            if element.is_displayed().await? {
                return Ok(Some(element));
            }
        }
        Ok(None)
    }

    async fn dump_visible_texts(&self) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        let texts = match self
            .locator(Selector::ClassName(TEXT_VIEW.to_string()), 0.0)
            .all()
            .await
        {
            Ok(texts) => texts,
            Err(e) => {
                debug!("Could not list text views: {}", e);
                return;
            }
        };
        debug!("{} text views on screen", texts.len());
        for (index, element) in texts.iter().take(DUMP_LIMIT).enumerate() {
            let text = element.text().await.unwrap_or_default();
            if text.is_empty() {
                continue;
            }
            let id = element.attribute("resource-id").await.ok().flatten();
            debug!("Text {}: '{}' (id: {:?})", index + 1, text, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_is_exclusive_on_both_edges() {
        let band = Band {
            top: 300,
            bottom: Some(900),
        };
        assert!(!band.contains(300));
        assert!(band.contains(301));
        assert!(band.contains(899));
        assert!(!band.contains(900));
        assert!(!band.contains(120));
    }

    #[test]
    fn band_without_next_section_is_open_ended() {
        let band = Band {
            top: 300,
            bottom: None,
        };
        assert!(band.contains(5_000));
    }

    #[test]
    fn lone_candidate_still_has_to_match() {
        assert_eq!(pick_row("anything", &[Some("Other".into())]), None);
        assert_eq!(pick_row("anything", &[None]), Some(0));
    }

    #[test]
    fn verified_match_beats_unreadable_rows() {
        let names = vec![
            None,
            Some("Family Group".to_string()),
            Some("SunnyRiver88".to_string()),
        ];
        assert_eq!(pick_row("sunnyriver", &names), Some(2));
    }

    #[test]
    fn unreadable_row_is_the_fallback() {
        let names = vec![Some("Family Group".to_string()), None];
        assert_eq!(pick_row("sunnyriver", &names), Some(1));
    }

    #[test]
    fn rows_naming_other_chats_are_never_picked() {
        let names = vec![Some("Family".to_string()), Some("Work".to_string())];
        assert_eq!(pick_row("sunny", &names), None);
    }
}
