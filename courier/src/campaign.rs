//! The run: one pass over the selected chats, sending the daily message to
//! each and surviving session deaths along the way.

use crate::adb::DeviceLink;
use crate::app::Messenger;
use crate::health::check_health;
use crate::journal::{ChatStatus, Journal, ProcessedLog};
use crate::photo::{find_daily_photo, transfer_photo};
use crate::search::SearchOutcome;
use crate::send::personalise;
use crate::session::{retry, Session};
use crate::targets::{clean_chat_name, ChatEntry};
use crate::AutomationError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// Recoveries tried before giving up on the run when the session is found dead.
const LIVENESS_RECOVERY_ATTEMPTS: usize = 3;
/// Recoveries tried when a search fails with a session fault.
const SEARCH_RECOVERY_ATTEMPTS: usize = 2;
const SEARCH_RETRIES: usize = 1;

#[derive(Debug, Clone)]
pub struct CampaignOptions {
    /// Prefix the message with `@name`.
    pub mention: bool,
    /// Stripped from list names before searching.
    pub name_prefix: String,
    /// Folder holding the daily photo; `None` sends text only.
    pub photo_dir: Option<PathBuf>,
    /// Push the photo again after this many photo sends.
    pub photo_refresh_every: usize,
    /// Check the USB link after this many chats.
    pub maintenance_every: usize,
    /// Handset to maintain over adb.
    pub device_udid: Option<String>,
}

impl Default for CampaignOptions {
    fn default() -> Self {
        Self {
            mention: true,
            name_prefix: String::new(),
            photo_dir: None,
            photo_refresh_every: 5,
            maintenance_every: 5,
            device_udid: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatResult {
    pub entry: ChatEntry,
    pub status: ChatStatus,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignReport {
    pub results: Vec<ChatResult>,
    /// Already in today's processed log.
    pub skipped: Vec<ChatEntry>,
    pub elapsed: Duration,
    /// The run ended before the last chat because the session could not
    /// be brought back.
    pub stopped_early: bool,
    pub recoveries: usize,
    pub with_photo: bool,
}

impl CampaignReport {
    pub fn count(&self, status: ChatStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    pub fn with_status(&self, status: ChatStatus) -> impl Iterator<Item = &ChatEntry> {
        self.results
            .iter()
            .filter(move |r| r.status == status)
            .map(|r| &r.entry)
    }

    pub fn summary(&self) -> String {
        format!(
            "Sent: {}, Failed: {}, Not found: {}, Skipped: {}, Total time: {:.2}s",
            self.count(ChatStatus::Sent),
            self.count(ChatStatus::Failed),
            self.count(ChatStatus::NotFound),
            self.skipped.len(),
            self.elapsed.as_secs_f64()
        )
    }
}

struct Photo {
    local: PathBuf,
    sends_since_transfer: usize,
}

pub struct Campaign<'a> {
    message: String,
    options: CampaignOptions,
    journal: &'a Journal,
    link: Option<Arc<dyn DeviceLink>>,
}

impl<'a> Campaign<'a> {
    pub fn new(message: impl Into<String>, options: CampaignOptions, journal: &'a Journal) -> Self {
        Self {
            message: message.into(),
            options,
            journal,
            link: None,
        }
    }

    /// Keep the handset's USB link alive during the run.
    pub fn with_link(mut self, link: Arc<dyn DeviceLink>) -> Self {
        self.link = Some(link);
        self
    }

    fn event(&self, kind: &str, message: &str) {
        if let Err(e) = self.journal.record_event(kind, message) {
            warn!("Could not write the run log: {}", e);
        }
    }

    /// Work through `entries` in order.
    ///
    /// Only failing to open today's processed log is an error; everything
    /// that goes wrong with a single chat ends up in the report.
    #[instrument(skip_all, fields(chats = entries.len()))]
    pub async fn run(
        &self,
        session: &mut Session,
        entries: &[ChatEntry],
    ) -> Result<CampaignReport, AutomationError> {
        let started = Instant::now();
        let recoveries_before = session.recoveries();
        self.event("start", &format!("Automation started for {} chats", entries.len()));

        let mut processed = self.journal.processed_log()?;
        let mut photo = self.initial_photo(session).await;
        let mut report = CampaignReport {
            with_photo: photo.is_some(),
            ..CampaignReport::default()
        };

        for (index, entry) in entries.iter().enumerate() {
            let position = format!("{}/{}", index + 1, entries.len());

            if !session.is_alive().await {
                warn!("Automation session lost, attempting recovery");
                if let Err(e) = session.recover(LIVENESS_RECOVERY_ATTEMPTS).await {
                    error!("Session recovery failed, stopping: {}", e);
                    report.stopped_early = true;
                    break;
                }
                if photo.is_some() {
                    info!("Re-transferring photo after session recovery");
                    photo = self.retransfer(session, photo).await;
                }
            }

            if processed.contains(&entry.name) {
                info!("[{}] Already processed today: {}", position, entry);
                report.skipped.push(entry.clone());
                continue;
            }
            info!("[{}] Processing: {}", position, entry);
            let chat_started = Instant::now();

            if let Some(current) = &photo {
                if current.sends_since_transfer >= self.options.photo_refresh_every {
                    info!(
                        "Re-transferring photo (every {} chats)",
                        self.options.photo_refresh_every
                    );
                    photo = self.refresh_photo(session, photo).await;
                }
            }

            let (status, opened) = self.process(session, entry, photo.is_some()).await;
            let elapsed = chat_started.elapsed();
            self.record(&mut processed, entry, status);
            if status == ChatStatus::Sent {
                if let Some(current) = photo.as_mut() {
                    current.sends_since_transfer += 1;
                }
            }
            report.results.push(ChatResult {
                entry: entry.clone(),
                status,
                elapsed,
            });
            info!("[{}] {}: {} ({:.2}s)", position, status, entry, elapsed.as_secs_f64());

            if opened {
                if let Err(e) = session.messenger().go_back(1.0).await {
                    warn!("Could not go back to the chat list: {}", e);
                    if let Err(e) = session.recover(LIVENESS_RECOVERY_ATTEMPTS).await {
                        error!("Session recovery failed, stopping: {}", e);
                        report.stopped_early = true;
                        break;
                    }
                }
            }

            if (index + 1) % self.options.maintenance_every.max(1) == 0 {
                self.maintain(session).await;
            }
        }

        report.elapsed = started.elapsed();
        report.recoveries = session.recoveries() - recoveries_before;
        let mut summary = report.summary();
        if report.stopped_early {
            summary.push_str(" (stopped early)");
        }
        self.event("end", &summary);
        Ok(report)
    }

    /// Search, open and send. The flag tells whether a chat screen was
    /// opened and has to be left with the back key.
    async fn process(&self, session: &mut Session, entry: &ChatEntry, with_photo: bool) -> (ChatStatus, bool) {
        let clean = clean_chat_name(&entry.name, &self.options.name_prefix);
        if clean != entry.name {
            debug!("Searching '{}' as '{}'", entry.name, clean);
        }

        match self.search(session, &clean).await {
            Ok(SearchOutcome::Opened { matched }) => {
                debug!("Opened chat '{}'", matched);
                (self.deliver(session, &clean, with_photo).await, true)
            }
            Ok(SearchOutcome::NotFound(reason)) => {
                info!("Chat '{}' not found ({})", clean, reason);
                (ChatStatus::NotFound, false)
            }
            Err(e) => {
                warn!("Search for '{}' failed: {}", clean, e);
                (ChatStatus::Failed, false)
            }
        }
    }

    /// Search with one retry; a session fault triggers a recovery and one
    /// more search on the new session.
    async fn search(&self, session: &mut Session, clean: &str) -> Result<SearchOutcome, AutomationError> {
        let first = {
            let messenger = session.messenger();
            retry(session.pace(), "search", SEARCH_RETRIES, move || {
                messenger.search_and_open(clean)
            })
            .await
        };
        match first {
            Err(e) if e.is_session_fault() => {
                warn!("Driver fault during search, recovering session: {}", e);
                session.recover(SEARCH_RECOVERY_ATTEMPTS).await?;
                info!("Retrying search after session recovery");
                session.messenger().search_and_open(clean).await
            }
            other => other,
        }
    }

    async fn send(&self, messenger: &Messenger, text: &str, with_photo: bool) -> Result<(), AutomationError> {
        if with_photo {
            messenger.send_with_photo(text).await
        } else {
            messenger.send_text(text).await
        }
    }

    /// Send to the open chat. If the session died while sending, recover,
    /// reopen the chat and send once more.
    async fn deliver(&self, session: &mut Session, clean: &str, with_photo: bool) -> ChatStatus {
        let text = personalise(&self.message, clean, self.options.mention);
        let first = self.send(session.messenger(), &text, with_photo).await;
        let Err(e) = first else {
            return ChatStatus::Sent;
        };
        warn!("Sending failed: {}", e);
        if session.is_alive().await {
            return ChatStatus::Failed;
        }

        warn!("Session lost while sending, attempting recovery");
        if let Err(e) = session.recover(LIVENESS_RECOVERY_ATTEMPTS).await {
            error!("Recovery failed: {}", e);
            return ChatStatus::Failed;
        }
        match session.messenger().search_and_open(clean).await {
            Ok(SearchOutcome::Opened { .. }) => {
                match self.send(session.messenger(), &text, with_photo).await {
                    Ok(()) => ChatStatus::Sent,
                    Err(e) => {
                        warn!("Sending failed again after recovery: {}", e);
                        ChatStatus::Failed
                    }
                }
            }
            Ok(SearchOutcome::NotFound(reason)) => {
                warn!("Chat could not be reopened after recovery ({})", reason);
                ChatStatus::Failed
            }
            Err(e) => {
                warn!("Chat could not be reopened after recovery: {}", e);
                ChatStatus::Failed
            }
        }
    }

    fn record(&self, processed: &mut ProcessedLog, entry: &ChatEntry, status: ChatStatus) {
        if let Err(e) = processed.record(status, entry.row, &entry.name) {
            warn!("Could not write the processed log: {}", e);
        }
        if status == ChatStatus::NotFound {
            if let Err(e) = self.journal.record_not_found(&entry.name) {
                warn!("Could not write the not-found log: {}", e);
            }
        }
    }

    async fn initial_photo(&self, session: &Session) -> Option<Photo> {
        let dir = self.options.photo_dir.as_ref()?;
        let local = match find_daily_photo(dir) {
            Ok(Some(local)) => local,
            Ok(None) => {
                info!("No daily photo in {}, sending text only", dir.display());
                return None;
            }
            Err(e) => {
                warn!("Could not read {}: {}, sending text only", dir.display(), e);
                return None;
            }
        };
        info!("Found daily photo: {}", local.display());
        match transfer_photo(&*session.driver(), &local).await {
            Ok(_) => {
                info!("The photo will be sent with each message");
                Some(Photo {
                    local,
                    sends_since_transfer: 0,
                })
            }
            Err(e) => {
                warn!("Photo transfer failed, sending text only: {}", e);
                None
            }
        }
    }

    /// Push the photo again on a fresh session. Failing disables photos.
    async fn retransfer(&self, session: &Session, photo: Option<Photo>) -> Option<Photo> {
        let photo = photo?;
        match transfer_photo(&*session.driver(), &photo.local).await {
            Ok(_) => Some(Photo {
                sends_since_transfer: 0,
                ..photo
            }),
            Err(e) => {
                warn!("Photo re-transfer failed, sending text only: {}", e);
                None
            }
        }
    }

    /// Periodic refresh; the folder is read again so a swapped photo is
    /// picked up. Failing keeps the previous photo.
    async fn refresh_photo(&self, session: &Session, photo: Option<Photo>) -> Option<Photo> {
        let mut photo = photo?;
        let latest = self
            .options
            .photo_dir
            .as_ref()
            .and_then(|dir| find_daily_photo(dir).ok().flatten());
        let Some(local) = latest else {
            warn!("No photo found for re-transfer, keeping the previous one");
            return Some(photo);
        };
        match transfer_photo(&*session.driver(), &local).await {
            Ok(_) => {
                photo.local = local;
                photo.sends_since_transfer = 0;
                info!("Photo re-transferred");
            }
            Err(e) => warn!("Re-transfer failed, using the previous photo: {}", e),
        }
        Some(photo)
    }

    async fn maintain(&self, session: &Session) {
        let (Some(link), Some(udid)) = (&self.link, &self.options.device_udid) else {
            return;
        };
        if !link.maintain(udid).await {
            warn!("Device {} could not be brought back online", udid);
            return;
        }
        let driver = session.driver();
        let report = check_health(None, Some(&*driver), Some((&**link, udid.as_str()))).await;
        debug!(status = %report.status, "Maintenance check done");
    }
}
