//! Dated, append-only text logs kept next to the chat list.
//!
//! All dates and timestamps use the fixed GMT+7 offset so that a run that
//! crosses midnight on a differently configured machine still lands in the
//! same files as the operators expect.

use crate::AutomationError;
use chrono::{DateTime, FixedOffset, Utc};
use regex::Regex;
use std::collections::HashSet;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

const GMT7_SECS: i32 = 7 * 3600;

pub fn gmt7() -> FixedOffset {
    FixedOffset::east_opt(GMT7_SECS).expect("GMT+7 is a valid offset")
}

/// `2025-01-31 18:04:05 GMT+7`
pub fn format_stamp(at: &DateTime<FixedOffset>) -> String {
    at.format("%Y-%m-%d %H:%M:%S GMT+7").to_string()
}

fn processed_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Row\d+:\s*(.+)").expect("static regex"))
}

/// The chat name in a processed-log line, whatever its status.
pub fn processed_name(line: &str) -> Option<&str> {
    processed_line()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|name| !name.is_empty())
}

/// How one chat of a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatStatus {
    Sent,
    Failed,
    NotFound,
}

impl ChatStatus {
    fn log_prefix(&self) -> &'static str {
        match self {
            ChatStatus::Sent => "",
            ChatStatus::Failed => "FAILED ",
            ChatStatus::NotFound => "NOT_FOUND ",
        }
    }
}

impl fmt::Display for ChatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChatStatus::Sent => "sent",
            ChatStatus::Failed => "failed",
            ChatStatus::NotFound => "not found",
        };
        write!(f, "{s}")
    }
}

type Clock = Arc<dyn Fn() -> DateTime<FixedOffset> + Send + Sync>;

/// Writer for the run log, the not-found log and the processed log.
pub struct Journal {
    dir: PathBuf,
    clock: Clock,
    not_found_header_written: AtomicBool,
}

impl fmt::Debug for Journal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Journal").field("dir", &self.dir).finish()
    }
}

impl Journal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_clock(dir, || Utc::now().with_timezone(&gmt7()))
    }

    /// Journal with a fixed or fake clock.
    pub fn with_clock(
        dir: impl Into<PathBuf>,
        clock: impl Fn() -> DateTime<FixedOffset> + Send + Sync + 'static,
    ) -> Self {
        Self {
            dir: dir.into(),
            clock: Arc::new(clock),
            not_found_header_written: AtomicBool::new(false),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        (self.clock)()
    }

    pub fn event_log_path(&self) -> PathBuf {
        self.dir
            .join(format!("script_log_{}.txt", self.now().format("%Y%m%d")))
    }

    pub fn not_found_log_path(&self) -> PathBuf {
        self.dir
            .join(format!("not_found_chats_{}.txt", self.now().format("%Y%m%d")))
    }

    pub fn processed_log_path(&self) -> PathBuf {
        self.dir
            .join(format!("processed_chats_{}.txt", self.now().format("%Y-%m-%d")))
    }

    fn append(&self, path: &Path, text: &str) -> Result<(), AutomationError> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    /// `[timestamp] KIND: message` in today's run log.
    pub fn record_event(&self, kind: &str, message: &str) -> Result<(), AutomationError> {
        let line = format!(
            "[{}] {}: {}\n",
            format_stamp(&self.now()),
            kind.to_uppercase(),
            message
        );
        self.append(&self.event_log_path(), &line)?;
        info!("{}: {}", kind.to_uppercase(), message);
        Ok(())
    }

    /// Add a chat to today's not-found log. The first call of a run writes
    /// a timestamp header.
    pub fn record_not_found(&self, name: &str) -> Result<(), AutomationError> {
        let path = self.not_found_log_path();
        let mut text = String::new();
        if !self.not_found_header_written.swap(true, Ordering::SeqCst) {
            text.push_str(&format!("[{}]\n", format_stamp(&self.now())));
        }
        text.push_str(name);
        text.push('\n');
        self.append(&path, &text)?;
        debug!("Recorded not found chat '{}' in {}", name, path.display());
        Ok(())
    }

    /// Today's processed log, with the names already in it.
    pub fn processed_log(&self) -> Result<ProcessedLog, AutomationError> {
        ProcessedLog::open(self.processed_log_path())
    }
}

/// Chats already handled today, backed by the processed log.
#[derive(Debug)]
pub struct ProcessedLog {
    path: PathBuf,
    names: HashSet<String>,
}

impl ProcessedLog {
    /// Load the log at `path`. A missing file is an empty log.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AutomationError> {
        let path = path.into();
        let mut names = HashSet::new();
        match fs::read_to_string(&path) {
            Ok(content) => {
                names.extend(content.lines().filter_map(processed_name).map(str::to_string));
                info!(
                    "Loaded {} previously processed chats from {}",
                    names.len(),
                    path.display()
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(Self { path, names })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name.trim())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Append `[STATUS ]RowN: name` and remember the name.
    pub fn record(&mut self, status: ChatStatus, row: usize, name: &str) -> Result<(), AutomationError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}Row{}: {}", status.log_prefix(), row, name)?;
        self.names.insert(name.trim().to_string());
        Ok(())
    }
}

/// The message of the day, trimmed. Missing or empty is an error.
pub fn read_daily_message(path: &Path) -> Result<String, AutomationError> {
    let message = fs::read_to_string(path)
        .map_err(|e| {
            AutomationError::InvalidArgument(format!(
                "cannot read daily message {}: {e}",
                path.display()
            ))
        })?
        .trim()
        .to_string();
    if message.is_empty() {
        warn!("{} is empty", path.display());
        return Err(AutomationError::InvalidArgument(format!(
            "{} is empty, add the message to send",
            path.display()
        )));
    }
    Ok(message)
}
