use thiserror::Error;

/// Words an automation server puts in messages when the session behind it
/// is gone, even if the W3C error code itself is generic.
const SESSION_FAULT_KEYWORDS: &[&str] = &["session", "socket", "connection", "network"];

#[derive(Error, Debug)]
pub enum AutomationError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Automation session is no longer valid: {0}")]
    SessionLost(String),

    #[error("Could not create automation session: {0}")]
    SessionNotCreated(String),

    #[error("Could not reach automation server: {0}")]
    Connection(String),

    #[error("Driver error ({code}): {message}")]
    Driver { code: String, message: String },

    #[error("App is not ready: {0}")]
    AppNotReady(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutomationError {
    /// Build an error from a W3C error payload (`{"error": .., "message": ..}`).
    pub fn from_w3c(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            "no such element" => AutomationError::ElementNotFound(message),
            "stale element reference" => AutomationError::ElementNotFound(message),
            "invalid session id" => AutomationError::SessionLost(message),
            "session not created" => AutomationError::SessionNotCreated(message),
            "invalid selector" => AutomationError::InvalidSelector(message),
            "invalid argument" => AutomationError::InvalidArgument(message),
            "timeout" | "script timeout" => AutomationError::Timeout(message),
            _ => AutomationError::Driver {
                code: code.to_string(),
                message,
            },
        }
    }

    /// True when the failure means the automation session has to be
    /// recreated before anything else can succeed.
    ///
    /// A locator running out of time is not a session fault: the session
    /// answered, the element just never showed up.
    pub fn is_session_fault(&self) -> bool {
        match self {
            AutomationError::SessionLost(_)
            | AutomationError::SessionNotCreated(_)
            | AutomationError::Connection(_) => true,
            AutomationError::Driver { message, .. } => {
                let lower = message.to_lowercase();
                SESSION_FAULT_KEYWORDS.iter().any(|kw| lower.contains(kw))
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for AutomationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            AutomationError::Connection(err.to_string())
        } else if err.is_decode() {
            AutomationError::Internal(format!("Malformed driver response: {err}"))
        } else {
            AutomationError::Driver {
                code: "http".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for AutomationError {
    fn from(err: serde_json::Error) -> Self {
        AutomationError::Internal(format!("JSON error: {err}"))
    }
}
