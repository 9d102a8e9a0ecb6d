//! Health of the automation stack: server, session and USB link.
//!
//! The pieces fail independently. A reachable server with a dead session
//! can be recovered; an offline handset cannot until the link is back.

use crate::adb::DeviceLink;
use crate::driver::{AppiumConnector, AutomationDriver, DriverFactory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Overall health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything checked is working
    Healthy,
    /// Something failed but the server is there to recover with
    Degraded,
    /// Nothing to recover with
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        write!(f, "{s}")
    }
}

/// Result of one health check. `None` means the component was not checked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,

    pub server_reachable: Option<bool>,

    /// The session answered a window-size request
    pub session_alive: Option<bool>,

    /// The handset is listed by adb in the `device` state
    pub device_online: Option<bool>,

    pub check_duration_ms: u64,

    pub error_message: Option<String>,

    pub diagnostics: HashMap<String, serde_json::Value>,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            server_reachable: None,
            session_alive: None,
            device_online: None,
            check_duration_ms: 0,
            error_message: Some("Health check not performed".to_string()),
            diagnostics: HashMap::new(),
        }
    }
}

impl HealthReport {
    /// Derive `status` from the component results.
    pub fn update_status(&mut self) {
        let checked = [self.server_reachable, self.session_alive, self.device_online];
        let failed = checked.iter().any(|c| *c == Some(false));
        let any_checked = checked.iter().any(Option::is_some);
        let lifeline = self.server_reachable == Some(true) || self.session_alive == Some(true);

        self.status = if any_checked && !failed {
            HealthStatus::Healthy
        } else if lifeline && self.device_online != Some(false) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        };
        if self.status == HealthStatus::Healthy {
            self.error_message = None;
        }
    }

    pub fn add_diagnostic(&mut self, key: impl Into<String>, value: impl Serialize) {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.diagnostics.insert(key.into(), json_value);
        }
    }

    fn note_error(&mut self, error: String) {
        match &mut self.error_message {
            Some(existing) => {
                existing.push_str("; ");
                existing.push_str(&error);
            }
            None => self.error_message = Some(error),
        }
    }
}

/// Check whatever components are given.
pub async fn check_health(
    server: Option<&AppiumConnector>,
    driver: Option<&dyn AutomationDriver>,
    device: Option<(&dyn DeviceLink, &str)>,
) -> HealthReport {
    let started = Instant::now();
    let mut report = HealthReport {
        error_message: None,
        ..HealthReport::default()
    };

    if let Some(server) = server {
        match server.server_status().await {
            Ok(status) => {
                report.server_reachable = Some(status.ready);
                report.add_diagnostic("server", server.describe());
                if let Some(version) = status.version {
                    report.add_diagnostic("server_version", version);
                }
                if !status.ready {
                    report.note_error(format!("server not ready: {}", status.message));
                }
            }
            Err(e) => {
                report.server_reachable = Some(false);
                report.note_error(format!("server: {e}"));
            }
        }
    }

    if let Some(driver) = driver {
        match driver.window_size().await {
            Ok(size) => {
                report.session_alive = Some(true);
                report.add_diagnostic("window", size);
            }
            Err(e) => {
                report.session_alive = Some(false);
                report.note_error(format!("session: {e}"));
            }
        }
    }

    if let Some((link, udid)) = device {
        let online = link.is_online(udid).await;
        report.device_online = Some(online);
        report.add_diagnostic("udid", udid);
        if !online {
            report.note_error(format!("device {udid} offline"));
        }
    }

    report.check_duration_ms = started.elapsed().as_millis() as u64;
    report.update_status();
    match report.status {
        HealthStatus::Healthy => debug!("Health check passed in {}ms", report.check_duration_ms),
        status => warn!(
            "Health check {}: {}",
            status,
            report.error_message.as_deref().unwrap_or("")
        ),
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::AutomationError;

    struct FakeLink(bool);

    #[async_trait::async_trait]
    impl DeviceLink for FakeLink {
        async fn is_online(&self, _udid: &str) -> bool {
            self.0
        }

        async fn reconnect(&self, _udid: &str) -> bool {
            self.0
        }

        async fn keep_awake(&self, _udid: &str) -> Result<(), AutomationError> {
            Ok(())
        }
    }

    #[test]
    fn nothing_checked_is_unhealthy() {
        let mut report = HealthReport::default();
        report.update_status();
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn live_session_and_online_device_are_healthy() {
        let driver = MockDriver::new();
        let report = check_health(None, Some(&driver), Some((&FakeLink(true), "R58M"))).await;
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.session_alive, Some(true));
        assert_eq!(report.device_online, Some(true));
        assert!(report.error_message.is_none());
        assert!(report.diagnostics.contains_key("window"));
    }

    #[tokio::test]
    async fn dead_session_with_device_online_is_unhealthy_without_a_server() {
        let driver = MockDriver::new();
        driver.kill();
        let report = check_health(None, Some(&driver), Some((&FakeLink(true), "R58M"))).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.error_message.unwrap().contains("session"));
    }

    #[test]
    fn reachable_server_with_dead_session_is_degraded() {
        let mut report = HealthReport {
            server_reachable: Some(true),
            session_alive: Some(false),
            ..HealthReport::default()
        };
        report.update_status();
        assert_eq!(report.status, HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn offline_device_is_unhealthy() {
        let driver = MockDriver::new();
        let report = check_health(None, Some(&driver), Some((&FakeLink(false), "R58M"))).await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.device_online, Some(false));
    }
}
