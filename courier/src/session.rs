//! Owning the automation session across its deaths.
//!
//! Appium sessions on a phone that has been running for hours die: the
//! UiAutomator2 server gets killed, USB drops, the new-command timeout
//! fires. A [`Session`] keeps the factory that made the current driver so
//! it can throw the dead one away and bring the app back on a fresh one.

use crate::app::{AppProfile, Messenger};
use crate::device::DeviceProfile;
use crate::driver::{AutomationDriver, DriverFactory};
use crate::pacing::Pacing;
use crate::AutomationError;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct Session {
    factory: Arc<dyn DriverFactory>,
    messenger: Messenger,
    recoveries: usize,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("server", &self.factory.describe())
            .field("recoveries", &self.recoveries)
            .finish()
    }
}

impl Session {
    /// Connect, wake the handset and bring the app to its chat list.
    #[instrument(skip_all, fields(server = %factory.describe()))]
    pub async fn start(
        factory: Arc<dyn DriverFactory>,
        app: Arc<AppProfile>,
        device: Arc<DeviceProfile>,
        pace: Pacing,
    ) -> Result<Self, AutomationError> {
        info!("Starting automation session...");
        let driver = factory.connect().await?;
        let messenger = Messenger::new(driver, app, device, pace);
        let session = Self {
            factory,
            messenger,
            recoveries: 0,
        };

        let prepared = session.prepare().await;
        if let Err(e) = prepared {
            session.quit().await;
            return Err(e);
        }
        info!("{} is open and ready", session.messenger.app().display_name);
        pace.pause(1.8).await;
        Ok(session)
    }

    async fn prepare(&self) -> Result<(), AutomationError> {
        self.messenger.wake_device().await?;
        if !self.messenger.open_app().await? {
            return Err(AutomationError::AppNotReady(format!(
                "{} did not reach its chat list",
                self.messenger.app().display_name
            )));
        }
        Ok(())
    }

    /// Wrap an already connected driver, skipping wake and app launch.
    pub fn attach(factory: Arc<dyn DriverFactory>, messenger: Messenger) -> Self {
        Self {
            factory,
            messenger,
            recoveries: 0,
        }
    }

    /// The messenger on the current driver. Re-fetch after every recovery.
    pub fn messenger(&self) -> &Messenger {
        &self.messenger
    }

    pub fn driver(&self) -> Arc<dyn AutomationDriver> {
        self.messenger.driver().clone()
    }

    pub fn pace(&self) -> Pacing {
        self.messenger.pace()
    }

    /// Successful recoveries so far.
    pub fn recoveries(&self) -> usize {
        self.recoveries
    }

    /// The session answers a window-size request.
    pub async fn is_alive(&self) -> bool {
        match self.messenger.driver().window_size().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Liveness check failed: {}", e);
                false
            }
        }
    }

    /// Replace the session with a fresh one and reopen the app, trying up
    /// to `attempts` times. The old session is quit once, before the first
    /// attempt, errors ignored.
    #[instrument(skip(self))]
    pub async fn recover(&mut self, attempts: usize) -> Result<(), AutomationError> {
        let pace = self.pace();
        for attempt in 0..attempts {
            info!("Recovering automation session (attempt {}/{})", attempt + 1, attempts);

            if attempt == 0 {
                if let Err(e) = self.messenger.driver().quit().await {
                    debug!("Old session cleanup failed: {}", e);
                }
            }
            pace.pause(2.0 + attempt as f64).await;

            let driver = match self.factory.connect().await {
                Ok(driver) => driver,
                Err(e) => {
                    warn!("Could not create a new session: {}", e);
                    if attempt + 1 < attempts {
                        pace.pause(3.0 + attempt as f64).await;
                    }
                    continue;
                }
            };
            let candidate = self.messenger.with_driver(driver);

            match reinitialize(&candidate).await {
                Ok(()) => {
                    self.messenger = candidate;
                    self.recoveries += 1;
                    info!("Session recovered");
                    return Ok(());
                }
                Err(e) => {
                    warn!("Recovery attempt {} failed: {}", attempt + 1, e);
                    if let Err(e) = candidate.driver().quit().await {
                        debug!("Discarding the new session failed: {}", e);
                    }
                    if attempt + 1 < attempts {
                        pace.pause(3.0 + attempt as f64).await;
                    }
                }
            }
        }
        Err(AutomationError::SessionLost(format!(
            "recovery failed after {attempts} attempts"
        )))
    }

    /// End the session, logging rather than returning failures.
    pub async fn quit(&self) {
        info!("Closing automation session...");
        if let Err(e) = self.messenger.driver().quit().await {
            warn!("Closing the session failed: {}", e);
        }
    }
}

async fn reinitialize(messenger: &Messenger) -> Result<(), AutomationError> {
    messenger.wake_device().await?;
    messenger
        .pace()
        .adaptive_wait(&**messenger.driver(), 1.5, 3.0)
        .await;
    if messenger.open_app().await? {
        Ok(())
    } else {
        Err(AutomationError::AppNotReady(format!(
            "could not reopen {}",
            messenger.app().display_name
        )))
    }
}

/// Run `op` up to `retries + 1` times, sleeping `1 + attempt` seconds
/// between tries.
///
/// Session faults are returned at once: retrying on a dead session cannot
/// succeed, the caller has to recover first.
pub async fn retry<T, F, Fut>(
    pace: Pacing,
    what: &str,
    retries: usize,
    mut op: F,
) -> Result<T, AutomationError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AutomationError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_session_fault() => {
                warn!("{} hit a session fault: {}", what, e);
                return Err(e);
            }
            Err(e) if attempt < retries => {
                warn!(
                    "{} failed (attempt {}/{}), retrying: {}",
                    what,
                    attempt + 1,
                    retries + 1,
                    e
                );
                pace.pause(1.0 + attempt as f64).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("{} failed after {} attempts", what, retries + 1);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn retry_runs_until_success() {
        let calls = &AtomicUsize::new(0);
        let result = retry(Pacing::immediate(), "flaky", 2, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(AutomationError::ElementNotFound("not yet".into()))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_the_budget() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = retry(Pacing::immediate(), "broken", 1, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AutomationError::Timeout("never".into()))
        })
        .await;
        assert!(matches!(result, Err(AutomationError::Timeout(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_stops_on_session_faults() {
        let calls = &AtomicUsize::new(0);
        let result: Result<(), _> = retry(Pacing::immediate(), "dead", 3, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AutomationError::SessionLost("gone".into()))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
