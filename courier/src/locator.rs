use tracing::{debug, instrument};

use crate::driver::AutomationDriver;
use crate::element::Element;
use crate::errors::AutomationError;
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// What a located element has to satisfy before a wait is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Present,
    Displayed,
    Clickable,
}

/// Polls the session for elements matching a selector.
///
/// `Any` selectors try their alternatives in order on every poll. A zero
/// timeout performs exactly one attempt. Session faults end the wait
/// immediately instead of being retried until the deadline.
#[derive(Clone)]
pub struct Locator {
    driver: Arc<dyn AutomationDriver>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
    poll: Duration,
    root: Option<Element>,
}

impl Locator {
    /// Create a new locator with the given selector
    pub fn new(driver: Arc<dyn AutomationDriver>, selector: Selector) -> Self {
        Self {
            driver,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            poll: DEFAULT_POLL_INTERVAL,
            root: None,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    /// This timeout is used if no specific timeout is passed to wait methods.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn poll_every(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    /// Set the root element for this locator
    pub fn within(mut self, element: Element) -> Self {
        self.root = Some(element);
        self
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Every element currently matching, across all alternatives, without
    /// waiting.
    pub async fn all(&self) -> Result<Vec<Element>, AutomationError> {
        let mut out = Vec::new();
        for alternative in self.selector.alternatives() {
            let ids = self
                .driver
                .find_elements(alternative, self.root.as_ref().map(Element::id))
                .await?;
            for id in ids {
                if !out.iter().any(|e: &Element| e.id() == id) {
                    out.push(Element::new(self.driver.clone(), id));
                }
            }
        }
        Ok(out)
    }

    /// First element matching right now, if any.
    pub async fn first_now(&self) -> Result<Option<Element>, AutomationError> {
        self.attempt(Readiness::Present).await
    }

    /// Wait until at least one element is present.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Element, AutomationError> {
        self.wait_until(Readiness::Present, timeout).await
    }

    /// Wait until a matching element is displayed.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_displayed(&self, timeout: Option<Duration>) -> Result<Element, AutomationError> {
        self.wait_until(Readiness::Displayed, timeout).await
    }

    /// Wait until a matching element is displayed and enabled.
    #[instrument(level = "debug", skip(self, timeout), fields(selector = %self.selector))]
    pub async fn wait_clickable(&self, timeout: Option<Duration>) -> Result<Element, AutomationError> {
        self.wait_until(Readiness::Clickable, timeout).await
    }

    /// Wait until the match set is non-empty and return all of it.
    pub async fn wait_all(&self, timeout: Option<Duration>) -> Result<Vec<Element>, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = Instant::now() + effective_timeout;
        loop {
            let found = self.all().await?;
            if !found.is_empty() {
                return Ok(found);
            }
            if Instant::now() + self.poll >= deadline {
                return Err(self.timed_out(effective_timeout));
            }
            sleep(self.poll).await;
        }
    }

    async fn wait_until(
        &self,
        readiness: Readiness,
        timeout: Option<Duration>,
    ) -> Result<Element, AutomationError> {
        let effective_timeout = timeout.unwrap_or(self.timeout);
        debug!(
            "Waiting up to {:?} for {:?} element matching {}",
            effective_timeout, readiness, self.selector
        );
        let deadline = Instant::now() + effective_timeout;
        loop {
            if let Some(element) = self.attempt(readiness).await? {
                return Ok(element);
            }
            if Instant::now() + self.poll >= deadline {
                return Err(self.timed_out(effective_timeout));
            }
            sleep(self.poll).await;
        }
    }

    async fn attempt(&self, readiness: Readiness) -> Result<Option<Element>, AutomationError> {
        for alternative in self.selector.alternatives() {
            let ids = match self
                .driver
                .find_elements(alternative, self.root.as_ref().map(Element::id))
                .await
            {
                Ok(ids) => ids,
                Err(e) if e.is_session_fault() => return Err(e),
                Err(AutomationError::InvalidSelector(msg)) => {
                    return Err(AutomationError::InvalidSelector(msg))
                }
                Err(e) => {
                    debug!("Lookup of {} failed: {}", alternative, e);
                    continue;
                }
            };
            for id in ids {
                let element = Element::new(self.driver.clone(), id);
                if self.is_ready(&element, readiness).await? {
                    return Ok(Some(element));
                }
            }
        }
        Ok(None)
    }

    async fn is_ready(&self, element: &Element, readiness: Readiness) -> Result<bool, AutomationError> {
        let verdict = match readiness {
            Readiness::Present => return Ok(true),
            Readiness::Displayed => element.is_displayed().await,
            Readiness::Clickable => element.is_clickable().await,
        };
        match verdict {
            Ok(ready) => Ok(ready),
            Err(e) if e.is_session_fault() => Err(e),
            // Element went stale between lookup and check
            Err(_) => Ok(false),
        }
    }

    fn timed_out(&self, timeout: Duration) -> AutomationError {
        AutomationError::Timeout(format!(
            "Timed out after {timeout:?} waiting for element {}",
            self.selector
        ))
    }
}
