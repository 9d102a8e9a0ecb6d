use crate::driver::{AutomationDriver, Rect};
use crate::errors::AutomationError;
use crate::selector::Selector;
use std::fmt;
use std::sync::Arc;

use super::Locator;

/// A live handle to an element inside one automation session.
///
/// Handles die with their session; after recovery every element has to be
/// looked up again.
#[derive(Clone)]
pub struct Element {
    driver: Arc<dyn AutomationDriver>,
    id: String,
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element").field("id", &self.id).finish()
    }
}

impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Arc::ptr_eq(&self.driver, &other.driver)
    }
}

impl Element {
    pub(crate) fn new(driver: Arc<dyn AutomationDriver>, id: String) -> Self {
        Self { driver, id }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn click(&self) -> Result<(), AutomationError> {
        self.driver.click(&self.id).await
    }

    pub async fn clear(&self) -> Result<(), AutomationError> {
        self.driver.clear(&self.id).await
    }

    pub async fn send_keys(&self, text: &str) -> Result<(), AutomationError> {
        self.driver.send_keys(&self.id, text).await
    }

    pub async fn text(&self) -> Result<String, AutomationError> {
        self.driver.text(&self.id).await
    }

    pub async fn attribute(&self, name: &str) -> Result<Option<String>, AutomationError> {
        self.driver.attribute(&self.id, name).await
    }

    pub async fn is_displayed(&self) -> Result<bool, AutomationError> {
        self.driver.is_displayed(&self.id).await
    }

    pub async fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.driver.is_enabled(&self.id).await
    }

    /// Displayed and enabled.
    pub async fn is_clickable(&self) -> Result<bool, AutomationError> {
        Ok(self.is_displayed().await? && self.is_enabled().await?)
    }

    pub async fn rect(&self) -> Result<Rect, AutomationError> {
        self.driver.rect(&self.id).await
    }

    /// Top edge of the element on screen.
    pub async fn y(&self) -> Result<i64, AutomationError> {
        Ok(self.rect().await?.y)
    }

    /// Best human-readable label: text, then resource id, then "element".
    pub async fn label(&self) -> String {
        if let Ok(text) = self.text().await {
            if !text.is_empty() {
                return text;
            }
        }
        match self.attribute("resource-id").await {
            Ok(Some(id)) if !id.is_empty() => id,
            _ => "element".to_string(),
        }
    }

    /// Locator scoped to this element's descendants.
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        Locator::new(self.driver.clone(), selector.into()).within(self.clone())
    }
}
