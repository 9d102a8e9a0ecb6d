//! Screen dumps for working out selectors on a new app build or handset.

use crate::driver::{AutomationDriver, Rect};
use crate::selector::Query;
use crate::{AutomationError, Selector};
use serde::Serialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument};

/// One visible element and the attributes selectors are built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InspectedElement {
    pub class: String,
    pub resource_id: Option<String>,
    pub text: Option<String>,
    pub content_desc: Option<String>,
    pub bounds: Rect,
}

impl InspectedElement {
    /// Nothing a selector could key on.
    pub fn is_anonymous(&self) -> bool {
        self.resource_id.is_none() && self.text.is_none() && self.content_desc.is_none()
    }
}

impl fmt::Display for InspectedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short_class = self.class.rsplit('.').next().unwrap_or(&self.class);
        write!(
            f,
            "{short_class:<16} [{},{} {}x{}]",
            self.bounds.x, self.bounds.y, self.bounds.width, self.bounds.height
        )?;
        if let Some(id) = &self.resource_id {
            write!(f, " id={id}")?;
        }
        if let Some(text) = &self.text {
            write!(f, " text={text:?}")?;
        }
        if let Some(desc) = &self.content_desc {
            write!(f, " desc={desc:?}")?;
        }
        Ok(())
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Displayed elements on the current screen, top to bottom. Elements with
/// no id, text or description are left out unless `include_anonymous`.
#[instrument(skip(driver))]
pub async fn visible_elements(
    driver: &dyn AutomationDriver,
    include_anonymous: bool,
) -> Result<Vec<InspectedElement>, AutomationError> {
    let ids = driver
        .find_elements(&Selector::Where(Query::any()), None)
        .await?;
    debug!("{} elements on screen", ids.len());

    let mut out = Vec::new();
    for id in ids {
        // Elements vanish while the screen settles; skip those
        let Ok(true) = driver.is_displayed(&id).await else {
            continue;
        };
        let element = InspectedElement {
            class: driver
                .attribute(&id, "class")
                .await?
                .unwrap_or_else(|| "?".to_string()),
            resource_id: non_empty(driver.attribute(&id, "resource-id").await?),
            text: non_empty(driver.attribute(&id, "text").await?),
            content_desc: non_empty(driver.attribute(&id, "content-desc").await?),
            bounds: driver.rect(&id).await.unwrap_or_default(),
        };
        if include_anonymous || !element.is_anonymous() {
            out.push(element);
        }
    }
    out.sort_by_key(|e| (e.bounds.y, e.bounds.x));
    Ok(out)
}

/// Print-ready listing, one element per line.
pub fn render(elements: &[InspectedElement]) -> String {
    elements
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{:>3}. {e}\n", i + 1))
        .collect()
}

/// Save the raw hierarchy XML.
pub async fn save_page_source(driver: &dyn AutomationDriver, path: &Path) -> Result<usize, AutomationError> {
    let source = driver.page_source().await?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, &source).await?;
    info!("UI hierarchy saved to {} ({} bytes)", path.display(), source.len());
    Ok(source.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{MockDriver, MockNode};

    fn screen() -> MockDriver {
        let driver = MockDriver::new();
        driver.add(
            MockNode::new("android.widget.FrameLayout")
                .at(0, 0, 1080, 2400)
                .child(MockNode::text_view("Chats").id("com.whatsapp:id/title").at(40, 300, 200, 60))
                .child(MockNode::new("android.widget.ImageButton").desc("Search").at(900, 120, 100, 100))
                .child(MockNode::text_view("Gone").at(0, 0, 10, 10).hidden()),
        );
        driver
    }

    #[tokio::test]
    async fn lists_labelled_visible_elements_top_down() {
        let driver = screen();
        let elements = visible_elements(&driver, false).await.unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0].content_desc.as_deref(), Some("Search"));
        assert_eq!(elements[1].resource_id.as_deref(), Some("com.whatsapp:id/title"));

        let listing = render(&elements);
        assert!(listing.contains("  1. ImageButton"));
        assert!(listing.contains("text=\"Chats\""));
    }

    #[tokio::test]
    async fn anonymous_elements_on_request() {
        let driver = screen();
        let elements = visible_elements(&driver, true).await.unwrap();
        assert_eq!(elements.len(), 3);
        assert!(elements[0].is_anonymous());
    }

    #[tokio::test]
    async fn writes_page_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dumps/ui.xml");
        let bytes = save_page_source(&screen(), &path).await.unwrap();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written.len(), bytes);
        assert!(written.contains("com.whatsapp:id/title"));
    }
}
