//! Composing and sending in an open conversation.

use crate::app::Messenger;
use crate::AutomationError;
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

const ENTRY_SECS: f64 = 2.0;
const SEND_BUTTON_SECS: f64 = 2.0;
const ATTACH_SECS: f64 = 1.5;
const ATTACH_POLL_SECS: f64 = 0.3;
const GALLERY_SECS: f64 = 12.0;

/// Text sent to one chat: `@name message` when mentions are on.
pub fn personalise(message: &str, clean_name: &str, mention: bool) -> String {
    if mention && !clean_name.is_empty() {
        format!("@{clean_name} {message}")
    } else {
        message.to_string()
    }
}

impl Messenger {
    /// Type `message` into the entry field and press send.
    #[instrument(skip_all)]
    pub async fn send_text(&self, message: &str) -> Result<(), AutomationError> {
        let started = Instant::now();
        let entry = self
            .locator(self.app().message_entry(), ENTRY_SECS)
            .wait_clickable(None)
            .await
            .map_err(|e| not_found_unless_fault(e, "message entry field"))?;

        entry.click().await?;
        entry.clear().await?;
        if let Err(e) = self
            .driver()
            .execute_mobile("mobile: type", json!({ "text": message }))
            .await
        {
            if e.is_session_fault() {
                return Err(e);
            }
            debug!("mobile: type failed ({}), falling back to send keys", e);
            entry.send_keys(message).await?;
        }
        debug!("Text entered ({:.2}s)", started.elapsed().as_secs_f64());

        let send = self
            .locator(self.app().send_button(), SEND_BUTTON_SECS)
            .wait_clickable(None)
            .await
            .map_err(|e| not_found_unless_fault(e, "send button"))?;
        send.click().await?;
        self.pace().pause(0.5).await;

        info!("Text sent in {:.2}s", started.elapsed().as_secs_f64());
        Ok(())
    }

    /// Attach the newest gallery photo with `message` as its caption and
    /// send it.
    ///
    /// A missing attach button means the chat screen never loaded, so that
    /// step fails fast. The caption is best effort: the photo still goes out
    /// if typing it fails.
    #[instrument(skip_all)]
    pub async fn send_with_photo(&self, message: &str) -> Result<(), AutomationError> {
        let started = Instant::now();
        let driver = &**self.driver();
        let device = self.device();

        let attach = self
            .locator(self.app().attach_button(), ATTACH_SECS)
            .poll_every(self.pace().duration(ATTACH_POLL_SECS))
            .wait_clickable(None)
            .await
            .map_err(|e| not_found_unless_fault(e, "attach button (chat screen not loaded)"))?;
        attach.click().await?;
        self.pace().adaptive_wait(driver, 0.8, 2.0).await;
        debug!("Attachment menu open");

        let gallery = self
            .locator(self.app().gallery(), GALLERY_SECS)
            .poll_every(self.pace().duration(ATTACH_POLL_SECS))
            .wait_clickable(None)
            .await
            .map_err(|e| not_found_unless_fault(e, "gallery entry"))?;
        gallery.click().await?;
        self.pace().adaptive_wait(driver, 1.0, 2.0).await;
        debug!("Gallery open");

        self.pace().pause(0.2).await;
        let photo = device.photo_select;
        if let Err(e) = self.tap(photo.x, photo.y).await {
            if e.is_session_fault() {
                return Err(e);
            }
            warn!("Photo tap failed ({}), trying the fallback position", e);
            let fallback = device.photo_select_fallback;
            self.tap(fallback.x, fallback.y).await?;
        }
        self.pace().adaptive_wait(driver, 0.7, 1.5).await;
        debug!("Photo selected");

        self.tap_caption_area().await?;

        match driver
            .execute_mobile("mobile: type", json!({ "text": message }))
            .await
        {
            Ok(_) => debug!("Caption typed"),
            Err(e) if e.is_session_fault() => return Err(e),
            Err(e) => warn!("Caption could not be typed, sending the photo without it: {}", e),
        }

        let send = device.send_button;
        self.tap(send.x, send.y).await?;
        self.pace().pause(0.1).await;

        info!("Photo and caption sent in {:.2}s", started.elapsed().as_secs_f64());
        Ok(())
    }

    async fn tap_caption_area(&self) -> Result<(), AutomationError> {
        let driver = &**self.driver();
        let device = self.device();
        self.pace().adaptive_wait(driver, 0.5, 1.2).await;

        let primary = async {
            let size = driver.window_size().await?;
            let x = size.width / 2 + device.caption_x_offset;
            self.tap(x, device.caption_y).await
        };
        match primary.await {
            Ok(()) => {
                self.pace().adaptive_wait(driver, 0.5, 1.0).await;
            }
            Err(e) if e.is_session_fault() => return Err(e),
            Err(e) => {
                warn!("Caption tap failed ({}), trying the fallback position", e);
                let fallback = device.caption_fallback;
                match self.tap(fallback.x, fallback.y).await {
                    Ok(()) => self.pace().pause(0.5).await,
                    Err(e) if e.is_session_fault() => return Err(e),
                    Err(_) => warn!("Caption area not reachable, the photo goes without a caption"),
                }
            }
        }
        Ok(())
    }
}

/// Turn a locator timeout into a plain "not found" naming the widget,
/// keeping session faults as they are.
fn not_found_unless_fault(err: AutomationError, what: &str) -> AutomationError {
    if err.is_session_fault() {
        err
    } else {
        AutomationError::ElementNotFound(format!("{what}: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mention_prefixes_the_clean_name() {
        assert_eq!(personalise("hello", "SunnyRiver88", true), "@SunnyRiver88 hello");
        assert_eq!(personalise("hello", "SunnyRiver88", false), "hello");
        assert_eq!(personalise("hello", "", true), "hello");
    }

    #[test]
    fn locator_timeouts_become_not_found() {
        let err = not_found_unless_fault(AutomationError::Timeout("x".into()), "send button");
        assert!(matches!(err, AutomationError::ElementNotFound(m) if m.starts_with("send button")));

        let err = not_found_unless_fault(AutomationError::SessionLost("gone".into()), "send button");
        assert!(matches!(err, AutomationError::SessionLost(_)));
    }
}
