mod search_tests;
mod send_tests;
mod session_tests;

use crate::app::{AppProfile, Messenger};
use crate::device::{builtin_profiles, DEFAULT_PROFILE};
use crate::driver::{MockDriver, MockNode};
use crate::pacing::Pacing;
use std::sync::Arc;

// Initialize tracing for tests
#[allow(dead_code)]
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};
    let _ = fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()))
        .with_target(true)
        .with_test_writer()
        .try_init();
}

pub(crate) fn rid(name: &str) -> String {
    format!("com.whatsapp:id/{name}")
}

/// Chat list with the search widgets, plus the chat screen widgets so a
/// conversation opened from the results can be written to.
pub(crate) fn home_screen() -> MockDriver {
    let driver = MockDriver::new();
    driver.add(MockNode::text_view("WhatsApp").at(40, 120, 300, 80));
    driver.add(
        MockNode::new("android.widget.ImageButton")
            .id(rid("menuitem_search"))
            .at(900, 120, 100, 100),
    );
    add_chat_screen(&driver);
    driver
}

pub(crate) fn add_chat_screen(driver: &MockDriver) {
    driver.add(
        MockNode::new("android.widget.EditText")
            .id(rid("search_src_text"))
            .at(0, 200, 1080, 100),
    );
    driver.add(
        MockNode::new("android.widget.EditText")
            .id(rid("entry"))
            .at(0, 2250, 840, 100),
    );
    driver.add(
        MockNode::new("android.widget.ImageButton")
            .id(rid("attach"))
            .at(850, 2250, 80, 100),
    );
    driver.add(
        MockNode::new("android.widget.ImageButton")
            .id(rid("send"))
            .at(950, 2250, 100, 100),
    );
    driver.add(MockNode::text_view("Gallery").at(100, 1800, 200, 60));
}

fn section(title: &str, y: i64) -> MockNode {
    MockNode::text_view(title).id(rid("title")).at(0, y, 1080, 60)
}

fn row(name: &str, y: i64) -> MockNode {
    MockNode::new("android.widget.RelativeLayout")
        .id(rid("contact_row_container"))
        .at(0, y, 1080, 150)
        .child(
            MockNode::text_view(name)
                .id(rid("conversations_row_contact_name"))
                .at(200, y + 20, 600, 50),
        )
}

/// Typing `query` shows a `Chats` section holding one row per name.
pub(crate) fn with_chats(driver: &MockDriver, query: &str, names: &[&str]) {
    let mut nodes = vec![section("Chats", 300)];
    for (i, name) in names.iter().enumerate() {
        nodes.push(row(name, 400 + 160 * i as i64));
    }
    driver.reveal_on_text(query, nodes);
}

/// Typing `query` shows only the `Messages` section.
pub(crate) fn with_messages_only(driver: &MockDriver, query: &str) {
    driver.reveal_on_text(
        query,
        vec![
            section("Messages", 300),
            MockNode::text_view(format!("... {query} ...")).at(200, 400, 600, 50),
        ],
    );
}

/// Typing `query` shows the bare "No results" text.
pub(crate) fn with_no_results(driver: &MockDriver, query: &str) {
    driver.reveal_on_text(
        query,
        vec![MockNode::text_view(format!("No results found for '{query}'")).at(100, 600, 880, 60)],
    );
}

pub(crate) fn app() -> Arc<AppProfile> {
    Arc::new(AppProfile::default())
}

pub(crate) fn default_device() -> Arc<crate::device::DeviceProfile> {
    Arc::new(builtin_profiles()[DEFAULT_PROFILE].clone())
}

pub(crate) fn messenger_with(driver: &MockDriver, pace: Pacing) -> Messenger {
    Messenger::new(Arc::new(driver.clone()), app(), default_device(), pace)
}

pub(crate) fn messenger(driver: &MockDriver) -> Messenger {
    messenger_with(driver, Pacing::immediate())
}
