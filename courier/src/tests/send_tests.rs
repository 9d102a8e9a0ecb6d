//! Sending into an open conversation

use super::{home_screen, messenger, rid};
use crate::driver::{MockAction, MockDriver, MockNode};
use crate::AutomationError;

#[tokio::test]
async fn text_goes_through_mobile_type_then_send() {
    let driver = home_screen();

    messenger(&driver).send_text("@SunnyRiver88 hello").await.unwrap();

    let actions = driver.actions();
    assert!(actions.contains(&MockAction::Click(rid("entry"))));
    assert!(actions.contains(&MockAction::Clear(rid("entry"))));
    assert_eq!(driver.typed(), vec!["@SunnyRiver88 hello".to_string()]);
    assert_eq!(driver.clicked().last(), Some(&rid("send")));
}

#[tokio::test]
async fn text_falls_back_to_send_keys() {
    let driver = home_screen();
    driver.fail_command("mobile", 1);

    messenger(&driver).send_text("hello").await.unwrap();

    assert!(driver
        .actions()
        .contains(&MockAction::SendKeys("hello".to_string())));
    assert_eq!(driver.clicked().last(), Some(&rid("send")));
}

#[tokio::test]
async fn missing_entry_field_is_not_found() {
    let driver = MockDriver::new();
    driver.add(MockNode::text_view("WhatsApp"));

    let err = messenger(&driver).send_text("hello").await.unwrap_err();

    assert!(matches!(err, AutomationError::ElementNotFound(m) if m.contains("message entry")));
}

#[tokio::test]
async fn photo_is_picked_captioned_and_sent() {
    let driver = home_screen();

    messenger(&driver)
        .send_with_photo("@SunnyRiver88 hello")
        .await
        .unwrap();

    let actions = driver.actions();
    let clicked = driver.clicked();
    assert!(clicked.contains(&rid("attach")));
    assert!(clicked.contains(&"Gallery".to_string()));
    // default profile: first thumbnail, caption under the centre, send button
    let taps: Vec<&MockAction> = actions
        .iter()
        .filter(|a| matches!(a, MockAction::Tap(..)))
        .collect();
    assert_eq!(
        taps,
        vec![
            &MockAction::Tap(180, 1350),
            &MockAction::Tap(540, 2330),
            &MockAction::Tap(990, 2310)
        ]
    );
    assert_eq!(driver.typed(), vec!["@SunnyRiver88 hello".to_string()]);
}

#[tokio::test]
async fn photo_goes_out_even_when_the_caption_cannot_be_typed() {
    let driver = home_screen();
    driver.fail_command("mobile", 1);

    messenger(&driver).send_with_photo("hello").await.unwrap();

    assert!(driver.typed().is_empty());
    assert_eq!(driver.actions().last(), Some(&MockAction::Tap(990, 2310)));
}

#[tokio::test]
async fn photo_without_chat_screen_fails_fast() {
    let driver = MockDriver::new();
    driver.add(MockNode::text_view("WhatsApp"));

    let err = messenger(&driver).send_with_photo("hello").await.unwrap_err();

    assert!(matches!(err, AutomationError::ElementNotFound(m) if m.contains("attach button")));
    assert!(driver.actions().is_empty());
}

#[tokio::test]
async fn dead_session_while_sending_is_reported_as_such() {
    let driver = home_screen();
    driver.kill();

    let err = messenger(&driver).send_text("hello").await.unwrap_err();

    assert!(err.is_session_fault());
}
