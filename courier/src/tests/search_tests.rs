//! Search flow against the mock chat list

use super::{home_screen, messenger, messenger_with, rid, with_chats, with_messages_only, with_no_results};
use crate::driver::{keycode, MockAction, MockDriver, MockNode};
use crate::pacing::Pacing;
use crate::search::{NotFoundReason, SearchOutcome};

#[tokio::test]
async fn opens_the_only_chat_row() {
    let driver = home_screen();
    with_chats(&driver, "SunnyRiver88", &["SunnyRiver88"]);

    let outcome = messenger(&driver).search_and_open("SunnyRiver88").await.unwrap();

    assert_eq!(
        outcome,
        SearchOutcome::Opened {
            matched: "SunnyRiver88".to_string()
        }
    );
    let clicked = driver.clicked();
    assert!(clicked.contains(&rid("menuitem_search")));
    assert_eq!(clicked.last(), Some(&rid("contact_row_container")));
    assert_eq!(driver.typed(), vec!["SunnyRiver88".to_string()]);
    // The chat stays open for sending
    assert!(!driver.actions().contains(&MockAction::Key(keycode::BACK)));
}

#[tokio::test]
async fn lone_row_is_opened_without_reading_its_name() {
    let driver = home_screen();
    // A saved contact shows its display name, not the searched number
    with_chats(&driver, "9779812345678", &["Hari Bahadur"]);

    let outcome = messenger(&driver).search_and_open("9779812345678").await.unwrap();

    assert_eq!(
        outcome,
        SearchOutcome::Opened {
            matched: "9779812345678".to_string()
        }
    );
    assert_eq!(driver.clicked().last(), Some(&rid("contact_row_container")));
}

#[tokio::test]
async fn picks_the_row_whose_name_matches() {
    let driver = home_screen();
    with_chats(&driver, "sunny", &["Family Group", "SunnyRiver88"]);

    let outcome = messenger(&driver).search_and_open("sunny").await.unwrap();

    assert_eq!(
        outcome,
        SearchOutcome::Opened {
            matched: "SunnyRiver88".to_string()
        }
    );
}

#[tokio::test]
async fn rows_naming_other_chats_are_not_opened() {
    let driver = home_screen();
    with_chats(&driver, "sunny", &["Family Group", "Work"]);

    let outcome = messenger(&driver).search_and_open("sunny").await.unwrap();

    assert_eq!(outcome, SearchOutcome::NotFound(NotFoundReason::Timeout));
    assert!(!driver.clicked().contains(&rid("contact_row_container")));
}

#[tokio::test]
async fn rows_below_the_contacts_section_are_ignored() {
    let driver = home_screen();
    driver.reveal_on_text(
        "Ghost",
        vec![
            MockNode::text_view("Chats").id(rid("title")).at(0, 300, 1080, 60),
            MockNode::text_view("Contacts").id(rid("title")).at(0, 380, 1080, 60),
            MockNode::new("android.widget.RelativeLayout")
                .id(rid("contact_row_container"))
                .at(0, 460, 1080, 150),
        ],
    );

    let outcome = messenger(&driver).search_and_open("Ghost").await.unwrap();

    assert!(!outcome.is_opened());
    assert!(!driver.clicked().contains(&rid("contact_row_container")));
}

#[tokio::test]
async fn no_results_text_means_not_found_and_leaves_search() {
    let driver = home_screen();
    with_no_results(&driver, "Ghost");

    let outcome = messenger(&driver).search_and_open("Ghost").await.unwrap();

    assert_eq!(outcome, SearchOutcome::NotFound(NotFoundReason::NoResults));
    assert_eq!(driver.actions().last(), Some(&MockAction::Key(keycode::BACK)));
}

#[tokio::test]
async fn silence_until_the_budget_runs_out_is_a_timeout() {
    let driver = home_screen();

    let outcome = messenger(&driver).search_and_open("Nobody").await.unwrap();

    assert_eq!(outcome, SearchOutcome::NotFound(NotFoundReason::Timeout));
}

#[tokio::test(start_paused = true)]
async fn repeated_message_only_results_give_up_early() {
    let driver = home_screen();
    with_messages_only(&driver, "hello");

    let started = tokio::time::Instant::now();
    let outcome = messenger_with(&driver, Pacing::default())
        .search_and_open("hello")
        .await
        .unwrap();

    assert_eq!(
        outcome,
        SearchOutcome::NotFound(NotFoundReason::ManyMessageOnlyResults)
    );
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
}

#[tokio::test]
async fn falls_back_to_taps_and_typing_without_search_widgets() {
    let driver = MockDriver::new();
    driver.add(MockNode::text_view("WhatsApp").at(40, 120, 300, 80));
    with_chats(&driver, "SunnyRiver88", &["SunnyRiver88"]);

    let outcome = messenger(&driver).search_and_open("SunnyRiver88").await.unwrap();

    assert!(outcome.is_opened());
    let actions = driver.actions();
    assert!(actions.contains(&MockAction::Tap(525, 330)));
    assert!(actions.contains(&MockAction::Type("SunnyRiver88".to_string())));
}

#[tokio::test]
async fn dead_session_is_an_error_not_a_miss() {
    let driver = home_screen();
    driver.kill();

    let err = messenger(&driver).search_and_open("SunnyRiver88").await.unwrap_err();

    assert!(err.is_session_fault());
}
