//! A day's run through the public API: settings, list selection, the
//! campaign on a mock handset, then pruning the list with today's logs.

use chrono::TimeZone;
use courier::driver::{DriverFactory, MockConnector, MockDriver, MockNode};
use courier::journal::{gmt7, read_daily_message};
use courier::prune::{prune_file, LogKind};
use courier::targets::load_chat_list;
use courier::{Campaign, ChatStatus, Journal, Selection, Session, Settings};
use std::fs;
use std::sync::Arc;

fn handset(_: usize) -> MockDriver {
    let id = |name: &str| format!("com.whatsapp:id/{name}");
    let driver = MockDriver::new();
    driver.add(MockNode::text_view("WhatsApp").at(40, 120, 300, 80));
    driver.add(MockNode::new("android.widget.ImageButton").id(id("menuitem_search")).at(900, 120, 100, 100));
    driver.add(MockNode::new("android.widget.EditText").id(id("search_src_text")).at(0, 200, 1080, 100));
    driver.add(MockNode::new("android.widget.EditText").id(id("entry")).at(0, 2250, 840, 100));
    driver.add(MockNode::new("android.widget.ImageButton").id(id("send")).at(950, 2250, 100, 100));
    for name in ["SunnyRiver88", "Family Group"] {
        driver.reveal_on_text(
            name,
            vec![
                MockNode::text_view("Chats").id(id("title")).at(0, 300, 1080, 60),
                MockNode::new("android.widget.RelativeLayout")
                    .id(id("contact_row_container"))
                    .at(0, 400, 1080, 150)
                    .child(
                        MockNode::text_view(name)
                            .id(id("conversations_row_contact_name"))
                            .at(200, 420, 600, 50),
                    ),
            ],
        );
    }
    driver.reveal_on_text(
        "9779800000000",
        vec![MockNode::text_view("No results found for '9779800000000'").at(100, 600, 880, 60)],
    );
    driver
}

#[tokio::test]
async fn selected_rows_are_sent_logged_and_pruned() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir(root.join("txt")).unwrap();
    fs::write(
        root.join("txt/chat_name.txt"),
        "  - Row 1: NepalWin🇳🇵Old Friend\n  - Row 2: NepalWin🇳🇵SunnyRiver88\n  - Row 3: NepalWin🇳🇵9779800000000\n  - Row 4: Family Group\n",
    )
    .unwrap();
    fs::write(root.join("txt/daily_message.txt"), "  Good morning!\n").unwrap();

    let yaml = format!(
        "pace: 0.0\npaths:\n  data_dir: {root}/txt\n  chat_list: {root}/txt/chat_name.txt\n  message: {root}/txt/daily_message.txt\n  photo_dir: {root}/daily_photos\n",
        root = root.display()
    );
    let settings = Settings::from_yaml(&yaml).unwrap();

    let entries = load_chat_list(&settings.paths.chat_list).unwrap();
    assert_eq!(entries.len(), 4);
    let selection = Selection::from_bounds(Some(2), None, None).unwrap();
    let selected = selection.apply(&entries).unwrap();
    assert_eq!(selected.len(), 3);
    let message = read_daily_message(&settings.paths.message).unwrap();
    assert_eq!(message, "Good morning!");

    let connector = Arc::new(MockConnector::new(handset));
    let factory: Arc<dyn DriverFactory> = connector.clone();
    let (_, device) = settings.device_profile(None).unwrap();
    let mut session = Session::start(
        factory,
        Arc::new(settings.app.clone()),
        Arc::new(device),
        settings.pacing(),
    )
    .await
    .unwrap();

    let journal = Journal::with_clock(&settings.paths.data_dir, || {
        gmt7().with_ymd_and_hms(2025, 3, 9, 21, 5, 0).unwrap()
    });
    let report = Campaign::new(message.clone(), settings.campaign_options(), &journal)
        .run(&mut session, selected)
        .await
        .unwrap();
    session.quit().await;

    assert_eq!(report.count(ChatStatus::Sent), 2);
    assert_eq!(report.count(ChatStatus::NotFound), 1);
    let typed = connector.sessions()[0].typed();
    assert!(typed.contains(&"@SunnyRiver88 Good morning!".to_string()));
    assert!(typed.contains(&"@Family Group Good morning!".to_string()));

    let processed = journal.processed_log_path();
    assert_eq!(
        processed.file_name().unwrap().to_string_lossy(),
        "processed_chats_2025-03-09.txt"
    );
    let (cleaned, pruned) = prune_file(
        &settings.paths.chat_list,
        &processed,
        LogKind::Processed,
        None,
        false,
    )
    .unwrap();
    assert_eq!(pruned.removed, 3);
    assert_eq!(
        fs::read_to_string(cleaned).unwrap(),
        "  - Row 1: NepalWin🇳🇵Old Friend\n"
    );
}
