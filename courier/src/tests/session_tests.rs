//! Session start and recovery with mock sessions

use super::{app, default_device, home_screen};
use crate::driver::{keycode, DriverFactory, MockAction, MockConnector, MockDriver};
use crate::pacing::Pacing;
use crate::session::Session;
use crate::AutomationError;
use std::sync::Arc;

fn connector(build: impl Fn(usize) -> MockDriver + Send + Sync + 'static) -> Arc<MockConnector> {
    Arc::new(MockConnector::new(build))
}

async fn start(connector: &Arc<MockConnector>) -> Result<Session, AutomationError> {
    let factory: Arc<dyn DriverFactory> = connector.clone();
    Session::start(factory, app(), default_device(), Pacing::immediate()).await
}

#[tokio::test]
async fn start_wakes_the_device_and_opens_the_app() {
    let connector = connector(|_| home_screen());

    let session = start(&connector).await.unwrap();

    assert!(session.is_alive().await);
    assert_eq!(connector.connects(), 1);
    let actions = connector.sessions()[0].actions();
    assert_eq!(actions.first(), Some(&MockAction::Key(keycode::WAKEUP)));
    assert!(actions.contains(&MockAction::ActivateApp("com.whatsapp".to_string())));
}

#[tokio::test]
async fn start_gives_up_when_the_chat_list_never_shows() {
    let connector = connector(|_| MockDriver::new());

    let err = start(&connector).await.unwrap_err();

    assert!(matches!(err, AutomationError::AppNotReady(_)));
    let driver = &connector.sessions()[0];
    assert_eq!(driver.actions().last(), Some(&MockAction::Quit));
    let launches = driver
        .actions()
        .iter()
        .filter(|a| matches!(a, MockAction::StartActivity(_)))
        .count();
    assert_eq!(launches, 3);
}

#[tokio::test]
async fn recovery_replaces_a_dead_session() {
    let connector = connector(|_| home_screen());
    let mut session = start(&connector).await.unwrap();
    connector.sessions()[0].kill();
    assert!(!session.is_alive().await);

    session.recover(3).await.unwrap();

    assert!(session.is_alive().await);
    assert_eq!(session.recoveries(), 1);
    assert_eq!(connector.connects(), 2);
}

#[tokio::test]
async fn recovery_survives_refused_connects() {
    let connector = connector(|_| home_screen());
    let mut session = start(&connector).await.unwrap();
    connector.fail_next(2);

    session.recover(3).await.unwrap();

    assert_eq!(connector.connects(), 4);
    assert!(session.is_alive().await);
}

#[tokio::test]
async fn dead_session_is_quit_once_across_attempts() {
    let connector = connector(|_| home_screen());
    let mut session = start(&connector).await.unwrap();
    connector.fail_next(2);

    session.recover(3).await.unwrap();

    let quits = connector.sessions()[0]
        .actions()
        .iter()
        .filter(|a| **a == MockAction::Quit)
        .count();
    assert_eq!(quits, 1);
}

#[tokio::test]
async fn recovery_discards_sessions_where_the_app_will_not_open() {
    let connector = connector(|n| if n == 1 { MockDriver::new() } else { home_screen() });
    let mut session = start(&connector).await.unwrap();

    session.recover(2).await.unwrap();

    let sessions = connector.sessions();
    assert_eq!(sessions.len(), 3);
    assert_eq!(sessions[1].actions().last(), Some(&MockAction::Quit));
    assert!(!sessions[1].is_alive());
    assert!(sessions[2].is_alive());
}

#[tokio::test]
async fn recovery_reports_session_lost_when_out_of_attempts() {
    let connector = connector(|_| home_screen());
    let mut session = start(&connector).await.unwrap();
    connector.fail_next(10);

    let err = session.recover(2).await.unwrap_err();

    assert!(matches!(err, AutomationError::SessionLost(_)));
    assert_eq!(connector.connects(), 3);
    assert_eq!(session.recoveries(), 0);
}
