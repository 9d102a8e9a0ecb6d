//! AppiumDriver against a stub WebDriver server.
//!
//! The stub answers the handful of endpoints the driver uses and records
//! every request so the tests can check what went over the wire.

use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::Json;
use axum::Router;
use courier::driver::{
    element_arg, AppiumConnector, BrowserCapabilities, BrowserConnector, Capabilities,
    DriverFactory,
};
use courier::{AutomationError, Selector};
use serde_json::{json, Map, Value};
use std::sync::{Arc, Mutex};

const ELEMENT_KEY: &str = "element-6066-11e4-a23d-7e6bb7a7e3b7";

#[derive(Clone, Default)]
struct Stub {
    requests: Arc<Mutex<Vec<(Method, String, Value)>>>,
}

impl Stub {
    fn requests(&self) -> Vec<(Method, String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    fn find(&self, method: &Method, path: &str) -> Option<Value> {
        self.requests()
            .into_iter()
            .find(|(m, p, _)| m == method && p == path)
            .map(|(_, _, body)| body)
    }
}

fn error(status: StatusCode, code: &str, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(json!({ "value": { "error": code, "message": message } })),
    )
}

fn ok(value: Value) -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "value": value })))
}

async fn handle(
    State(stub): State<Stub>,
    method: Method,
    uri: Uri,
    body: String,
) -> (StatusCode, Json<Value>) {
    let body: Value = serde_json::from_str(&body).unwrap_or(Value::Null);
    let path = uri.path().to_string();
    stub.requests
        .lock()
        .unwrap()
        .push((method.clone(), path.clone(), body.clone()));

    match (method.as_str(), path.as_str()) {
        ("GET", "/status") => ok(json!({
            "ready": true,
            "message": "The server is ready to accept new connections",
            "build": { "version": "2.11.0" }
        })),
        ("POST", "/session") => {
            let udid = body.pointer("/capabilities/alwaysMatch/appium:udid");
            if udid == Some(&json!("offline-device")) {
                return error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "session not created",
                    "Device offline-device was not in the list of connected devices",
                );
            }
            ok(json!({ "sessionId": "s1", "capabilities": {} }))
        }
        ("POST", "/session/s1/elements") => {
            let value = body.get("value").and_then(Value::as_str).unwrap_or_default();
            if value.contains("menuitem_search") {
                let mut w3c = Map::new();
                w3c.insert(ELEMENT_KEY.to_string(), json!("e1"));
                ok(json!([Value::Object(w3c), { "ELEMENT": "e2" }]))
            } else if value.contains("search_src_text") {
                let mut w3c = Map::new();
                w3c.insert(ELEMENT_KEY.to_string(), json!("e3"));
                ok(json!([Value::Object(w3c)]))
            } else {
                error(StatusCode::NOT_FOUND, "no such element", "nothing matched")
            }
        }
        ("GET", "/session/s1/element/e1/displayed") => ok(json!("true")),
        ("GET", "/session/s1/element/e1/rect") => {
            ok(json!({ "x": 900, "y": 120, "width": 100, "height": 100 }))
        }
        ("GET", "/session/s1/element/e1/attribute/content-desc") => ok(Value::Null),
        ("GET", "/session/s1/window/rect") => {
            ok(json!({ "x": 0, "y": 0, "width": 1080, "height": 2400 }))
        }
        ("POST", "/session/s1/actions") | ("DELETE", "/session/s1/actions") => ok(Value::Null),
        ("POST", "/session/s1/appium/device/pull_file") => ok(json!("aGVsbG8=")),
        ("POST", "/session/s1/execute/sync") => {
            if body["script"].as_str().unwrap_or_default().contains("scrollTop") {
                ok(json!([500, 3000, 800]))
            } else {
                ok(Value::Null)
            }
        }
        ("POST", "/session/s1/url") => ok(Value::Null),
        ("GET", "/session/s1/url") => ok(json!("https://web.whatsapp.com/")),
        ("DELETE", "/session/s1") => error(
            StatusCode::NOT_FOUND,
            "invalid session id",
            "A session is either terminated or not started",
        ),
        _ => error(StatusCode::NOT_FOUND, "unknown command", "not stubbed"),
    }
}

async fn serve() -> (String, Stub) {
    let stub = Stub::default();
    let app = Router::new().fallback(handle).with_state(stub.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), stub)
}

fn capabilities(udid: &str) -> Capabilities {
    Capabilities::for_app("com.whatsapp", "com.whatsapp.home.ui.HomeActivity")
        .with_udid(Some(udid.to_string()))
}

#[tokio::test]
async fn session_is_created_with_prefixed_capabilities() {
    let (base, stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();

    let driver = connector.connect().await.unwrap();
    let size = driver.window_size().await.unwrap();

    assert_eq!((size.width, size.height), (1080, 2400));
    let body = stub.find(&Method::POST, "/session").unwrap();
    let caps = &body["capabilities"]["alwaysMatch"];
    assert_eq!(caps["platformName"], "Android");
    assert_eq!(caps["appium:automationName"], "UiAutomator2");
    assert_eq!(caps["appium:udid"], "R58M12ABCDE");
    assert_eq!(caps["appium:appPackage"], "com.whatsapp");
    assert_eq!(caps["appium:noReset"], true);
}

#[tokio::test]
async fn refused_session_is_session_not_created() {
    let (base, _stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("offline-device")).unwrap();

    let err = connector.connect().await.err().unwrap();

    assert!(matches!(err, AutomationError::SessionNotCreated(m) if m.contains("offline-device")));
}

#[tokio::test]
async fn elements_are_found_by_either_reference_key() {
    let (base, stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    let found = driver
        .find_elements(&Selector::Id("com.whatsapp:id/menuitem_search".into()), None)
        .await
        .unwrap();
    assert_eq!(found, vec!["e1".to_string(), "e2".to_string()]);

    let body = stub.find(&Method::POST, "/session/s1/elements").unwrap();
    assert_eq!(body["using"], "id");

    assert!(driver.is_displayed("e1").await.unwrap());
    assert_eq!(driver.rect("e1").await.unwrap().center(), (950, 170));
    assert_eq!(driver.attribute("e1", "content-desc").await.unwrap(), None);
}

#[tokio::test]
async fn w3c_only_references_are_understood() {
    let (base, _stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    let found = driver
        .find_elements(&Selector::Id("com.whatsapp:id/search_src_text".into()), None)
        .await
        .unwrap();

    assert_eq!(found, vec!["e3".to_string()]);
}

#[tokio::test]
async fn no_such_element_is_an_empty_list() {
    let (base, _stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    let found = driver
        .find_elements(&Selector::Text("Chats".into()), None)
        .await
        .unwrap();

    assert!(found.is_empty());
}

#[tokio::test]
async fn alternatives_must_be_expanded_by_the_caller() {
    let (base, _stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    let err = driver
        .find_elements(&Selector::from("text:Chats || text:WhatsApp"), None)
        .await
        .unwrap_err();

    assert!(matches!(err, AutomationError::InvalidSelector(_)));
}

#[tokio::test]
async fn tap_sends_one_pointer_sequence_and_releases_it() {
    let (base, stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    driver.tap(540, 2330).await.unwrap();

    let body = stub.find(&Method::POST, "/session/s1/actions").unwrap();
    let steps = &body["actions"][0]["actions"];
    assert_eq!(steps[0]["x"], 540);
    assert_eq!(steps[0]["y"], 2330);
    assert_eq!(steps[1]["type"], "pointerDown");
    assert!(stub.find(&Method::DELETE, "/session/s1/actions").is_some());
}

#[tokio::test]
async fn mobile_commands_go_through_execute_sync() {
    let (base, stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    driver
        .execute_mobile("mobile: type", json!({ "text": "@SunnyRiver88 hello" }))
        .await
        .unwrap();
    driver
        .start_activity("com.whatsapp", "com.whatsapp.home.ui.HomeActivity")
        .await
        .unwrap();

    let calls: Vec<Value> = stub
        .requests()
        .into_iter()
        .filter(|(_, p, _)| p == "/session/s1/execute/sync")
        .map(|(_, _, body)| body)
        .collect();
    assert_eq!(calls[0]["script"], "mobile: type");
    assert_eq!(calls[0]["args"][0]["text"], "@SunnyRiver88 hello");
    assert_eq!(calls[1]["script"], "mobile: startActivity");
    assert_eq!(
        calls[1]["args"][0]["component"],
        "com.whatsapp/com.whatsapp.home.ui.HomeActivity"
    );
    assert_eq!(driver.pull_file("/sdcard/x.jpg").await.unwrap(), "aGVsbG8=");
}

#[tokio::test]
async fn unknown_endpoints_are_driver_errors_not_session_faults() {
    let (base, _stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    let err = driver.page_source().await.unwrap_err();

    assert!(matches!(err, AutomationError::Driver { ref code, .. } if code == "unknown command"));
    assert!(!err.is_session_fault());
}

#[tokio::test]
async fn quitting_a_terminated_session_is_fine() {
    let (base, _stub) = serve().await;
    let connector = AppiumConnector::new(&base, capabilities("R58M12ABCDE")).unwrap();
    let driver = connector.connect().await.unwrap();

    driver.quit().await.unwrap();
}

#[tokio::test]
async fn server_status_reports_readiness_and_version() {
    let (base, _stub) = serve().await;
    let connector = AppiumConnector::new(&base, Capabilities::default()).unwrap();

    let status = connector.server_status().await.unwrap();

    assert!(status.ready);
    assert_eq!(status.version.as_deref(), Some("2.11.0"));
}

#[tokio::test]
async fn unreachable_server_is_a_session_fault() {
    // Nothing listens on port 9 locally
    let connector = AppiumConnector::local("127.0.0.1", 9, Capabilities::default()).unwrap();

    let err = connector.connect().await.err().unwrap();

    assert!(err.is_session_fault());
}

#[tokio::test]
async fn browser_session_uses_the_given_firefox_profile() {
    let (base, stub) = serve().await;
    let capabilities = BrowserCapabilities::new(
        "firefox",
        Some("/home/hari/.mozilla/firefox/x1y2.NepalWin".into()),
    );
    let connector = BrowserConnector::new(&base, capabilities).unwrap();

    let driver = connector.connect().await.unwrap();
    driver.navigate("https://web.whatsapp.com").await.unwrap();

    assert_eq!(driver.current_url().await.unwrap(), "https://web.whatsapp.com/");
    let caps = &stub.find(&Method::POST, "/session").unwrap()["capabilities"]["alwaysMatch"];
    assert_eq!(caps["browserName"], "firefox");
    assert_eq!(
        caps["moz:firefoxOptions"]["args"],
        json!(["-profile", "/home/hari/.mozilla/firefox/x1y2.NepalWin"])
    );
    assert!(caps.get("platformName").is_none());
    assert_eq!(
        stub.find(&Method::POST, "/session/s1/url").unwrap()["url"],
        "https://web.whatsapp.com"
    );
}

#[tokio::test]
async fn scripts_receive_element_references() {
    let (base, stub) = serve().await;
    let connector = BrowserConnector::new(&base, BrowserCapabilities::default()).unwrap();
    let driver = connector.connect().await.unwrap();

    let position = driver
        .execute_script(
            "const pane = arguments[0]; pane.scrollTop += arguments[1];",
            vec![element_arg("e3"), json!(500)],
        )
        .await
        .unwrap();

    assert_eq!(position, json!([500, 3000, 800]));
    let body = stub.find(&Method::POST, "/session/s1/execute/sync").unwrap();
    assert_eq!(body["args"][0][ELEMENT_KEY], "e3");
    assert_eq!(body["args"][1], 500);
}

#[test]
fn chromium_profiles_go_through_user_data_dir() {
    let body = BrowserCapabilities::new("chromium", Some("/home/hari/.config/chromium".into())).to_w3c();
    let caps = &body["capabilities"]["alwaysMatch"];

    assert_eq!(caps["browserName"], "chrome");
    assert_eq!(
        caps["goog:chromeOptions"]["args"],
        json!(["--user-data-dir=/home/hari/.config/chromium"])
    );
}
