//! In-memory stand-in for an automation session.
//!
//! The mock holds a flat list of nodes with parent links, evaluates the
//! structured selectors (`Id`, `Text`, `Where`, ...) directly, records every
//! action, and can be told to die to exercise session recovery. Raw XPath,
//! UiAutomator and CSS selectors are rejected because nothing here can
//! evaluate them. Scripts return queued answers instead of running.

use super::{AutomationDriver, DriverFactory, Rect, WindowSize};
use crate::selector::Query;
use crate::{AutomationError, Selector};
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A UI node in the mock tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MockNode {
    pub class: String,
    pub resource_id: Option<String>,
    pub text: Option<String>,
    pub content_desc: Option<String>,
    pub rect: Rect,
    pub displayed: bool,
    pub enabled: bool,
    /// Any other attribute, such as a web element's `title`
    pub extra: Vec<(String, String)>,
    pub children: Vec<MockNode>,
}

impl MockNode {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            resource_id: None,
            text: None,
            content_desc: None,
            rect: Rect::default(),
            displayed: true,
            enabled: true,
            extra: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn text_view(text: impl Into<String>) -> Self {
        Self::new("android.widget.TextView").text(text)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn desc(mut self, desc: impl Into<String>) -> Self {
        self.content_desc = Some(desc.into());
        self
    }

    pub fn at(mut self, x: i64, y: i64, width: i64, height: i64) -> Self {
        self.rect = Rect { x, y, width, height };
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    pub fn hidden(mut self) -> Self {
        self.displayed = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn child(mut self, child: MockNode) -> Self {
        self.children.push(child);
        self
    }

    fn attribute(&self, name: &str) -> Option<String> {
        match name {
            "class" | "className" => Some(self.class.clone()),
            "resource-id" | "resourceId" => self.resource_id.clone(),
            "text" => self.text.clone(),
            "content-desc" | "contentDescription" => self.content_desc.clone(),
            "displayed" => Some(self.displayed.to_string()),
            "enabled" => Some(self.enabled.to_string()),
            other => self
                .extra
                .iter()
                .find(|(name, _)| name == other)
                .map(|(_, value)| value.clone()),
        }
    }

    fn matches_query(&self, query: &Query) -> bool {
        if let Some(class) = &query.class {
            if class != "*" && *class != self.class {
                return false;
            }
        }
        query
            .conditions
            .iter()
            .all(|c| c.matches(self.attribute(c.attribute()).as_deref()))
    }

    fn label(&self) -> String {
        self.text
            .clone()
            .or_else(|| self.resource_id.clone())
            .or_else(|| self.content_desc.clone())
            .unwrap_or_else(|| self.class.clone())
    }
}

/// Something the automation did to the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockAction {
    Click(String),
    Clear(String),
    SendKeys(String),
    Type(String),
    Tap(i64, i64),
    Key(u32),
    ActivateApp(String),
    StartActivity(String),
    Mobile(String),
    PushFile(String),
    PullFile(String),
    Navigate(String),
    Script(String),
    Quit,
}

#[derive(Debug)]
struct Slot {
    node: MockNode,
    parent: Option<usize>,
    /// Revealed by typed text; removed again by the back key.
    transient: bool,
}

#[derive(Debug)]
struct MockState {
    slots: Vec<Option<Slot>>,
    actions: Vec<MockAction>,
    alive: bool,
    calls_until_death: Option<usize>,
    dying_command: Option<String>,
    window: WindowSize,
    files: HashMap<String, String>,
    reveals: Vec<(String, Vec<MockNode>)>,
    failing_commands: HashMap<String, usize>,
    url: String,
    scripts: VecDeque<QueuedScript>,
}

/// Answer for the next script containing `trigger`.
#[derive(Debug)]
struct QueuedScript {
    trigger: String,
    result: Value,
    adds: Vec<MockNode>,
}

/// In-memory [`AutomationDriver`].
#[derive(Debug, Clone)]
pub struct MockDriver {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                slots: Vec::new(),
                actions: Vec::new(),
                alive: true,
                calls_until_death: None,
                dying_command: None,
                window: WindowSize {
                    width: 1080,
                    height: 2400,
                },
                files: HashMap::new(),
                reveals: Vec::new(),
                failing_commands: HashMap::new(),
                url: "about:blank".to_string(),
                scripts: VecDeque::new(),
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the state from the others
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Add a top-level node (with its children) and return its id.
    pub fn add(&self, node: MockNode) -> String {
        let mut state = self.lock();
        insert_tree(&mut state, node, None, false).to_string()
    }

    /// When `text` is typed anywhere, add `nodes` to the tree until the next
    /// back key press.
    pub fn reveal_on_text(&self, text: impl Into<String>, nodes: Vec<MockNode>) {
        self.lock().reveals.push((text.into(), nodes));
    }

    /// The next script whose source contains `trigger` returns `result` and
    /// adds `nodes` to the tree for good. Unanswered scripts return null.
    pub fn answer_script(&self, trigger: impl Into<String>, result: Value, nodes: Vec<MockNode>) {
        self.lock().scripts.push_back(QueuedScript {
            trigger: trigger.into(),
            result,
            adds: nodes,
        });
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.lock().url = url.into();
    }

    /// Sources of every script run, oldest first.
    pub fn scripts(&self) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                MockAction::Script(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn set_window(&self, width: i64, height: i64) {
        self.lock().window = WindowSize { width, height };
    }

    /// Every call from now on fails as a lost session.
    pub fn kill(&self) {
        self.lock().alive = false;
    }

    /// Let `calls` more driver calls succeed, then die.
    pub fn die_after(&self, calls: usize) {
        self.lock().calls_until_death = Some(calls);
    }

    /// Die on the next call of a named command (see [`Self::fail_command`]
    /// for the names), which then fails as a lost session.
    pub fn die_on(&self, command: &str) {
        self.lock().dying_command = Some(command.to_string());
    }

    pub fn is_alive(&self) -> bool {
        self.lock().alive
    }

    /// Make the next `times` calls of a named command fail with a driver error.
    /// Names are the driver method names (`click`, `send_keys`, `tap`,
    /// `press_keycode`, `push_file`, `execute_script`, ...), with `mobile`
    /// for every `execute_mobile` call.
    pub fn fail_command(&self, command: &str, times: usize) {
        self.lock().failing_commands.insert(command.to_string(), times);
    }

    pub fn actions(&self) -> Vec<MockAction> {
        self.lock().actions.clone()
    }

    pub fn files(&self) -> HashMap<String, String> {
        self.lock().files.clone()
    }

    /// Texts typed through either element send-keys or `mobile: type`.
    pub fn typed(&self) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                MockAction::SendKeys(t) | MockAction::Type(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clicked(&self) -> Vec<String> {
        self.lock()
            .actions
            .iter()
            .filter_map(|a| match a {
                MockAction::Click(label) => Some(label.clone()),
                _ => None,
            })
            .collect()
    }

    fn enter(&self, command: &str) -> Result<std::sync::MutexGuard<'_, MockState>, AutomationError> {
        let mut state = self.lock();
        if let Some(remaining) = state.calls_until_death {
            if remaining == 0 {
                state.alive = false;
                state.calls_until_death = None;
            } else {
                state.calls_until_death = Some(remaining - 1);
            }
        }
        if state.dying_command.as_deref() == Some(command) {
            state.alive = false;
            state.dying_command = None;
        }
        if !state.alive {
            return Err(AutomationError::SessionLost(format!(
                "mock session terminated ({command})"
            )));
        }
        if let Some(left) = state.failing_commands.get_mut(command) {
            if *left > 0 {
                *left -= 1;
                return Err(AutomationError::Driver {
                    code: "unknown error".to_string(),
                    message: format!("{command} failed on purpose"),
                });
            }
        }
        Ok(state)
    }
}

fn insert_tree(state: &mut MockState, mut node: MockNode, parent: Option<usize>, transient: bool) -> usize {
    let children = std::mem::take(&mut node.children);
    let index = state.slots.len();
    state.slots.push(Some(Slot {
        node,
        parent,
        transient,
    }));
    for child in children {
        insert_tree(state, child, Some(index), transient);
    }
    index
}

fn slot<'a>(state: &'a MockState, id: &str) -> Result<&'a Slot, AutomationError> {
    id.parse::<usize>()
        .ok()
        .and_then(|i| state.slots.get(i))
        .and_then(Option::as_ref)
        .ok_or_else(|| AutomationError::ElementNotFound(format!("stale element reference: {id}")))
}

fn is_descendant(state: &MockState, mut index: usize, ancestor: usize) -> bool {
    while let Some(parent) = state.slots[index].as_ref().and_then(|s| s.parent) {
        if parent == ancestor {
            return true;
        }
        index = parent;
    }
    false
}

fn node_matches(node: &MockNode, selector: &Selector) -> Result<bool, AutomationError> {
    Ok(match selector {
        Selector::Id(v) => node.resource_id.as_deref() == Some(v.as_str()),
        Selector::AccessibilityId(v) => node.content_desc.as_deref() == Some(v.as_str()),
        Selector::ClassName(v) => node.class == *v,
        Selector::Text(v) => node.text.as_deref() == Some(v.as_str()),
        Selector::Where(q) => node.matches_query(q),
        Selector::Any(alts) => {
            for alt in alts {
                if node_matches(node, alt)? {
                    return Ok(true);
                }
            }
            false
        }
        Selector::XPath(_) | Selector::UiAutomator(_) | Selector::Css(_) => {
            return Err(AutomationError::UnsupportedOperation(format!(
                "mock driver cannot evaluate {selector}"
            )))
        }
    })
}

fn apply_reveals(state: &mut MockState, typed: &str) {
    let pending: Vec<MockNode> = state
        .reveals
        .iter()
        .filter(|(trigger, _)| trigger == typed)
        .flat_map(|(_, nodes)| nodes.clone())
        .collect();
    for node in pending {
        insert_tree(state, node, None, true);
    }
}

#[async_trait::async_trait]
impl AutomationDriver for MockDriver {
    async fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&str>,
    ) -> Result<Vec<String>, AutomationError> {
        let state = self.enter("find_elements")?;
        let root_index = match root {
            Some(id) => {
                slot(&state, id)?;
                id.parse::<usize>().ok()
            }
            None => None,
        };
        let mut found = Vec::new();
        for (index, entry) in state.slots.iter().enumerate() {
            let Some(entry) = entry else { continue };
            if let Some(root_index) = root_index {
                if !is_descendant(&state, index, root_index) {
                    continue;
                }
            }
            if node_matches(&entry.node, selector)? {
                found.push(index.to_string());
            }
        }
        Ok(found)
    }

    async fn click(&self, element: &str) -> Result<(), AutomationError> {
        let mut state = self.enter("click")?;
        let label = slot(&state, element)?.node.label();
        state.actions.push(MockAction::Click(label));
        Ok(())
    }

    async fn clear(&self, element: &str) -> Result<(), AutomationError> {
        let mut state = self.enter("clear")?;
        let label = slot(&state, element)?.node.label();
        state.actions.push(MockAction::Clear(label));
        Ok(())
    }

    async fn send_keys(&self, element: &str, text: &str) -> Result<(), AutomationError> {
        let mut state = self.enter("send_keys")?;
        slot(&state, element)?;
        state.actions.push(MockAction::SendKeys(text.to_string()));
        apply_reveals(&mut state, text);
        Ok(())
    }

    async fn text(&self, element: &str) -> Result<String, AutomationError> {
        let state = self.enter("text")?;
        Ok(slot(&state, element)?.node.text.clone().unwrap_or_default())
    }

    async fn attribute(
        &self,
        element: &str,
        name: &str,
    ) -> Result<Option<String>, AutomationError> {
        let state = self.enter("attribute")?;
        Ok(slot(&state, element)?.node.attribute(name))
    }

    async fn is_displayed(&self, element: &str) -> Result<bool, AutomationError> {
        let state = self.enter("is_displayed")?;
        Ok(slot(&state, element)?.node.displayed)
    }

    async fn is_enabled(&self, element: &str) -> Result<bool, AutomationError> {
        let state = self.enter("is_enabled")?;
        Ok(slot(&state, element)?.node.enabled)
    }

    async fn rect(&self, element: &str) -> Result<Rect, AutomationError> {
        let state = self.enter("rect")?;
        Ok(slot(&state, element)?.node.rect)
    }

    async fn window_size(&self) -> Result<WindowSize, AutomationError> {
        let state = self.enter("window_size")?;
        Ok(state.window)
    }

    async fn press_keycode(&self, keycode: u32) -> Result<(), AutomationError> {
        let mut state = self.enter("press_keycode")?;
        state.actions.push(MockAction::Key(keycode));
        if keycode == super::keycode::BACK {
            for entry in state.slots.iter_mut() {
                if entry.as_ref().is_some_and(|s| s.transient) {
                    *entry = None;
                }
            }
        }
        Ok(())
    }

    async fn tap(&self, x: i64, y: i64) -> Result<(), AutomationError> {
        let mut state = self.enter("tap")?;
        state.actions.push(MockAction::Tap(x, y));
        Ok(())
    }

    async fn execute_mobile(&self, command: &str, args: Value) -> Result<Value, AutomationError> {
        let mut state = self.enter("mobile")?;
        if command == "mobile: type" {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            state.actions.push(MockAction::Type(text.clone()));
            apply_reveals(&mut state, &text);
        } else {
            state.actions.push(MockAction::Mobile(command.to_string()));
        }
        Ok(json!(null))
    }

    async fn activate_app(&self, package: &str) -> Result<(), AutomationError> {
        let mut state = self.enter("activate_app")?;
        state.actions.push(MockAction::ActivateApp(package.to_string()));
        Ok(())
    }

    async fn start_activity(&self, package: &str, activity: &str) -> Result<(), AutomationError> {
        let mut state = self.enter("start_activity")?;
        state
            .actions
            .push(MockAction::StartActivity(format!("{package}/{activity}")));
        Ok(())
    }

    async fn push_file(&self, device_path: &str, base64_data: &str) -> Result<(), AutomationError> {
        let mut state = self.enter("push_file")?;
        state.actions.push(MockAction::PushFile(device_path.to_string()));
        state
            .files
            .insert(device_path.to_string(), base64_data.to_string());
        Ok(())
    }

    async fn pull_file(&self, device_path: &str) -> Result<String, AutomationError> {
        let mut state = self.enter("pull_file")?;
        state.actions.push(MockAction::PullFile(device_path.to_string()));
        state
            .files
            .get(device_path)
            .cloned()
            .ok_or_else(|| AutomationError::Driver {
                code: "unknown error".to_string(),
                message: format!("remote file {device_path} does not exist"),
            })
    }

    async fn page_source(&self) -> Result<String, AutomationError> {
        let state = self.enter("page_source")?;
        let mut out = String::from("<hierarchy>\n");
        for entry in state.slots.iter().flatten() {
            out.push_str(&format!(
                "  <{} resource-id=\"{}\" text=\"{}\"/>\n",
                entry.node.class,
                entry.node.resource_id.as_deref().unwrap_or(""),
                entry.node.text.as_deref().unwrap_or("")
            ));
        }
        out.push_str("</hierarchy>\n");
        Ok(out)
    }

    async fn navigate(&self, url: &str) -> Result<(), AutomationError> {
        let mut state = self.enter("navigate")?;
        state.actions.push(MockAction::Navigate(url.to_string()));
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, AutomationError> {
        let state = self.enter("current_url")?;
        Ok(state.url.clone())
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, AutomationError> {
        let mut state = self.enter("execute_script")?;
        for arg in &args {
            if let Some(id) = arg.get("ELEMENT").and_then(Value::as_str) {
                slot(&state, id)?;
            }
        }
        state.actions.push(MockAction::Script(script.to_string()));
        let queued = state
            .scripts
            .iter()
            .position(|q| script.contains(&q.trigger))
            .and_then(|i| state.scripts.remove(i));
        let Some(queued) = queued else {
            return Ok(Value::Null);
        };
        for node in queued.adds {
            insert_tree(&mut state, node, None, false);
        }
        Ok(queued.result)
    }

    async fn quit(&self) -> Result<(), AutomationError> {
        let mut state = self.lock();
        state.actions.push(MockAction::Quit);
        state.alive = false;
        Ok(())
    }
}

type Build = dyn Fn(usize) -> MockDriver + Send + Sync;

/// [`DriverFactory`] handing out mock sessions built by a closure. The
/// closure receives the 0-based connect number.
pub struct MockConnector {
    build: Box<Build>,
    connects: AtomicUsize,
    failures_left: AtomicUsize,
    created: Mutex<Vec<MockDriver>>,
}

impl MockConnector {
    pub fn new(build: impl Fn(usize) -> MockDriver + Send + Sync + 'static) -> Self {
        Self {
            build: Box::new(build),
            connects: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            created: Mutex::new(Vec::new()),
        }
    }

    /// Make the next `times` connects fail with `SessionNotCreated`.
    pub fn fail_next(&self, times: usize) {
        self.failures_left.store(times, Ordering::SeqCst);
    }

    /// Number of connect attempts so far, failed ones included.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Every session handed out, oldest first.
    pub fn sessions(&self) -> Vec<MockDriver> {
        self.created
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }
}

#[async_trait::async_trait]
impl DriverFactory for MockConnector {
    async fn connect(&self) -> Result<Arc<dyn AutomationDriver>, AutomationError> {
        let attempt = self.connects.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AutomationError::SessionNotCreated(format!(
                "mock connect {attempt} refused"
            )));
        }
        let driver = (self.build)(attempt);
        self.created
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(driver.clone());
        Ok(Arc::new(driver))
    }

    fn describe(&self) -> String {
        "mock".to_string()
    }
}
