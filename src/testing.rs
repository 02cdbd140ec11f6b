//! Scripted driver and classifier used by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::classifier::Classifier;
use crate::driver::{Driver, DriverResult, ElementHandle};
use crate::error::DriverError;
use crate::types::Selector;

#[derive(Debug, Clone)]
struct FakeElement {
    selector: String,
    visible: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    url: String,
    elements: Vec<FakeElement>,
    unreachable: HashSet<String>,
    stalled: HashSet<String>,
    click_fails: HashSet<String>,
    fill_fails: HashSet<String>,
    keys_fail: bool,
    locate_delay: Duration,
    eval_fails: Vec<String>,
    session_lost: bool,
    extraction: Value,
    calls: Vec<String>,
}

/// In-memory page. An element "matches" a selector when it was registered
/// under that selector's display string; registration order is document order.
#[derive(Debug)]
pub struct FakeDriver {
    state: Mutex<FakeState>,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeDriver {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                url: "about:blank".into(),
                extraction: Value::Array(Vec::new()),
                ..FakeState::default()
            }),
        }
    }

    fn with(self, f: impl FnOnce(&mut FakeState)) -> Self {
        f(&mut self.state.lock().unwrap());
        self
    }

    pub fn at(self, url: &str) -> Self {
        self.with(|s| s.url = url.to_string())
    }

    pub fn visible(self, selector: &str) -> Self {
        self.with(|s| {
            s.elements.push(FakeElement {
                selector: selector.to_string(),
                visible: true,
            })
        })
    }

    pub fn hidden(self, selector: &str) -> Self {
        self.with(|s| {
            s.elements.push(FakeElement {
                selector: selector.to_string(),
                visible: false,
            })
        })
    }

    pub fn unreachable(self, url: &str) -> Self {
        self.with(|s| {
            s.unreachable.insert(url.to_string());
        })
    }

    /// Navigation to `url` never finishes.
    pub fn stalled(self, url: &str) -> Self {
        self.with(|s| {
            s.stalled.insert(url.to_string());
        })
    }

    pub fn failing_click(self, selector: &str) -> Self {
        self.with(|s| {
            s.click_fails.insert(selector.to_string());
        })
    }

    pub fn failing_fill(self, selector: &str) -> Self {
        self.with(|s| {
            s.fill_fails.insert(selector.to_string());
        })
    }

    /// Every `locate` takes `delay` before answering.
    pub fn slow_locate(self, delay: Duration) -> Self {
        self.with(|s| s.locate_delay = delay)
    }

    pub fn failing_keys(self) -> Self {
        self.with(|s| s.keys_fail = true)
    }

    /// Scripts containing `needle` raise.
    pub fn failing_script(self, needle: &str) -> Self {
        self.with(|s| s.eval_fails.push(needle.to_string()))
    }

    pub fn extraction(self, records: Value) -> Self {
        self.with(|s| s.extraction = records)
    }

    pub fn lose_session(&self) {
        self.state.lock().unwrap().session_lost = true;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn url(&self) -> String {
        self.state.lock().unwrap().url.clone()
    }

    fn enter(&self, call: String) -> DriverResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(DriverError::SessionLost("browser closed".into()));
        }
        state.calls.push(call);
        Ok(state)
    }

    fn selector_of(state: &FakeState, handle: &ElementHandle) -> DriverResult<String> {
        handle
            .id
            .parse::<usize>()
            .ok()
            .and_then(|i| state.elements.get(i))
            .map(|e| e.selector.clone())
            .ok_or_else(|| DriverError::failed("stale element handle"))
    }

    fn find(state: &FakeState, selector: &Selector) -> Option<ElementHandle> {
        let key = selector.to_string();
        state
            .elements
            .iter()
            .position(|e| e.selector == key)
            .map(|i| ElementHandle::new(i.to_string()))
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn navigate(&self, url: &str) -> DriverResult<()> {
        let stalled = {
            let mut state = self.enter(format!("navigate {}", url))?;
            if state.unreachable.contains(url) {
                return Err(DriverError::failed("net::ERR_NAME_NOT_RESOLVED"));
            }
            let stalled = state.stalled.contains(url);
            if !stalled {
                state.url = url.to_string();
            }
            stalled
        };
        if stalled {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok(())
    }

    async fn current_url(&self) -> DriverResult<String> {
        let state = self.state.lock().unwrap();
        if state.session_lost {
            return Err(DriverError::SessionLost("browser closed".into()));
        }
        Ok(state.url.clone())
    }

    async fn locate(&self, selector: &Selector) -> DriverResult<Option<ElementHandle>> {
        let delay = self.state.lock().unwrap().locate_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let state = self.enter(format!("locate {}", selector))?;
        Ok(Self::find(&state, selector))
    }

    async fn is_visible(&self, handle: &ElementHandle) -> DriverResult<bool> {
        let state = self.state.lock().unwrap();
        let idx: usize = handle.id.parse().unwrap();
        Ok(state.elements[idx].visible)
    }

    async fn click(&self, handle: &ElementHandle) -> DriverResult<()> {
        let sel = Self::selector_of(&self.state.lock().unwrap(), handle)?;
        let state = self.enter(format!("click {}", sel))?;
        if state.click_fails.contains(&sel) {
            return Err(DriverError::failed("element is not clickable at point"));
        }
        Ok(())
    }

    async fn fill(&self, handle: &ElementHandle, text: &str) -> DriverResult<()> {
        let sel = Self::selector_of(&self.state.lock().unwrap(), handle)?;
        let state = self.enter(format!("fill {} '{}'", sel, text))?;
        if state.fill_fails.contains(&sel) {
            return Err(DriverError::failed("element is not editable"));
        }
        Ok(())
    }

    async fn press_key(&self, handle: &ElementHandle, key: &str) -> DriverResult<()> {
        let sel = Self::selector_of(&self.state.lock().unwrap(), handle)?;
        let state = self.enter(format!("press {} {}", sel, key))?;
        if state.keys_fail {
            return Err(DriverError::failed("key dispatch failed"));
        }
        Ok(())
    }

    async fn scroll_by(&self, dx: i64, dy: i64) -> DriverResult<()> {
        self.enter(format!("scroll {} {}", dx, dy))?;
        Ok(())
    }

    async fn evaluate(&self, script: &str, args: &[Value]) -> DriverResult<Value> {
        let first_line = script.trim().lines().next().unwrap_or_default().to_string();
        let state = self.enter(format!("eval {} {}", first_line, Value::from(args.to_vec())))?;
        if state.eval_fails.iter().any(|needle| script.contains(needle)) {
            return Err(DriverError::failed("script threw"));
        }
        if script.contains("querySelectorAll") {
            return Ok(state.extraction.clone());
        }
        Ok(Value::Null)
    }

    async fn wait_for_selector(
        &self,
        selector: &Selector,
        _timeout: Duration,
    ) -> DriverResult<Option<ElementHandle>> {
        let state = self.enter(format!("wait {}", selector))?;
        Ok(Self::find(&state, selector))
    }
}

/// Classifier that replays canned answers keyed by command text.
#[derive(Debug, Default)]
pub struct ScriptedClassifier {
    answers: HashMap<String, String>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, command: &str, raw: &str) -> Self {
        self.answers.insert(command.to_string(), raw.to_string());
        self
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    async fn classify(&self, command: &str) -> anyhow::Result<String> {
        self.answers
            .get(command)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("model unavailable"))
    }
}
