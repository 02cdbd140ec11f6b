//! Execution state machine.
//!
//! Drives one normalized intent through
//! `Parsed -> Validated -> Resolving -> Acting -> Verified`, dropping to
//! `Failed` from any phase before `Verified`. Output that does not parse or
//! validate never reaches `Validated`. Context is taken by reference and
//! handed back with the result; it only changes after a successful navigate.

use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::driver::{Driver, DriverResult, ElementHandle};
use crate::error::{DriverError, EngineError, Result};
use crate::normalizer::{self, Normalized};
use crate::resolver::{self, Query, Resolution};
use crate::types::{Action, Context, ElementType, ExecutionResult, HELP_TEXT, Intent, Selector, hostname_of};

/// Selectors that show a search finished loading, by host substring.
pub const RESULT_SELECTORS: &[(&str, &str)] = &[
    ("youtube.com", "ytd-video-renderer"),
    ("google.com", "#search"),
    ("amazon", "[data-component-type='s-search-result']"),
    ("github.com", "[data-testid='results-list']"),
];

const SUBMIT_BUTTONS: &[&str] = &["button[type='submit']", "input[type='submit']"];

/// Tried in order when `type` cannot use its resolved field.
const GENERIC_INPUTS: &[&str] = &[
    "input[type='search']",
    "input[type='text']",
    "textarea",
    "[contenteditable='true']",
    "input",
];

/// Extract targets that name a kind of content rather than an element category.
const EXTRACTION_HINTS: &[(&str, &str)] = &[
    ("links", "a"),
    ("images", "img"),
    ("tables", "table"),
    ("headings", "h1, h2, h3"),
    ("paragraphs", "p"),
    ("text", "p"),
];

// Scripts receive the element handle id (a CSS reference) as their first argument.
const SCROLL_INTO_VIEW_JS: &str = r#"(ref) => {
  const el = document.querySelector(ref);
  if (el) el.scrollIntoView({ block: 'center', inline: 'center' });
  return !!el;
}"#;

const SCRIPT_CLICK_JS: &str = r#"(ref) => {
  const el = document.querySelector(ref);
  if (!el) throw new Error('element detached');
  el.click();
  return true;
}"#;

const SUBMIT_FORM_JS: &str = r#"(ref) => {
  const el = document.querySelector(ref);
  const form = el && (el.form || el.closest('form'));
  if (!form) throw new Error('no enclosing form');
  if (form.requestSubmit) form.requestSubmit(); else form.submit();
  return true;
}"#;

const SCROLL_TO_JS: &str = r#"(edge) => {
  window.scrollTo(0, edge === 'top' ? 0 : document.body.scrollHeight);
  return edge;
}"#;

/// Collects up to `limit` matches as `{text, href, attributes}`.
pub const EXTRACT_JS: &str = r#"(selector, text, limit) => {
  const needle = text ? text.toLowerCase() : null;
  const items = [];
  for (const el of document.querySelectorAll(selector)) {
    if (items.length >= limit) break;
    const content = (el.textContent || '').trim();
    if (needle && !content.toLowerCase().includes(needle)) continue;
    items.push({
      text: content,
      href: el.href || null,
      attributes: Object.fromEntries(Array.from(el.attributes).map(a => [a.name, a.value])),
    });
  }
  return items;
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Parsed,
    Validated,
    Resolving,
    Acting,
    Verified,
    Failed,
}

impl Phase {
    pub fn can_move_to(self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Parsed, Validated)
                | (Parsed, Failed)
                | (Validated, Resolving)
                | (Validated, Acting)
                | (Resolving, Acting)
                | (Acting, Verified)
                | (Validated | Resolving | Acting, Failed)
        )
    }
}

/// Phase tracker for one command; every transition is logged.
#[derive(Debug)]
struct Machine {
    label: String,
    phase: Phase,
    history: Vec<Phase>,
}

impl Machine {
    fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            phase: Phase::Parsed,
            history: vec![Phase::Parsed],
        }
    }

    fn to(&mut self, next: Phase) {
        if self.phase == next {
            return;
        }
        debug_assert!(
            self.phase.can_move_to(next),
            "illegal transition {:?} -> {:?}",
            self.phase,
            next
        );
        debug!("[Executor] {}: {:?} -> {:?}", self.label, self.phase, next);
        self.phase = next;
        self.history.push(next);
    }
}

/// Result of running one command, with the context to carry forward.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// `None` when the raw intent never validated.
    pub intent: Option<Intent>,
    pub result: ExecutionResult,
    pub context: Context,
    pub phases: Vec<Phase>,
}

pub struct Executor {
    driver: Arc<dyn Driver>,
    config: EngineConfig,
}

fn lost(err: DriverError) -> EngineError {
    match err {
        DriverError::SessionLost(reason) => EngineError::SessionLost(reason),
        other => EngineError::SessionLost(other.to_string()),
    }
}

/// Map a driver failure to a user-facing action error; the raw reason only
/// goes to the log.
fn failed(action: Action, verb: &'static str, target: &str) -> impl FnOnce(DriverError) -> EngineError {
    let target = target.to_string();
    move |err| {
        if err.is_fatal() {
            return lost(err);
        }
        warn!("[Executor] {} could not {} '{}': {}", action, verb, target, err);
        EngineError::Action {
            action,
            verb,
            target,
        }
    }
}

/// Swallow a non-fatal driver failure, keeping fatal ones.
fn tolerate<T>(what: &str, result: DriverResult<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_fatal() => Err(lost(e)),
        Err(e) => {
            debug!("[Executor] {} failed: {}", what, e);
            Ok(None)
        }
    }
}

fn required<'a>(field: &'a Option<String>, what: &str) -> Result<&'a str> {
    field
        .as_deref()
        .ok_or_else(|| EngineError::Validation(format!("missing {}", what)))
}

impl Executor {
    pub fn new(driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        Self { driver, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Normalize raw classifier output and run it.
    ///
    /// `Err` is returned only when the browser session is gone.
    pub async fn execute(&self, raw: &str, context: &Context) -> Result<Outcome> {
        let mut machine = Machine::new("command");
        match normalizer::normalize(raw, context) {
            Ok(normalized) => {
                machine.to(Phase::Validated);
                self.run(normalized, context, machine).await
            }
            Err(e) => {
                info!("[Executor] rejected: {}", e);
                machine.to(Phase::Failed);
                Ok(Outcome {
                    intent: None,
                    result: ExecutionResult::failed(e.to_string()),
                    context: context.clone(),
                    phases: machine.history,
                })
            }
        }
    }

    async fn run(&self, normalized: Normalized, context: &Context, mut machine: Machine) -> Result<Outcome> {
        machine.label = normalized.intent.action.to_string();
        let mut working = context.clone();
        info!(
            "[Executor] {} '{}'",
            normalized.intent.action,
            normalized.intent.subject()
        );

        let acted = self.act(&normalized, &mut working, &mut machine).await;
        let result = match acted {
            Ok(result) => {
                machine.to(Phase::Acting);
                machine.to(Phase::Verified);
                result
            }
            Err(e) if e.is_fatal() => {
                machine.to(Phase::Failed);
                return Err(e);
            }
            Err(e) => {
                machine.to(Phase::Failed);
                info!("[Executor] {} ({})", e, e.kind());
                ExecutionResult::failed(e.to_string())
            }
        };
        Ok(Outcome {
            intent: Some(normalized.intent),
            result,
            context: working,
            phases: machine.history,
        })
    }

    async fn act(
        &self,
        normalized: &Normalized,
        ctx: &mut Context,
        machine: &mut Machine,
    ) -> Result<ExecutionResult> {
        let intent = &normalized.intent;
        match intent.action {
            Action::Navigate => {
                let url = required(&intent.url, "url")?;
                machine.to(Phase::Acting);
                self.open(Action::Navigate, url).await?;
                if let Some(staged) = &normalized.staged {
                    *ctx = staged.clone();
                }
                Ok(ExecutionResult::ok(format!("Navigated to {}", url)))
            }
            Action::Search => self.search(intent, ctx, machine).await,
            Action::Click => self.click(intent, ctx, machine).await,
            Action::Type => self.type_text(intent, machine).await,
            Action::Scroll => {
                machine.to(Phase::Acting);
                self.scroll(intent).await
            }
            Action::Wait => {
                machine.to(Phase::Acting);
                tokio::time::sleep(self.config.wait_duration).await;
                Ok(ExecutionResult::ok(format!(
                    "Waited {:.1}s",
                    self.config.wait_duration.as_secs_f64()
                )))
            }
            Action::Extract => self.extract(intent, ctx, machine).await,
            Action::Help => Ok(ExecutionResult::ok(HELP_TEXT)),
            Action::Exit => Ok(ExecutionResult::ok("exit requested")),
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = DriverResult<T>>) -> DriverResult<T> {
        self.call_for(self.config.action_timeout, fut).await
    }

    async fn call_for<T>(
        &self,
        limit: Duration,
        fut: impl Future<Output = DriverResult<T>>,
    ) -> DriverResult<T> {
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout(limit)),
        }
    }

    /// Navigate and wait for the document body.
    async fn open(&self, action: Action, url: &str) -> Result<()> {
        self.call(self.driver.navigate(url))
            .await
            .map_err(failed(action, "open", url))?;
        let body = Selector::css("body");
        let wait = self.driver.wait_for_selector(&body, self.config.action_timeout);
        tolerate("wait for body", self.call_for(self.config.action_timeout * 2, wait).await)?;
        info!("[Executor] Loaded {}", url);
        Ok(())
    }

    /// Host of the page the driver is on, else of the session context.
    async fn page_host(&self, ctx: &Context) -> Result<Option<String>> {
        let live = tolerate("read current url", self.call(self.driver.current_url()).await)?;
        Ok(live
            .as_deref()
            .and_then(hostname_of)
            .or_else(|| ctx.hostname()))
    }

    async fn resolve(&self, query: &Query<'_>) -> Result<Resolution> {
        resolver::resolve(
            self.driver.as_ref(),
            query,
            self.config.action_timeout,
            self.config.resolve_timeout,
        )
        .await
            .map_err(lost)
    }

    async fn search(&self, intent: &Intent, ctx: &mut Context, machine: &mut Machine) -> Result<ExecutionResult> {
        let query = intent
            .value
            .as_deref()
            .or(intent.target.as_deref())
            .ok_or_else(|| EngineError::Validation("search command requires a query".into()))?;

        if let Some(url) = intent.url.as_deref() {
            if ctx.current_url.as_deref() != Some(url) {
                debug!("[Executor] search on {} needs a navigate first", url);
                self.open(Action::Search, url).await?;
                ctx.current_url = Some(url.to_string());
            }
        }

        machine.to(Phase::Resolving);
        let host = self.page_host(ctx).await?;
        let kind = intent.element_type.unwrap_or(ElementType::SearchInput);
        let resolution = self
            .resolve(&Query::new(kind).hostname(host.as_deref()))
            .await?;
        let Some(field) = resolution.handle else {
            return Err(EngineError::Resolution {
                action: Action::Search,
                element: "search box for".into(),
                target: query.to_string(),
            });
        };

        machine.to(Phase::Acting);
        self.call(self.driver.fill(&field, ""))
            .await
            .map_err(failed(Action::Search, "clear the search box for", query))?;
        self.call(self.driver.fill(&field, query))
            .await
            .map_err(failed(Action::Search, "enter", query))?;
        self.submit(&field, query).await?;
        self.settle(host.as_deref()).await?;

        Ok(ExecutionResult::ok(format!("Searched for '{}'", query)))
    }

    /// Enter key, then a submit button, then programmatic form submission.
    async fn submit(&self, field: &ElementHandle, query: &str) -> Result<()> {
        if tolerate("submit with Enter", self.call(self.driver.press_key(field, "Enter")).await)?.is_some() {
            return Ok(());
        }

        for css in SUBMIT_BUTTONS {
            let selector = Selector::css(*css);
            let Some(Some(button)) = tolerate("locate submit button", self.call(self.driver.locate(&selector)).await)? else {
                continue;
            };
            if tolerate("click submit button", self.call(self.driver.click(&button)).await)?.is_some() {
                debug!("[Executor] submitted via {}", selector);
                return Ok(());
            }
        }

        self.call(self.driver.evaluate(SUBMIT_FORM_JS, &[json!(field.id)]))
            .await
            .map(|_| ())
            .map_err(failed(Action::Search, "submit the search for", query))
    }

    /// Wait for a known result marker, or a fixed delay on unknown hosts.
    async fn settle(&self, host: Option<&str>) -> Result<()> {
        let marker = host.and_then(|h| {
            RESULT_SELECTORS
                .iter()
                .find(|(needle, _)| h.contains(needle))
                .map(|(_, css)| Selector::css(*css))
        });
        match marker {
            Some(selector) => {
                let limit = self.config.result_timeout;
                let wait = self.driver.wait_for_selector(&selector, limit);
                let seen = tolerate("wait for results", self.call_for(limit + self.config.action_timeout, wait).await)?;
                if !matches!(seen, Some(Some(_))) {
                    debug!("[Executor] results marker {} did not appear", selector);
                }
            }
            None => tokio::time::sleep(self.config.settle_delay).await,
        }
        Ok(())
    }

    async fn click(&self, intent: &Intent, ctx: &Context, machine: &mut Machine) -> Result<ExecutionResult> {
        let target = required(&intent.target, "target")?;
        let kind = intent.element_type.unwrap_or(ElementType::Button);
        let anchor = resolver::anchor_text_of(target);

        machine.to(Phase::Resolving);
        let host = self.page_host(ctx).await?;
        let query = Query::new(kind)
            .anchor(anchor.as_deref())
            .hostname(host.as_deref());
        let resolution = self.resolve(&query).await?;
        let (Some(selector), Some(handle)) = (resolution.selector, resolution.handle) else {
            return Err(EngineError::Resolution {
                action: Action::Click,
                element: kind.to_string(),
                target: target.to_string(),
            });
        };

        machine.to(Phase::Acting);
        tolerate(
            "scroll into view",
            self.call(self.driver.evaluate(SCROLL_INTO_VIEW_JS, &[json!(handle.id)])).await,
        )?;
        match self.call(self.driver.click(&handle)).await {
            Ok(()) => {}
            Err(e) if e.is_fatal() => return Err(lost(e)),
            Err(e) => {
                warn!("[Executor] click on {} failed ({}), retrying with a script click", selector, e);
                self.call(self.driver.evaluate(SCRIPT_CLICK_JS, &[json!(handle.id)]))
                    .await
                    .map_err(failed(Action::Click, "click", target))?;
            }
        }
        Ok(ExecutionResult::ok(format!("Clicked {} '{}'", kind, target)))
    }

    async fn type_text(&self, intent: &Intent, machine: &mut Machine) -> Result<ExecutionResult> {
        let target = required(&intent.target, "target")?;
        let text = required(&intent.value, "value")?;
        let anchor = resolver::anchor_text_of(target);

        machine.to(Phase::Resolving);
        let resolution = self
            .resolve(&Query::new(ElementType::Input).anchor(anchor.as_deref()))
            .await?;

        machine.to(Phase::Acting);
        if let (Some(selector), Some(handle)) = (&resolution.selector, &resolution.handle) {
            if self.try_fill(handle, text).await? {
                return Ok(ExecutionResult::ok(format!("Typed '{}' into {}", text, selector)));
            }
        }

        for css in GENERIC_INPUTS {
            let selector = Selector::css(*css);
            let Some(Some(handle)) = tolerate("locate input", self.call(self.driver.locate(&selector)).await)? else {
                continue;
            };
            if self.try_fill(&handle, text).await? {
                return Ok(ExecutionResult::ok(format!("Typed '{}' into {}", text, selector)));
            }
        }

        if resolution.is_resolved() {
            Err(EngineError::Action {
                action: Action::Type,
                verb: "type into",
                target: target.to_string(),
            })
        } else {
            Err(EngineError::Resolution {
                action: Action::Type,
                element: "input".into(),
                target: target.to_string(),
            })
        }
    }

    /// Clear then fill. `Ok(false)` when the element refused the text.
    async fn try_fill(&self, handle: &ElementHandle, text: &str) -> Result<bool> {
        if tolerate("clear field", self.call(self.driver.fill(handle, "")).await)?.is_none() {
            return Ok(false);
        }
        Ok(tolerate("fill field", self.call(self.driver.fill(handle, text)).await)?.is_some())
    }

    async fn scroll(&self, intent: &Intent) -> Result<ExecutionResult> {
        let direction = intent
            .value
            .as_deref()
            .or(intent.target.as_deref())
            .unwrap_or("down")
            .to_ascii_lowercase();
        let step = self.config.scroll_step;

        let done = if direction.contains("top") || direction.contains("bottom") {
            let edge = if direction.contains("top") { "top" } else { "bottom" };
            self.call(self.driver.evaluate(SCROLL_TO_JS, &[json!(edge)]))
                .await
                .map(|_| edge.to_string())
        } else if direction.contains("up") {
            self.call(self.driver.scroll_by(0, -step)).await.map(|_| "up".to_string())
        } else {
            self.call(self.driver.scroll_by(0, step)).await.map(|_| "down".to_string())
        };
        let done = done.map_err(failed(Action::Scroll, "scroll", &direction))?;
        Ok(ExecutionResult::ok(format!("Scrolled {}", done)))
    }

    async fn extract(&self, intent: &Intent, ctx: &Context, machine: &mut Machine) -> Result<ExecutionResult> {
        let target = intent
            .target
            .as_deref()
            .or(intent.value.as_deref())
            .ok_or_else(|| EngineError::Validation("extract command requires a target".into()))?;

        machine.to(Phase::Resolving);
        let selector = match extraction_hint(target) {
            Some(css) => Selector::css(css),
            None => match ElementType::parse(target) {
                Some(kind) => {
                    let host = self.page_host(ctx).await?;
                    let resolution = self
                        .resolve(&Query::new(kind).hostname(host.as_deref()))
                        .await?;
                    resolution.selector.ok_or_else(|| EngineError::Resolution {
                        action: Action::Extract,
                        element: kind.to_string(),
                        target: target.to_string(),
                    })?
                }
                None => Selector::css(target),
            },
        };

        machine.to(Phase::Acting);
        let limit = self.config.action_timeout;
        let wait = self.driver.wait_for_selector(&selector, limit);
        let found = tolerate("wait for matches", self.call_for(limit * 2, wait).await)?;
        if !matches!(found, Some(Some(_))) {
            return Err(EngineError::Resolution {
                action: Action::Extract,
                element: "elements matching".into(),
                target: target.to_string(),
            });
        }

        let args = [
            json!(selector.css_part()),
            json!(selector.text_part()),
            json!(self.config.extract_limit),
        ];
        let raw = self
            .call(self.driver.evaluate(EXTRACT_JS, &args))
            .await
            .map_err(failed(Action::Extract, "read", target))?;
        let mut records = match raw {
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => vec![other],
        };
        records.truncate(self.config.extract_limit);

        Ok(ExecutionResult::ok(format!(
            "Extracted {} item(s) matching {}",
            records.len(),
            selector
        ))
        .with_artifact(Value::Array(records)))
    }
}

fn extraction_hint(target: &str) -> Option<&'static str> {
    let target = target.trim().to_ascii_lowercase();
    EXTRACTION_HINTS
        .iter()
        .find(|(hint, _)| target == *hint || target == hint.trim_end_matches('s'))
        .map(|(_, css)| *css)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;

    fn executor(driver: &Arc<FakeDriver>) -> Executor {
        Executor::new(driver.clone(), EngineConfig::immediate())
    }

    async fn run(driver: &Arc<FakeDriver>, raw: &str, ctx: &Context) -> Outcome {
        executor(driver).execute(raw, ctx).await.unwrap()
    }

    #[tokio::test]
    async fn navigate_updates_context_on_success_only() {
        let driver = Arc::new(FakeDriver::new().unreachable("https://nowhere.invalid"));
        let start = Context::at("https://example.com");

        let ok = run(&driver, r#"{"action":"navigate","url":"youtube.com"}"#, &start).await;
        assert!(ok.result.success);
        assert_eq!(ok.context, Context::at("https://youtube.com"));
        assert_eq!(ok.result.message, "Navigated to https://youtube.com");

        let bad = run(&driver, r#"{"action":"navigate","url":"nowhere.invalid"}"#, &start).await;
        assert!(!bad.result.success);
        assert_eq!(bad.context, start);
        assert_eq!(bad.result.message, "navigate failed: could not open 'https://nowhere.invalid'");
        assert!(!bad.result.message.contains("ERR_NAME"));
        assert_eq!(*bad.phases.last().unwrap(), Phase::Failed);
    }

    #[tokio::test]
    async fn stalled_navigation_times_out() {
        let driver = Arc::new(FakeDriver::new().stalled("https://slow.example"));
        let out = run(&driver, r#"{"action":"navigate","url":"slow.example"}"#, &Context::default()).await;

        assert!(!out.result.success);
        assert_eq!(out.context, Context::default());
    }

    #[tokio::test]
    async fn search_navigates_fills_and_submits() {
        let driver = Arc::new(FakeDriver::new().visible("input[name='q']"));
        let raw = r#"{"action":"search","value":"rust","url":"https://www.google.com"}"#;

        let out = run(&driver, raw, &Context::default()).await;

        assert!(out.result.success, "{}", out.result.message);
        assert_eq!(out.context, Context::at("https://www.google.com"));
        let calls = driver.calls();
        assert_eq!(calls[0], "navigate https://www.google.com");
        assert!(calls.contains(&"fill input[name='q'] ''".to_string()));
        assert!(calls.contains(&"fill input[name='q'] 'rust'".to_string()));
        assert!(calls.contains(&"press input[name='q'] Enter".to_string()));
        assert!(calls.contains(&"wait #search".to_string()));
        assert_eq!(
            out.phases,
            vec![Phase::Parsed, Phase::Validated, Phase::Resolving, Phase::Acting, Phase::Verified]
        );
    }

    #[tokio::test]
    async fn search_skips_navigate_when_already_there() {
        let driver = Arc::new(
            FakeDriver::new()
                .at("https://www.youtube.com")
                .visible("input[name='search_query']"),
        );
        let ctx = Context::at("https://www.youtube.com");

        let out = run(&driver, r#"{"action":"search","value":"cats"}"#, &ctx).await;

        assert!(out.result.success);
        assert!(!driver.calls().iter().any(|c| c.starts_with("navigate")));
    }

    #[tokio::test]
    async fn search_submission_falls_back_to_button_then_form() {
        let driver = Arc::new(
            FakeDriver::new()
                .visible("input[type='search']")
                .visible("input[type='submit']")
                .failing_keys(),
        );
        let out = run(&driver, r#"{"action":"search","value":"socks"}"#, &Context::default()).await;
        assert!(out.result.success);
        assert!(driver.calls().contains(&"click input[type='submit']".to_string()));

        let driver = Arc::new(FakeDriver::new().visible("input[type='search']").failing_keys());
        let out = run(&driver, r#"{"action":"search","value":"socks"}"#, &Context::default()).await;
        assert!(out.result.success);
        assert!(driver.calls().iter().any(|c| c.starts_with("eval (ref)")));

        let driver = Arc::new(
            FakeDriver::new()
                .visible("input[type='search']")
                .failing_keys()
                .failing_script("no enclosing form"),
        );
        let out = run(&driver, r#"{"action":"search","value":"socks"}"#, &Context::default()).await;
        assert!(!out.result.success);
        assert_eq!(out.result.message, "search failed: could not submit the search for 'socks'");
    }

    #[tokio::test]
    async fn search_without_input_fails_softly() {
        let driver = Arc::new(FakeDriver::new());
        let out = run(&driver, r#"{"action":"search","value":"cats"}"#, &Context::default()).await;

        assert!(!out.result.success);
        assert_eq!(out.result.message, "search failed: could not find search box for 'cats'");
    }

    #[tokio::test]
    async fn click_retries_with_script_click() {
        let sel = "button:has-text(\"Subscribe\")";
        let driver = Arc::new(FakeDriver::new().visible(sel).failing_click(sel));

        let out = run(&driver, r#"{"action":"click","target":"Subscribe button"}"#, &Context::default()).await;

        assert!(out.result.success, "{}", out.result.message);
        assert_eq!(out.result.message, "Clicked button 'Subscribe button'");
        let calls = driver.calls();
        assert!(calls.iter().any(|c| c == &format!("click {}", sel)));
        assert!(calls.iter().filter(|c| c.starts_with("eval (ref)")).count() >= 2);
    }

    #[tokio::test]
    async fn click_fails_after_one_retry() {
        let sel = "button:has-text(\"Subscribe\")";
        let driver = Arc::new(
            FakeDriver::new()
                .visible(sel)
                .failing_click(sel)
                .failing_script("el.click()"),
        );
        let out = run(&driver, r#"{"action":"click","target":"Subscribe"}"#, &Context::default()).await;

        assert!(!out.result.success);
        assert_eq!(out.result.message, "click failed: could not click 'Subscribe'");
    }

    #[tokio::test]
    async fn missing_click_target_is_a_resolution_failure() {
        let driver = Arc::new(FakeDriver::new().visible("p"));
        let out = run(&driver, r#"{"action":"click","target":"the missing button"}"#, &Context::default()).await;

        assert!(!out.result.success);
        assert_eq!(out.result.message, "click failed: could not find button 'the missing button'");
        assert_eq!(
            out.phases,
            vec![Phase::Parsed, Phase::Validated, Phase::Resolving, Phase::Failed]
        );
    }

    #[tokio::test]
    async fn slow_page_resolution_is_bounded() {
        let driver = Arc::new(
            FakeDriver::new()
                .slow_locate(Duration::from_millis(40))
                .visible("button"),
        );
        let config = EngineConfig {
            resolve_timeout: Duration::from_millis(100),
            ..EngineConfig::immediate()
        };
        let started = std::time::Instant::now();

        let out = Executor::new(driver.clone(), config)
            .execute(r#"{"action":"click","target":"Subscribe"}"#, &Context::default())
            .await
            .unwrap();

        assert!(!out.result.success);
        assert_eq!(out.result.message, "click failed: could not find button 'Subscribe'");
        assert!(started.elapsed() < Duration::from_millis(500), "{:?}", started.elapsed());
        assert!(!driver.calls().iter().any(|c| c.starts_with("click")));
    }

    #[tokio::test]
    async fn type_falls_back_to_generic_inputs() {
        let driver = Arc::new(
            FakeDriver::new()
                .visible("input[name*='username' i]")
                .failing_fill("input[name*='username' i]")
                .visible("textarea"),
        );
        let raw = r#"{"action":"type","target":"username field","value":"ada"}"#;

        let out = run(&driver, raw, &Context::default()).await;

        assert!(out.result.success);
        assert_eq!(out.result.message, "Typed 'ada' into textarea");
    }

    #[tokio::test]
    async fn type_with_no_inputs_reports_the_target() {
        let driver = Arc::new(FakeDriver::new());
        let raw = r#"{"action":"type","target":"email","value":"a@b.c"}"#;

        let out = run(&driver, raw, &Context::default()).await;

        assert_eq!(out.result.message, "type failed: could not find input 'email'");
    }

    #[tokio::test]
    async fn scroll_directions() {
        let driver = Arc::new(FakeDriver::new());
        for (raw, expected) in [
            (r#"{"action":"scroll"}"#, "scroll 0 500"),
            (r#"{"action":"scroll","value":"up"}"#, "scroll 0 -500"),
        ] {
            let out = run(&driver, raw, &Context::default()).await;
            assert!(out.result.success);
            assert_eq!(driver.calls().last().unwrap(), expected);
        }
        let out = run(&driver, r#"{"action":"scroll","target":"bottom"}"#, &Context::default()).await;
        assert_eq!(out.result.message, "Scrolled bottom");
        assert!(driver.calls().last().unwrap().ends_with("[\"bottom\"]"));
    }

    #[tokio::test]
    async fn extract_collects_bounded_records() {
        let records = serde_json::json!([
            {"text": "One", "href": "https://a/1", "attributes": {}},
            {"text": "Two", "href": "https://a/2", "attributes": {}},
            {"text": "Three", "href": "https://a/3", "attributes": {}},
            {"text": "Four", "href": "https://a/4", "attributes": {}},
        ]);
        let driver = Arc::new(FakeDriver::new().visible("a").extraction(records));

        let out = run(&driver, r#"{"action":"extract","target":"links"}"#, &Context::default()).await;

        assert!(out.result.success);
        let artifact = out.result.artifact.unwrap();
        assert_eq!(artifact.as_array().unwrap().len(), 3);
        assert_eq!(artifact[0]["text"], "One");
    }

    #[tokio::test]
    async fn extract_category_goes_through_the_waterfall() {
        let driver = Arc::new(
            FakeDriver::new()
                .at("https://www.youtube.com/results?search_query=cats")
                .visible("a#video-title")
                .extraction(serde_json::json!([{"text": "Cats", "href": null, "attributes": {}}])),
        );
        let out = run(&driver, r#"{"action":"extract","target":"videos"}"#, &Context::default()).await;

        assert!(out.result.success, "{}", out.result.message);
        assert_eq!(out.result.message, "Extracted 1 item(s) matching a#video-title");
    }

    #[tokio::test]
    async fn extract_with_no_match_fails() {
        let driver = Arc::new(FakeDriver::new());
        let out = run(&driver, r#"{"action":"extract","target":".price"}"#, &Context::default()).await;

        assert!(!out.result.success);
        assert_eq!(out.result.message, "extract failed: could not find elements matching '.price'");
    }

    #[tokio::test]
    async fn validation_failures_never_touch_the_driver() {
        let driver = Arc::new(FakeDriver::new());
        let out = run(&driver, r#"{"action":"type","value":"x"}"#, &Context::default()).await;

        assert!(!out.result.success);
        assert_eq!(out.result.message, "type command requires a target element");
        assert!(driver.calls().is_empty());
        assert_eq!(out.phases, vec![Phase::Parsed, Phase::Failed]);
    }

    #[tokio::test]
    async fn unparseable_output_fails_straight_from_parsed() {
        let driver = Arc::new(FakeDriver::new());
        let out = run(&driver, "Sorry, I can't help with that.", &Context::default()).await;

        assert!(!out.result.success);
        assert!(out.result.message.starts_with("could not understand the command"));
        assert!(out.intent.is_none());
        assert_eq!(out.phases, vec![Phase::Parsed, Phase::Failed]);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn lost_session_is_fatal() {
        let driver = Arc::new(FakeDriver::new());
        driver.lose_session();

        let err = executor(&driver)
            .execute(r#"{"action":"scroll"}"#, &Context::default())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn transitions_follow_the_table() {
        assert!(Phase::Parsed.can_move_to(Phase::Validated));
        assert!(Phase::Resolving.can_move_to(Phase::Failed));
        assert!(!Phase::Parsed.can_move_to(Phase::Acting));
        assert!(Phase::Parsed.can_move_to(Phase::Failed));
        assert!(!Phase::Verified.can_move_to(Phase::Failed));
        assert!(!Phase::Failed.can_move_to(Phase::Validated));
    }

    #[test]
    fn extraction_hints_accept_singular() {
        assert_eq!(extraction_hint("Links"), Some("a"));
        assert_eq!(extraction_hint("image"), Some("img"));
        assert_eq!(extraction_hint("videos"), None);
    }
}
