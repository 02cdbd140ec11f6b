//! Browser-driving capability the engine runs against.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinError;

use crate::error::DriverError;
use crate::types::Selector;

/// Opaque reference to a located element.
///
/// `id` is driver-specific; the Chrome driver stores a CSS selector that
/// re-finds the tagged node, test drivers store an index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    pub id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Primitive browser operations. Calls are issued one at a time.
#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> DriverResult<()>;

    /// URL of the page currently loaded.
    async fn current_url(&self) -> DriverResult<String>;

    /// First element matching `selector` in document order, if any.
    async fn locate(&self, selector: &Selector) -> DriverResult<Option<ElementHandle>>;

    async fn is_visible(&self, handle: &ElementHandle) -> DriverResult<bool>;

    async fn click(&self, handle: &ElementHandle) -> DriverResult<()>;

    /// Replace the element's content with `text`.
    async fn fill(&self, handle: &ElementHandle, text: &str) -> DriverResult<()>;

    async fn press_key(&self, handle: &ElementHandle, key: &str) -> DriverResult<()>;

    async fn scroll_by(&self, dx: i64, dy: i64) -> DriverResult<()>;

    /// Run `script` (a JS function expression) with `args` and return its value.
    async fn evaluate(&self, script: &str, args: &[Value]) -> DriverResult<Value>;

    async fn wait_for_selector(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> DriverResult<Option<ElementHandle>>;
}

/// Runs blocking closures against a shared value, one at a time.
///
/// The permit travels into the blocking task, so a caller that gives up
/// waiting still holds off the next call until its closure has returned.
pub struct BlockingGate<T> {
    inner: Arc<T>,
    lock: Arc<Mutex<()>>,
}

impl<T: Send + Sync + 'static> BlockingGate<T> {
    pub fn new(inner: Arc<T>) -> Self {
        Self {
            inner,
            lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn run<R, F>(&self, f: F) -> Result<R, JoinError>
    where
        F: FnOnce(&T) -> R + Send + 'static,
        R: Send + 'static,
    {
        let permit = self.lock.clone().lock_owned().await;
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            f(inner.as_ref())
        })
        .await
    }
}
