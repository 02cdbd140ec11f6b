//! Top-level entry point: compound command in, one result per step out.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::classifier::Classifier;
use crate::config::EngineConfig;
use crate::driver::Driver;
use crate::error::{EngineError, Result};
use crate::executor::Executor;
use crate::sequencer;
use crate::storage::{ArtifactStore, artifact_name};
use crate::types::{Action, Context, ExecutionResult};

/// One browser session plus the classifier that interprets commands for it.
///
/// Steps run strictly in order. A failed step does not stop the ones after
/// it; a lost browser session stops everything and poisons the engine.
pub struct Engine {
    classifier: Arc<dyn Classifier>,
    executor: Executor,
    store: Option<Arc<dyn ArtifactStore>>,
    context: Context,
    exit_requested: bool,
    lost: Option<String>,
}

impl Engine {
    pub fn new(classifier: Arc<dyn Classifier>, driver: Arc<dyn Driver>, config: EngineConfig) -> Self {
        Self {
            classifier,
            executor: Executor::new(driver, config),
            store: None,
            context: Context::default(),
            exit_requested: false,
            lost: None,
        }
    }

    /// Persist extract artifacts as they are produced.
    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    pub fn is_terminated(&self) -> bool {
        self.lost.is_some()
    }

    /// Run every step of `command`.
    ///
    /// Returns `Err` only for a lost session; results of steps that already
    /// ran are logged but not returned in that case.
    pub async fn execute(&mut self, command: &str) -> Result<Vec<ExecutionResult>> {
        self.ensure_alive()?;
        let steps = match sequencer::split(command) {
            Ok(steps) => steps,
            Err(e) => {
                warn!("[Engine] {}", e);
                return Ok(vec![ExecutionResult::failed(e.to_string())]);
            }
        };

        let total = steps.len();
        let pause = self.executor.config().step_settle;
        let mut results = Vec::with_capacity(total);
        for (i, step) in steps.iter().enumerate() {
            if i > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            let result = self.execute_one(step.as_str()).await?;
            info!(
                "[Engine] Step {}/{} {}: {}",
                i + 1,
                total,
                if result.success { "ok" } else { "failed" },
                result.message
            );
            results.push(result);
            if self.exit_requested {
                debug!("[Engine] exit requested, skipping {} remaining step(s)", total - i - 1);
                break;
            }
        }
        Ok(results)
    }

    /// Classify and run a single atomic command.
    pub async fn execute_one(&mut self, command: &str) -> Result<ExecutionResult> {
        self.ensure_alive()?;
        info!("[Engine] Executing: '{}'", command);

        let raw = match self.classifier.classify(command).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("[Engine] classifier failed on '{}': {:#}", command, e);
                let err = EngineError::Parse("the classifier did not answer".into());
                return Ok(ExecutionResult::failed(err.to_string()));
            }
        };
        debug!("[Engine] classifier output: {}", raw);

        let outcome = match self.executor.execute(&raw, &self.context).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[Engine] {}", e);
                self.lost = Some(e.to_string());
                return Err(e);
            }
        };
        self.context = outcome.context;

        if let Some(intent) = &outcome.intent {
            match intent.action {
                Action::Exit => self.exit_requested = true,
                Action::Extract => {
                    if let (Some(store), Some(data)) = (&self.store, &outcome.result.artifact) {
                        let name = artifact_name(intent.subject());
                        store.save(&name, data);
                    }
                }
                _ => {}
            }
        }
        Ok(outcome.result)
    }

    fn ensure_alive(&self) -> Result<()> {
        match &self.lost {
            Some(reason) => Err(EngineError::SessionLost(reason.clone())),
            None => Ok(()),
        }
    }
}
