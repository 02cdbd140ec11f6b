//! Natural-language browser commands.
//!
//! A command such as "go to youtube then search for cats" is split into
//! steps, each step is classified into a structured intent, and the intent
//! is carried out against a [`Driver`] through a selector-resolution
//! waterfall. Browser and model integrations live in the `agent` binary.

pub mod classifier;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod executor;
pub mod normalizer;
pub mod resolver;
pub mod sequencer;
pub mod storage;
pub mod types;

#[cfg(test)]
mod testing;

pub use classifier::{Classifier, KeywordClassifier};
pub use config::EngineConfig;
pub use driver::{BlockingGate, Driver, DriverResult, ElementHandle};
pub use engine::Engine;
pub use error::{DriverError, EngineError};
pub use executor::{Executor, Outcome, Phase};
pub use storage::{ArtifactStore, JsonFileStore, artifact_name};
pub use types::{Action, AtomicCommand, Context, ElementType, ExecutionResult, Intent, Selector};
