//! Error types for the engine and its browser driver.

use std::time::Duration;
use thiserror::Error;

use crate::types::Action;

/// Failure raised by a browser driver call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    /// The call ran but the page refused it (missing element, script error, ...)
    #[error("{0}")]
    Failed(String),

    /// The call did not finish within its budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// The underlying browser session is gone
    #[error("browser session lost: {0}")]
    SessionLost(String),
}

impl DriverError {
    pub fn failed(reason: impl Into<String>) -> Self {
        DriverError::Failed(reason.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, DriverError::SessionLost(_))
    }
}

/// Engine error taxonomy.
///
/// Everything except `SessionLost` is recovered into a failed
/// [`ExecutionResult`](crate::types::ExecutionResult). The `Display` text is
/// what the user sees, so it names the action and target and never carries
/// raw driver output.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Classifier output unusable by both structured and fallback extraction
    #[error("could not understand the command: {0}")]
    Parse(String),

    /// A required intent field is missing
    #[error("{0}")]
    Validation(String),

    /// The resolution waterfall found no visible candidate
    #[error("{action} failed: could not find {element} '{target}'")]
    Resolution {
        action: Action,
        element: String,
        target: String,
    },

    /// A driver call errored or timed out
    #[error("{action} failed: could not {verb} '{target}'")]
    Action {
        action: Action,
        verb: &'static str,
        target: String,
    },

    /// A compound command produced no atomic commands
    #[error("no commands found in '{0}'")]
    Sequencing(String),

    /// The browser is gone; the session must be recreated
    #[error("browser session lost: {0}")]
    SessionLost(String),
}

impl EngineError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::SessionLost(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Parse(_) => "parse",
            EngineError::Validation(_) => "validation",
            EngineError::Resolution { .. } => "resolution",
            EngineError::Action { .. } => "action",
            EngineError::Sequencing(_) => "sequencing",
            EngineError::SessionLost(_) => "session_lost",
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
