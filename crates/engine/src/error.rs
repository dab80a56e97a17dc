//! Error types for the wizard engine.
//!
//! [`EngineError`] is the `Result` error for fallible setup code (loading
//! definitions, talking to the catalog). Once a wizard is running, failures
//! never propagate to the caller: they are captured as a [`StepError`] on the
//! session and rendered by the view.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use toolkit_api::ApiError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to load tool '{tool_id}': {source}")]
    Load {
        tool_id: String,
        #[source]
        source: ApiError,
    },

    #[error("Tool definition error: {message}")]
    Definition { message: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl EngineError {
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition { message: message.into() }
    }
}

/// Classification of a step-scoped failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepErrorKind {
    /// Local pre-flight failure on the user's answers.
    Validation,
    /// The step declaration is incomplete (missing endpoint, alias, target).
    Configuration,
    /// The request never got a response.
    Transport,
    /// The backend answered with a non-success status.
    Api,
    /// An asynchronous worker job failed.
    Job,
    /// Anything else, such as an undecodable response.
    Unexpected,
}

/// A failure surfaced on the active step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepError {
    pub kind: StepErrorKind,
    pub message: String,
}

impl StepError {
    pub fn new(kind: StepErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Validation, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Configuration, message)
    }

    pub fn job(message: impl Into<String>) -> Self {
        Self::new(StepErrorKind::Job, message)
    }
}

impl From<ApiError> for StepError {
    fn from(error: ApiError) -> Self {
        let kind = match &error {
            ApiError::Transport { .. } => StepErrorKind::Transport,
            ApiError::Status { .. } => StepErrorKind::Api,
            ApiError::Decode { .. } => StepErrorKind::Unexpected,
            ApiError::InvalidBaseUrl { .. } => StepErrorKind::Configuration,
        };
        Self::new(kind, error.to_string())
    }
}

impl fmt::Display for StepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepError {}
