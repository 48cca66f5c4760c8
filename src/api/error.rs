//! Error types for the library API.

use llm::error::LLMError;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the durable step journal.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The journal could not be reached or a lock was poisoned.
    #[error("Step journal unavailable: {0}")]
    Unavailable(String),

    /// A step was recorded before the steps preceding it completed.
    #[error("Step '{step}' of invocation '{key}' is out of order")]
    OutOfOrder { key: String, step: String },

    /// The invocation already has a final output.
    #[error("Invocation '{0}' is already finished")]
    AlreadyFinished(String),

    /// No records exist for the invocation.
    #[error("Invocation '{0}' not found")]
    NotFound(String),

    /// An underlying file I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or deserialize a record.
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by a completion backend for a single call.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// An error originating from the underlying LLM backend.
    #[error("LLM backend error: {0}")]
    Backend(#[from] LLMError),

    /// The backend answered with no usable text.
    #[error("empty response from provider")]
    EmptyResponse,

    /// The call did not finish in time.
    #[error("provider call timed out after {0:?}")]
    Timeout(Duration),

    /// Any other failure reported by a backend implementation.
    #[error("{0}")]
    Call(String),
}

/// A comprehensive error type for running a chain.
#[derive(Error, Debug)]
pub enum RunError {
    /// The prompt, key or chain definition was rejected before any provider call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A step's provider call failed; the invocation stays resumable from this step.
    #[error("Step '{step}' failed: {cause}")]
    StepExecutionFailed {
        step: String,
        #[source]
        cause: ProviderError,
    },

    /// The key was first used with a different prompt.
    #[error("Invocation '{0}' was started with a different prompt")]
    PromptMismatch(String),

    /// The key was first used with a different chain definition.
    #[error("Invocation '{0}' was started with a different chain")]
    ChainMismatch(String),

    /// An error originating from the step journal.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The runner or its backend is misconfigured.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl RunError {
    /// Name of the step that failed, if the error came from a step.
    pub fn failed_step(&self) -> Option<&str> {
        match self {
            RunError::StepExecutionFailed { step, .. } => Some(step),
            _ => None,
        }
    }
}
