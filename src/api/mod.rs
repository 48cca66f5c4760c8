//! High-level API for running durable LLM chains.

mod chain;
mod error;
mod provider;
pub mod report;
mod runner;

pub use chain::{
    Chain, ChainStep, EXTRACT_INSTRUCTION, EXTRACT_STEP, FORMAT_INSTRUCTION, FORMAT_STEP,
    SORT_INSTRUCTION, SORT_STEP,
};
pub use error::{ProviderError, RunError, StoreError};
pub use provider::{render_request, CompletionBackend, LlmBackend};
pub use runner::{ChainRequest, ChainRunner, InvocationContext, RetryPolicy};
