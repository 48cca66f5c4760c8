//! Completion backends and the bridge to the `llm` crate.

use async_trait::async_trait;
use llm::builder::LLMBuilder;
use llm::chat::ChatMessage;
use llm::LLMProvider;
use std::time::Duration;

use super::error::{ProviderError, RunError};
use crate::core::config::ProviderConfig;

/// A text-completion provider: one instruction plus one input, one text answer.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError>;
}

/// Completion backend over any `llm` provider.
pub struct LlmBackend {
    llm: Box<dyn LLMProvider>,
    timeout: Option<Duration>,
}

impl LlmBackend {
    pub fn new(llm: Box<dyn LLMProvider>) -> Self {
        Self { llm, timeout: None }
    }

    /// Abandons calls that take longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the provider described by `config`, reading its API key from the environment.
    pub fn from_config(config: &ProviderConfig) -> Result<Self, RunError> {
        let backend = config.backend().map_err(RunError::Configuration)?;
        let api_key = config.api_key().map_err(RunError::Configuration)?;

        let mut builder = LLMBuilder::new().backend(backend).model(&config.model);
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        if let Some(base_url) = &config.base_url {
            builder = builder.base_url(base_url);
        }
        if let Some(max_tokens) = config.max_tokens {
            builder = builder.max_tokens(max_tokens);
        }
        if let Some(temperature) = config.temperature {
            builder = builder.temperature(temperature);
        }

        let llm = builder
            .build()
            .map_err(|e| RunError::Configuration(e.to_string()))?;
        Ok(Self::new(llm).with_timeout(config.timeout()))
    }
}

/// Renders the single user message sent for a step.
///
/// The instruction is not sent as a separate system message: it leads the user
/// message, followed by `Input:` and the step input, since each `ChatMessage`
/// carries one role.
pub fn render_request(instruction: &str, input: &str) -> String {
    format!("{}\nInput: {}", instruction, input)
}

#[async_trait]
impl CompletionBackend for LlmBackend {
    async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError> {
        let messages = [ChatMessage::user()
            .content(render_request(instruction, input))
            .build()];

        let call = self.llm.chat(&messages);
        let response = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ProviderError::Timeout(limit))??,
            None => call.await?,
        };

        response
            .text()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse)
    }
}
