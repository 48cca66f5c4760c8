//! Loads runner configuration from `~/.durable-chain/config.toml`.

use llm::builder::LLMBackend;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use super::utils::home_dir;

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub journal: JournalConfig,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
}

/// Everything needed to reach the completion provider.
#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ProviderConfig {
    pub backend: String,
    pub model: String,
    pub api_key_env: Option<String>,
    pub base_url: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: None,
            base_url: None,
            max_tokens: None,
            temperature: None,
            timeout_secs: Some(120),
        }
    }
}

impl ProviderConfig {
    pub fn backend(&self) -> Result<LLMBackend, String> {
        LLMBackend::from_str(&self.backend)
            .map_err(|_| format!("Unknown provider backend '{}'", self.backend))
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.filter(|s| *s > 0).map(Duration::from_secs)
    }

    /// Name of the environment variable holding the API key, if the backend needs one.
    pub fn api_key_var(&self) -> Result<Option<String>, String> {
        if let Some(var) = &self.api_key_env {
            return Ok(Some(var.clone()).filter(|v| !v.is_empty()));
        }
        let var = match self.backend()? {
            LLMBackend::OpenAI => "OPENAI_API_KEY",
            LLMBackend::Anthropic => "ANTHROPIC_API_KEY",
            LLMBackend::Google => "GOOGLE_API_KEY",
            LLMBackend::Groq => "GROQ_API_KEY",
            LLMBackend::XAI => "XAI_API_KEY",
            LLMBackend::Cohere => "COHERE_API_KEY",
            LLMBackend::DeepSeek => "DEEPSEEK_API_KEY",
            LLMBackend::Mistral => "MISTRAL_API_KEY",
            _ => return Ok(None),
        };
        Ok(Some(var.to_string()))
    }

    pub fn api_key(&self) -> Result<Option<String>, String> {
        match self.api_key_var()? {
            Some(var) => env::var(&var)
                .map(Some)
                .map_err(|_| format!("Environment variable '{}' not set for provider '{}'", var, self.backend)),
            None => Ok(None),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct JournalConfig {
    pub dir: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 500,
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Reads the config file, falling back to defaults when it does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => home_dir()?.join("config.toml"),
        };
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Journal directory, defaulting to `~/.durable-chain/journal`.
    pub fn journal_dir(&self) -> Result<PathBuf, String> {
        match &self.journal.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(home_dir()?.join("journal")),
        }
    }
}
