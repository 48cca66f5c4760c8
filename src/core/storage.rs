use std::path::PathBuf;
use std::sync::Arc;

use super::config::Config;
use super::file_journal::FileJournal;
use crate::api::{ChainRunner, LlmBackend, RetryPolicy};

/// Runtime context holding the configuration and the step journal.
pub struct AppCtx {
    pub config: Config,
    pub journal_dir: PathBuf,
    pub journal: Arc<FileJournal>,
}

impl AppCtx {
    pub fn init(config: Config) -> Result<Self, String> {
        let journal_dir = config.journal_dir()?;
        let journal = FileJournal::open(&journal_dir).map_err(|e| e.to_string())?;
        Ok(Self {
            config,
            journal_dir,
            journal: Arc::new(journal),
        })
    }

    /// Builds a runner over the configured provider. Fails when the provider
    /// cannot be constructed, e.g. a missing API key.
    pub fn runner(&self) -> Result<ChainRunner, String> {
        let backend = LlmBackend::from_config(&self.config.provider).map_err(|e| e.to_string())?;
        Ok(ChainRunner::new(self.journal.clone(), Arc::new(backend))
            .with_retry(RetryPolicy::from(&self.config.retry)))
    }
}
