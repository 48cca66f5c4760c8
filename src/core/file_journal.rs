//! Journal persisted as one JSON document per invocation.
//!
//! Every mutation rewrites the whole document through a temporary file that is
//! renamed over the old one, so readers see either the previous or the new
//! record set, never a partial write.

use async_trait::async_trait;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::journal::StepJournal;
use super::record::{InvocationKey, StepRecord, WorkflowInvocation};
use super::utils::{ensure_dir, key_file_name, key_from_file_name};
use crate::api::{ChainStep, StoreError};

#[derive(Debug, Clone)]
pub struct FileJournal {
    dir: PathBuf,
}

impl FileJournal {
    /// Opens (and creates if needed) a journal directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        ensure_dir(&dir).map_err(StoreError::Unavailable)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &InvocationKey) -> PathBuf {
        self.dir.join(key_file_name(key))
    }

    fn load(&self, key: &InvocationKey) -> Result<Option<WorkflowInvocation>, StoreError> {
        match fs::read(self.path(key)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, inv: &WorkflowInvocation) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(inv)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.path(&inv.key))
            .map_err(|e| StoreError::Io(e.error))?;
        Ok(())
    }

    fn update<T>(
        &self,
        key: &InvocationKey,
        f: impl FnOnce(&mut WorkflowInvocation) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut inv = self
            .load(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let out = f(&mut inv)?;
        self.save(&inv)?;
        Ok(out)
    }
}

#[async_trait]
impl StepJournal for FileJournal {
    async fn begin(
        &self,
        key: &InvocationKey,
        prompt: &str,
        chain: &[ChainStep],
    ) -> Result<WorkflowInvocation, StoreError> {
        if let Some(inv) = self.load(key)? {
            return Ok(inv);
        }
        let inv = WorkflowInvocation::new(key.clone(), prompt, chain.to_vec());
        self.save(&inv)?;
        Ok(inv)
    }

    async fn invocation(
        &self,
        key: &InvocationKey,
    ) -> Result<Option<WorkflowInvocation>, StoreError> {
        self.load(key)
    }

    async fn get(
        &self,
        key: &InvocationKey,
        step: &str,
    ) -> Result<Option<StepRecord>, StoreError> {
        Ok(self.load(key)?.and_then(|inv| inv.step(step).cloned()))
    }

    async fn mark_pending(
        &self,
        key: &InvocationKey,
        step: &str,
        input: &str,
    ) -> Result<StepRecord, StoreError> {
        self.update(key, |inv| inv.record_pending(step, input).cloned())
    }

    async fn put_if_absent_completed(
        &self,
        key: &InvocationKey,
        step: &str,
        input: &str,
        output: &str,
    ) -> Result<StepRecord, StoreError> {
        self.update(key, |inv| inv.record_completed(step, input, output).cloned())
    }

    async fn mark_failed(
        &self,
        key: &InvocationKey,
        step: &str,
        input: &str,
        error: &str,
    ) -> Result<StepRecord, StoreError> {
        self.update(key, |inv| inv.record_failed(step, input, error).cloned())
    }

    async fn finish(&self, key: &InvocationKey, output: &str) -> Result<(), StoreError> {
        self.update(key, |inv| inv.record_output(output))
    }

    async fn list(&self) -> Result<Vec<WorkflowInvocation>, StoreError> {
        let mut all = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(key) = name.to_str().and_then(key_from_file_name) else {
                continue;
            };
            match self.load(&key) {
                Ok(Some(inv)) => all.push(inv),
                Ok(None) => {}
                Err(e) => tracing::warn!(invocation = %key, error = %e, "skipping unreadable journal entry"),
            }
        }
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(all)
    }

    async fn remove(&self, key: &InvocationKey) -> Result<bool, StoreError> {
        match fs::remove_file(self.path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::StepStatus;

    fn key(k: &str) -> InvocationKey {
        InvocationKey::new(k).unwrap()
    }

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("report/q3");
        {
            let journal = FileJournal::open(dir.path()).unwrap();
            journal.begin(&k, "Revenue grew by 45%", &[]).await.unwrap();
            journal.mark_pending(&k, "extract", "Revenue grew by 45%").await.unwrap();
            journal
                .put_if_absent_completed(&k, "extract", "Revenue grew by 45%", "Revenue: 45%")
                .await
                .unwrap();
        }

        let reopened = FileJournal::open(dir.path()).unwrap();
        let step = reopened.get(&k, "extract").await.unwrap().unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.output.as_deref(), Some("Revenue: 45%"));
        assert_eq!(step.attempts, 1);
    }

    #[tokio::test]
    async fn failed_then_completed_step_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();
        let k = key("k");
        journal.begin(&k, "p", &[]).await.unwrap();
        journal.mark_pending(&k, "extract", "p").await.unwrap();
        journal.mark_failed(&k, "extract", "p", "timeout").await.unwrap();
        journal.mark_pending(&k, "extract", "p").await.unwrap();
        let done = journal
            .put_if_absent_completed(&k, "extract", "p", "out")
            .await
            .unwrap();

        assert_eq!(done.attempts, 2);
        assert!(done.error.is_none());
        journal.finish(&k, "out").await.unwrap();
        let inv = journal.invocation(&k).await.unwrap().unwrap();
        assert_eq!(inv.output.as_deref(), Some("out"));
    }

    #[tokio::test]
    async fn list_ignores_foreign_files_and_remove_deletes() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();
        fs::write(dir.path().join("README.txt"), "not a record").unwrap();
        journal.begin(&key("a"), "pa", &[]).await.unwrap();
        journal.begin(&key("b"), "pb", &[]).await.unwrap();

        let keys: Vec<_> = journal
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|inv| inv.key.to_string())
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"a".to_string()));

        assert!(journal.remove(&key("a")).await.unwrap());
        assert!(!journal.remove(&key("a")).await.unwrap());
        assert_eq!(journal.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_invocation_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileJournal::open(dir.path()).unwrap();
        assert!(journal.invocation(&key("nope")).await.unwrap().is_none());
        assert!(matches!(
            journal.finish(&key("nope"), "x").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
