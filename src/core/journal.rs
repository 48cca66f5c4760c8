//! The durability store behind every chain step.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use super::record::{InvocationKey, StepRecord, WorkflowInvocation};
use crate::api::{ChainStep, StoreError};

/// Key-value store of step records, keyed by `(invocation, step name)`.
///
/// Implementations must make each write visible to subsequent reads and must
/// never replace a completed record.
#[async_trait]
pub trait StepJournal: Send + Sync {
    /// Returns the invocation for `key`, creating it with `prompt` and `chain` when absent.
    async fn begin(
        &self,
        key: &InvocationKey,
        prompt: &str,
        chain: &[ChainStep],
    ) -> Result<WorkflowInvocation, StoreError>;

    async fn invocation(
        &self,
        key: &InvocationKey,
    ) -> Result<Option<WorkflowInvocation>, StoreError>;

    async fn get(&self, key: &InvocationKey, step: &str)
        -> Result<Option<StepRecord>, StoreError>;

    async fn mark_pending(
        &self,
        key: &InvocationKey,
        step: &str,
        input: &str,
    ) -> Result<StepRecord, StoreError>;

    /// Persists a completed record unless one already exists; returns the winning record.
    async fn put_if_absent_completed(
        &self,
        key: &InvocationKey,
        step: &str,
        input: &str,
        output: &str,
    ) -> Result<StepRecord, StoreError>;

    async fn mark_failed(
        &self,
        key: &InvocationKey,
        step: &str,
        input: &str,
        error: &str,
    ) -> Result<StepRecord, StoreError>;

    /// Records the invocation's final output.
    async fn finish(&self, key: &InvocationKey, output: &str) -> Result<(), StoreError>;

    /// All known invocations, oldest first.
    async fn list(&self) -> Result<Vec<WorkflowInvocation>, StoreError>;

    /// Drops every record of an invocation. Returns whether anything was removed.
    async fn remove(&self, key: &InvocationKey) -> Result<bool, StoreError>;
}

/// In-process journal. Records do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    invocations: RwLock<HashMap<InvocationKey, WorkflowInvocation>>,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<T>(
        &self,
        key: &InvocationKey,
        f: impl FnOnce(&mut WorkflowInvocation) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut map = self
            .invocations
            .write()
            .map_err(|e| StoreError::Unavailable(format!("Failed to acquire write lock: {}", e)))?;
        let inv = map
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        f(inv)
    }
}

#[async_trait]
impl StepJournal for MemoryJournal {
    async fn begin(
        &self,
        key: &InvocationKey,
        prompt: &str,
        chain: &[ChainStep],
    ) -> Result<WorkflowInvocation, StoreError> {
        let mut map = self
            .invocations
            .write()
            .map_err(|e| StoreError::Unavailable(format!("Failed to acquire write lock: {}", e)))?;
        Ok(map
            .entry(key.clone())
            .or_insert_with(|| WorkflowInvocation::new(key.clone(), prompt, chain.to_vec()))
            .clone())
    }

    async fn invocation(
        &self,
        key: &InvocationKey,
    ) -> Result<Option<WorkflowInvocation>, StoreError> {
        let map = self
            .invocations
            .read()
            .map_err(|e| StoreError::Unavailable(format!("Failed to acquire read lock: {}", e)))?;
        Ok(map.get(key).cloned())
    }

    async fn get(
        &self,
        key: &InvocationKey,
        step: &str,
    ) -> Result<Option<StepRecord>, StoreError> {
        Ok(self
            .invocation(key)
            .await?
            .and_then(|inv| inv.step(step).cloned()))
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
        let map = self
            .invocations
            .read()
            .map_err(|e| StoreError::Unavailable(format!("Failed to acquire read lock: {}", e)))?;
        let mut all: Vec<_> = map.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        Ok(all)
    }

    async fn remove(&self, key: &InvocationKey) -> Result<bool, StoreError> {
        let mut map = self
            .invocations
            .write()
            .map_err(|e| StoreError::Unavailable(format!("Failed to acquire write lock: {}", e)))?;
        Ok(map.remove(key).is_some())
    }
}
