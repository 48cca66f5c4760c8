//! Durable step records and the per-invocation state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::api::{ChainStep, RunError, StoreError};

/// Longest accepted key in bytes. Encoded keys must fit in one file name.
pub const MAX_KEY_LEN: usize = 180;

/// Identifies one logical workflow run. Supplied by the caller, never generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InvocationKey(String);

impl InvocationKey {
    /// Creates a key. Blank keys and keys over [`MAX_KEY_LEN`] bytes are rejected.
    pub fn new(key: impl Into<String>) -> Result<Self, RunError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(RunError::InvalidInput(
                "invocation key cannot be empty".to_string(),
            ));
        }
        if key.len() > MAX_KEY_LEN {
            return Err(RunError::InvalidInput(format!(
                "invocation key is {} bytes long, the limit is {}",
                key.len(),
                MAX_KEY_LEN
            )));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Completion status of a single durable step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StepStatus::Pending => "pending",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// The persisted outcome of one durable step within one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub input: String,
    pub output: Option<String>,
    pub status: StepStatus,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn is_completed(&self) -> bool {
        self.status == StepStatus::Completed
    }

    /// Output of a completed step.
    pub fn completed_output(&self) -> Option<&str> {
        if self.is_completed() {
            self.output.as_deref()
        } else {
            None
        }
    }
}

/// All step records of one workflow run, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInvocation {
    pub key: InvocationKey,
    pub prompt: String,
    /// The chain definition the invocation was started with.
    pub chain: Vec<ChainStep>,
    pub steps: Vec<StepRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInvocation {
    pub fn new(key: InvocationKey, prompt: impl Into<String>, chain: Vec<ChainStep>) -> Self {
        let now = Utc::now();
        Self {
            key,
            prompt: prompt.into(),
            chain,
            steps: Vec::new(),
            output: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, name: &str) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn is_finished(&self) -> bool {
        self.output.is_some()
    }

    /// Returns the index of `name`, appending a fresh pending record when absent.
    /// Appending requires every earlier step to be completed.
    fn slot(&mut self, name: &str, input: &str) -> Result<usize, StoreError> {
        if let Some(idx) = self.steps.iter().position(|s| s.name == name) {
            return Ok(idx);
        }
        if self.is_finished() {
            return Err(StoreError::AlreadyFinished(self.key.to_string()));
        }
        if self.steps.iter().any(|s| !s.is_completed()) {
            return Err(StoreError::OutOfOrder {
                key: self.key.to_string(),
                step: name.to_string(),
            });
        }
        self.steps.push(StepRecord {
            name: name.to_string(),
            input: input.to_string(),
            output: None,
            status: StepStatus::Pending,
            attempts: 0,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        });
        Ok(self.steps.len() - 1)
    }

    /// Marks a step as in flight and counts the attempt. Completed steps are left untouched.
    pub fn record_pending(&mut self, name: &str, input: &str) -> Result<&StepRecord, StoreError> {
        let idx = self.slot(name, input)?;
        let step = &mut self.steps[idx];
        if !step.is_completed() {
            step.status = StepStatus::Pending;
            step.input = input.to_string();
            step.attempts += 1;
            step.error = None;
            step.started_at = Utc::now();
            step.finished_at = None;
            self.updated_at = Utc::now();
        }
        Ok(&self.steps[idx])
    }

    /// Stores the output of a step unless a completed record already exists,
    /// in which case the existing record wins.
    pub fn record_completed(
        &mut self,
        name: &str,
        input: &str,
        output: &str,
    ) -> Result<&StepRecord, StoreError> {
        let idx = self.slot(name, input)?;
        let step = &mut self.steps[idx];
        if !step.is_completed() {
            step.status = StepStatus::Completed;
            step.input = input.to_string();
            step.output = Some(output.to_string());
            step.attempts = step.attempts.max(1);
            step.error = None;
            step.finished_at = Some(Utc::now());
            self.updated_at = Utc::now();
        }
        Ok(&self.steps[idx])
    }

    /// Marks a step failed. A completed step is never downgraded.
    pub fn record_failed(
        &mut self,
        name: &str,
        input: &str,
        error: &str,
    ) -> Result<&StepRecord, StoreError> {
        let idx = self.slot(name, input)?;
        let step = &mut self.steps[idx];
        if !step.is_completed() {
            step.status = StepStatus::Failed;
            step.input = input.to_string();
            step.attempts = step.attempts.max(1);
            step.error = Some(error.to_string());
            step.finished_at = Some(Utc::now());
            self.updated_at = Utc::now();
        }
        Ok(&self.steps[idx])
    }

    /// Records the final output once every step has completed.
    pub fn record_output(&mut self, output: &str) -> Result<(), StoreError> {
        if self.is_finished() {
            return Err(StoreError::AlreadyFinished(self.key.to_string()));
        }
        if let Some(step) = self.steps.iter().find(|s| !s.is_completed()) {
            return Err(StoreError::OutOfOrder {
                key: self.key.to_string(),
                step: step.name.clone(),
            });
        }
        self.output = Some(output.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Position in the state machine for a chain with the given step names.
    pub fn state<S: AsRef<str>>(&self, chain: &[S]) -> InvocationState {
        if self.is_finished() {
            return InvocationState::Completed;
        }
        let mut last_done = None;
        for name in chain {
            let name = name.as_ref();
            match self.step(name).map(|s| s.status) {
                Some(StepStatus::Completed) => last_done = Some(name.to_string()),
                Some(StepStatus::Pending) => return InvocationState::Pending(name.to_string()),
                Some(StepStatus::Failed) => return InvocationState::Failed(name.to_string()),
                None => break,
            }
        }
        match last_done {
            Some(step) => InvocationState::Done(step),
            None => InvocationState::NotStarted,
        }
    }
}

/// Where an invocation stands in `NotStarted -> Pending -> Done -> ... -> Completed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationState {
    NotStarted,
    Pending(String),
    Done(String),
    Failed(String),
    Completed,
}

impl fmt::Display for InvocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationState::NotStarted => f.write_str("not started"),
            InvocationState::Pending(step) => write!(f, "{} pending", step),
            InvocationState::Done(step) => write!(f, "{} done", step),
            InvocationState::Failed(step) => write!(f, "failed at {}", step),
            InvocationState::Completed => f.write_str("completed"),
        }
    }
}
