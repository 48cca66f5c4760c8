//! Durable execution of chains: every step runs at most once successfully per invocation key.

use futures::future;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use super::chain::Chain;
use super::error::{ProviderError, RunError, StoreError};
use super::provider::CompletionBackend;
use crate::core::config::RetryConfig;
use crate::core::journal::StepJournal;
use crate::core::record::{InvocationKey, WorkflowInvocation};

/// The inbound request of the metrics handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRequest {
    pub text: String,
}

/// How often a step's provider call is attempted within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            backoff: Duration::from_millis(cfg.backoff_ms),
        }
    }
}

/// One writer lock per invocation key.
#[derive(Default)]
struct InvocationLocks {
    locks: Mutex<HashMap<InvocationKey, Arc<AsyncMutex<()>>>>,
}

impl InvocationLocks {
    async fn acquire(&self, key: &InvocationKey) -> Result<OwnedMutexGuard<()>, StoreError> {
        let lock = {
            let mut map = self
                .locks
                .lock()
                .map_err(|e| StoreError::Unavailable(format!("Failed to acquire lock table: {}", e)))?;
            // Entries only referenced by the table are idle.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(key.clone()).or_default())
        };
        Ok(lock.lock_owned().await)
    }
}

/// Explicit durable-execution context for one invocation.
///
/// Holds the invocation's writer lock for its whole lifetime, so at most one
/// context per key exists at a time within a runner.
pub struct InvocationContext {
    key: InvocationKey,
    journal: Arc<dyn StepJournal>,
    retry: RetryPolicy,
    _guard: OwnedMutexGuard<()>,
}

impl InvocationContext {
    pub fn key(&self) -> &InvocationKey {
        &self.key
    }

    /// Loads or creates the invocation. The prompt and chain of an existing
    /// invocation cannot change.
    pub async fn begin(&self, prompt: &str, chain: &Chain) -> Result<WorkflowInvocation, RunError> {
        let invocation = self.journal.begin(&self.key, prompt, chain.steps()).await?;
        if invocation.prompt != prompt {
            return Err(RunError::PromptMismatch(self.key.to_string()));
        }
        if invocation.chain != chain.steps() {
            return Err(RunError::ChainMismatch(self.key.to_string()));
        }
        Ok(invocation)
    }

    /// Runs `call` as the durable step `name`.
    ///
    /// A completed record is replayed without calling `call`. Otherwise the step is
    /// marked pending, `call` is attempted up to the retry policy, and the output is
    /// persisted as completed. Exhausted attempts mark the step failed.
    pub async fn run_step<F, Fut>(&self, name: &str, input: &str, call: F) -> Result<String, RunError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<String, ProviderError>>,
    {
        if let Some(record) = self.journal.get(&self.key, name).await? {
            if let Some(output) = record.completed_output() {
                debug!(invocation = %self.key, step = name, "replaying completed step");
                return Ok(output.to_string());
            }
        }

        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            self.journal.mark_pending(&self.key, name, input).await?;
            info!(invocation = %self.key, step = name, attempt, "executing step");

            let result = match call(input.to_string()).await {
                Ok(output) if output.trim().is_empty() => Err(ProviderError::EmptyResponse),
                other => other,
            };

            match result {
                Ok(output) => {
                    let record = self
                        .journal
                        .put_if_absent_completed(&self.key, name, input, &output)
                        .await?;
                    info!(invocation = %self.key, step = name, "step completed");
                    return Ok(record.output.unwrap_or(output));
                }
                Err(cause) if attempt < max_attempts => {
                    warn!(invocation = %self.key, step = name, attempt, error = %cause, "step attempt failed, retrying");
                    tokio::time::sleep(self.retry.backoff).await;
                }
                Err(cause) => {
                    error!(invocation = %self.key, step = name, attempt, error = %cause, "step failed");
                    if let Err(e) = self
                        .journal
                        .mark_failed(&self.key, name, input, &cause.to_string())
                        .await
                    {
                        warn!(invocation = %self.key, step = name, error = %e, "could not record step failure");
                    }
                    return Err(RunError::StepExecutionFailed {
                        step: name.to_string(),
                        cause,
                    });
                }
            }
        }
    }

    /// Records the invocation's final output.
    pub async fn finish(&self, output: &str) -> Result<(), RunError> {
        self.journal.finish(&self.key, output).await?;
        Ok(())
    }
}

/// Runs chains against a completion backend, persisting each step in a journal.
#[derive(Clone)]
pub struct ChainRunner {
    journal: Arc<dyn StepJournal>,
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
    locks: Arc<InvocationLocks>,
}

impl ChainRunner {
    pub fn new(journal: Arc<dyn StepJournal>, backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            journal,
            backend,
            retry: RetryPolicy::default(),
            locks: Arc::new(InvocationLocks::default()),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn journal(&self) -> &Arc<dyn StepJournal> {
        &self.journal
    }

    /// Acquires the writer lock for `key` and returns its execution context.
    pub async fn context(&self, key: &InvocationKey) -> Result<InvocationContext, RunError> {
        let guard = self.locks.acquire(key).await?;
        Ok(InvocationContext {
            key: key.clone(),
            journal: Arc::clone(&self.journal),
            retry: self.retry,
            _guard: guard,
        })
    }

    /// Extracts metrics from `text`, sorts them and renders a markdown table.
    pub async fn run(&self, key: &InvocationKey, text: &str) -> Result<String, RunError> {
        self.run_chain(&Chain::metrics_report(), key, text).await
    }

    pub async fn handle(&self, key: &InvocationKey, request: ChainRequest) -> Result<String, RunError> {
        self.run(key, &request.text).await
    }

    /// Runs `chain` for `key`, feeding each step the previous step's output.
    pub async fn run_chain(
        &self,
        chain: &Chain,
        key: &InvocationKey,
        text: &str,
    ) -> Result<String, RunError> {
        if text.trim().is_empty() {
            return Err(RunError::InvalidInput("prompt text is empty".to_string()));
        }

        let ctx = self.context(key).await?;
        let invocation = ctx.begin(text, chain).await?;
        if let Some(output) = invocation.output {
            debug!(invocation = %key, "invocation already completed, replaying output");
            return Ok(output);
        }

        let mut current = text.to_string();
        for step in chain.steps() {
            let backend = Arc::clone(&self.backend);
            let instruction = step.instruction.clone();
            current = ctx
                .run_step(&step.name, &current, move |input| {
                    let backend = Arc::clone(&backend);
                    let instruction = instruction.clone();
                    async move { backend.complete(&instruction, &input).await }
                })
                .await?;
        }

        ctx.finish(&current).await?;
        info!(invocation = %key, steps = chain.steps().len(), "invocation completed");
        Ok(current)
    }

    /// Runs several invocations concurrently. Results keep the order of `requests`.
    pub async fn run_all(
        &self,
        chain: &Chain,
        requests: &[(InvocationKey, String)],
    ) -> Vec<Result<String, RunError>> {
        future::join_all(
            requests
                .iter()
                .map(|(key, text)| self.run_chain(chain, key, text)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::journal::MemoryJournal;
    use crate::core::record::StepStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CompletionBackend for Echo {
        async fn complete(&self, instruction: &str, input: &str) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{}<{}>", instruction, input))
        }
    }

    fn runner() -> (ChainRunner, Arc<Echo>) {
        let echo = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let runner = ChainRunner::new(Arc::new(MemoryJournal::new()), echo.clone());
        (runner, echo)
    }

    #[tokio::test]
    async fn each_step_receives_previous_output() {
        let (runner, echo) = runner();
        let chain = Chain::from_pairs([("a", "A"), ("b", "B")]).unwrap();
        let key = InvocationKey::new("k").unwrap();

        let out = runner.run_chain(&chain, &key, "in").await.unwrap();
        assert_eq!(out, "B<A<in>>");
        assert_eq!(echo.calls.load(Ordering::SeqCst), 2);

        let again = runner.run_chain(&chain, &key, "in").await.unwrap();
        assert_eq!(again, out);
        assert_eq!(echo.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn prompt_cannot_change_for_a_key() {
        let (runner, echo) = runner();
        let key = InvocationKey::new("k").unwrap();
        runner.run(&key, "first").await.unwrap();
        let err = runner.run(&key, "second").await.unwrap_err();
        assert!(matches!(err, RunError::PromptMismatch(_)));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn whitespace_output_counts_as_failure() {
        let (runner, _) = runner();
        let key = InvocationKey::new("k").unwrap();
        let ctx = runner.context(&key).await.unwrap();
        ctx.begin("p", &Chain::from_pairs([("only", "O")]).unwrap())
            .await
            .unwrap();
        let err = ctx
            .run_step("only", "p", |_| async { Ok("  \n".to_string()) })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::StepExecutionFailed { cause: ProviderError::EmptyResponse, .. }
        ));
    }

    #[tokio::test]
    async fn retry_policy_allows_extra_attempts() {
        let (runner, _) = runner();
        let runner = runner.with_retry(RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        });
        let key = InvocationKey::new("k").unwrap();
        let ctx = runner.context(&key).await.unwrap();
        ctx.begin("p", &Chain::from_pairs([("flaky", "F")]).unwrap())
            .await
            .unwrap();

        let tries = AtomicUsize::new(0);
        let out = ctx
            .run_step("flaky", "p", |_| {
                let n = tries.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::Call("overloaded".into()))
                    } else {
                        Ok("done".to_string())
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(out, "done");
        let record = runner.journal().get(&key, "flaky").await.unwrap().unwrap();
        assert_eq!(record.attempts, 3);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_the_step_failed() {
        let (runner, _) = runner();
        let runner = runner.with_retry(RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        });
        let key = InvocationKey::new("k").unwrap();
        let ctx = runner.context(&key).await.unwrap();
        ctx.begin("p", &Chain::from_pairs([("down", "D")]).unwrap())
            .await
            .unwrap();

        let tries = AtomicUsize::new(0);
        let err = ctx
            .run_step("down", "p", |_| {
                tries.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Call("overloaded".into())) }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, RunError::StepExecutionFailed { ref step, .. } if step == "down"));
        assert_eq!(tries.load(Ordering::SeqCst), 3);
        let record = runner.journal().get(&key, "down").await.unwrap().unwrap();
        assert_eq!(record.status, StepStatus::Failed);
        assert_eq!(record.attempts, 3);
        assert_eq!(record.error.as_deref(), Some("overloaded"));
    }

    #[tokio::test]
    async fn chain_cannot_change_for_a_key() {
        let (runner, echo) = runner();
        let key = InvocationKey::new("k").unwrap();
        runner.run(&key, "text").await.unwrap();

        let renamed = Chain::from_pairs([("extract", "Something else")]).unwrap();
        let err = runner.run_chain(&renamed, &key, "text").await.unwrap_err();
        assert!(matches!(err, RunError::ChainMismatch(_)));
        assert_eq!(echo.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn retry_config_never_drops_below_one_attempt() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            backoff_ms: 10,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.backoff, Duration::from_millis(10));
    }
}
