// ABOUTME: Single-step execution with timeout enforcement and retry backoff
// ABOUTME: Wraps capability invocations and validates their structured results

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::context::ExecutionContext;
use super::error::StepFailure;
use super::result::{StepResult, StepStatus};
use crate::capability::{CapabilityHandler, CapabilityRegistry, Payload};
use crate::stats::StatsStore;
use crate::workflow::StepConfig;

/// Executes one step at a time on behalf of the scheduler: resolves the
/// handler, enforces the per-attempt timeout, retries with backoff, and
/// validates required output keys.
pub struct StepExecutor {
    registry: Arc<CapabilityRegistry>,
    stats: Arc<dyn StatsStore>,
    default_timeout: Duration,
}

enum Attempt {
    Succeeded(Payload),
    Failed(StepFailure),
    Cancelled,
}

impl StepExecutor {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        stats: Arc<dyn StatsStore>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            stats,
            default_timeout,
        }
    }

    /// Run the step to a terminal result. Never panics or errors out of the
    /// scheduler: every failure mode lands on the returned `StepResult`.
    pub async fn execute(
        &self,
        step_id: &str,
        step: &StepConfig,
        input: Payload,
        context: &ExecutionContext,
        cancel: &CancellationToken,
    ) -> StepResult {
        let started = Instant::now();
        let mut result = StepResult::new(step_id, &step.capability);
        result.started_at = Some(chrono::Utc::now());

        let handler = match self.registry.get(&step.capability) {
            Some(handler) => handler,
            None => {
                error!(step_id, capability = %step.capability, "capability not registered");
                return result.failed(
                    StepFailure::UnknownCapability {
                        capability: step.capability.clone(),
                    },
                    0,
                    started.elapsed(),
                );
            }
        };

        let attempt_timeout = step.timeout.unwrap_or(self.default_timeout);
        let mut attempts = 0u32;
        let mut last_failure = StepFailure::Cancelled;

        while attempts <= step.max_retries {
            if attempts > 0 {
                context.set_status(step_id, StepStatus::Retrying).await;
                let delay = step.backoff.delay_for(attempts - 1);
                debug!(step_id, ?delay, "waiting before retry");
                tokio::select! {
                    _ = cancel.cancelled() => {
                        return result.failed(StepFailure::Cancelled, attempts, started.elapsed());
                    }
                    _ = sleep(delay) => {}
                }
            }

            context.set_status(step_id, StepStatus::Running).await;
            attempts += 1;
            info!(
                step_id,
                capability = %step.capability,
                attempt = attempts,
                max_attempts = step.max_retries + 1,
                "invoking capability"
            );

            let attempt_started = Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Attempt::Cancelled,
                invoked = timeout(attempt_timeout, handler.invoke(input.clone())) => {
                    match invoked {
                        Ok(Ok(output)) => match missing_outputs(step, &output) {
                            missing if missing.is_empty() => Attempt::Succeeded(output),
                            missing => Attempt::Failed(StepFailure::ValidationFailed { missing }),
                        },
                        Ok(Err(err)) => Attempt::Failed(StepFailure::HandlerError {
                            message: err.to_string(),
                        }),
                        Err(_) => Attempt::Failed(StepFailure::TimeoutExceeded {
                            timeout: attempt_timeout,
                        }),
                    }
                }
            };

            match outcome {
                Attempt::Succeeded(output) => {
                    self.stats
                        .record_invocation(&step.capability, true, attempt_started.elapsed())
                        .await;
                    return result.succeeded(output, attempts, started.elapsed());
                }
                Attempt::Cancelled => {
                    // The invocation future was dropped; cancellation of the
                    // handler itself is cooperative at best.
                    warn!(step_id, "cancelled mid-attempt");
                    return result.failed(StepFailure::Cancelled, attempts, started.elapsed());
                }
                Attempt::Failed(failure) => {
                    self.stats
                        .record_invocation(&step.capability, false, attempt_started.elapsed())
                        .await;
                    warn!(step_id, attempt = attempts, %failure, "attempt failed");

                    let retryable = failure.is_retryable()
                        || (matches!(failure, StepFailure::ValidationFailed { .. })
                            && step.retry_validation_failures);
                    last_failure = failure;

                    if !retryable {
                        break;
                    }
                }
            }
        }

        error!(step_id, attempts, %last_failure, "step failed");
        result.failed(last_failure, attempts, started.elapsed())
    }
}

fn missing_outputs(step: &StepConfig, output: &Payload) -> Vec<String> {
    step.required_outputs
        .iter()
        .filter(|key| !output.contains_key(key.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityError;
    use crate::stats::InMemoryStatsStore;
    use crate::workflow::BackoffPolicy;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn executor_with(registry: CapabilityRegistry) -> (StepExecutor, Arc<InMemoryStatsStore>) {
        let stats = Arc::new(InMemoryStatsStore::new());
        let executor = StepExecutor::new(
            Arc::new(registry),
            stats.clone(),
            Duration::from_secs(5),
        );
        (executor, stats)
    }

    fn fast_retry_step(capability: &str, retries: u32) -> StepConfig {
        StepConfig::new(capability)
            .with_max_retries(retries)
            .with_backoff(BackoffPolicy::fixed(Duration::from_millis(1)))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("echo", |input: Payload| async move { Ok(input) });
        let (executor, stats) = executor_with(registry);

        let step = StepConfig::new("echo").with_input("message", json!("hi"));
        let context = ExecutionContext::new("wf", "run");
        let input = step.input.clone();

        let result = executor
            .execute("s1", &step, input, &context, &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::Succeeded);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.output.get("message"), Some(&json!("hi")));

        let recorded = stats.capability_stats("echo").await.unwrap();
        assert_eq!(recorded.successes, 1);
    }

    #[tokio::test]
    async fn test_retries_exhausted_counts_invocations() {
        let calls = Arc::new(AtomicU32::new(0));
        let observed = calls.clone();

        let mut registry = CapabilityRegistry::new();
        registry.register_fn("flaky", move |_input| {
            let calls = observed.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::new("always down"))
            }
        });
        let (executor, stats) = executor_with(registry);

        let step = fast_retry_step("flaky", 2);
        let context = ExecutionContext::new("wf", "run");

        let result = executor
            .execute("s1", &step, Payload::new(), &context, &CancellationToken::new())
            .await;

        // 1 initial + 2 retries.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.status, StepStatus::Failed);
        assert!(matches!(
            result.failure,
            Some(StepFailure::HandlerError { .. })
        ));

        let recorded = stats.capability_stats("flaky").await.unwrap();
        assert_eq!(recorded.failures, 3);
    }

    #[tokio::test]
    async fn test_timeout_enforced() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("slow", |_input| async move {
            sleep(Duration::from_millis(500)).await;
            Ok(Payload::new())
        });
        let (executor, _) = executor_with(registry);

        let step = StepConfig::new("slow")
            .with_timeout(Duration::from_millis(50))
            .with_max_retries(0);
        let context = ExecutionContext::new("wf", "run");

        let started = Instant::now();
        let result = executor
            .execute("s1", &step, Payload::new(), &context, &CancellationToken::new())
            .await;

        assert_eq!(result.status, StepStatus::Failed);
        assert!(matches!(
            result.failure,
            Some(StepFailure::TimeoutExceeded { .. })
        ));
        // The executor must not wait out the handler's full sleep.
        assert!(started.elapsed() < Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_validation_failure_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let observed = calls.clone();

        let mut registry = CapabilityRegistry::new();
        registry.register_fn("incomplete", move |_input| {
            let calls = observed.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let mut output = Payload::new();
                output.insert("content".to_string(), json!("text"));
                Ok(output)
            }
        });
        let (executor, _) = executor_with(registry);

        let step = fast_retry_step("incomplete", 3).with_required_outputs(["content", "summary"]);
        let context = ExecutionContext::new("wf", "run");

        let result = executor
            .execute("s1", &step, Payload::new(), &context, &CancellationToken::new())
            .await;

        // Deterministic failure: exactly one invocation despite max_retries.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            result.failure,
            Some(StepFailure::ValidationFailed {
                missing: vec!["summary".to_string()]
            })
        );
    }

    #[tokio::test]
    async fn test_validation_failure_retried_on_request() {
        let calls = Arc::new(AtomicU32::new(0));
        let observed = calls.clone();

        let mut registry = CapabilityRegistry::new();
        registry.register_fn("incomplete", move |_input| {
            let calls = observed.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(Payload::new())
            }
        });
        let (executor, _) = executor_with(registry);

        let mut step = fast_retry_step("incomplete", 2).with_required_outputs(["summary"]);
        step.retry_validation_failures = true;
        let context = ExecutionContext::new("wf", "run");

        let result = executor
            .execute("s1", &step, Payload::new(), &context, &CancellationToken::new())
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.status, StepStatus::Failed);
    }

    #[tokio::test]
    async fn test_unknown_capability_fails_without_attempts() {
        let (executor, stats) = executor_with(CapabilityRegistry::new());

        let step = StepConfig::new("ghost");
        let context = ExecutionContext::new("wf", "run");

        let result = executor
            .execute("s1", &step, Payload::new(), &context, &CancellationToken::new())
            .await;

        assert_eq!(result.attempts, 0);
        assert_eq!(
            result.failure,
            Some(StepFailure::UnknownCapability {
                capability: "ghost".to_string()
            })
        );
        assert!(stats.capability_stats("ghost").await.is_none());
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_attempt() {
        let mut registry = CapabilityRegistry::new();
        registry.register_fn("slow", |_input| async move {
            sleep(Duration::from_secs(30)).await;
            Ok(Payload::new())
        });
        let (executor, _) = executor_with(registry);

        let step = StepConfig::new("slow").with_timeout(Duration::from_secs(60));
        let context = ExecutionContext::new("wf", "run");
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let started = Instant::now();
        let result = executor
            .execute("s1", &step, Payload::new(), &context, &cancel)
            .await;

        assert_eq!(result.failure, Some(StepFailure::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
