// ABOUTME: Per-run metrics aggregation and workflow-level scoring
// ABOUTME: Synchronized counters updated as steps terminate within a wave

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::result::{StepResult, StepStatus};

/// Aggregated outcome of one workflow run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowMetrics {
    pub total_steps: usize,
    pub succeeded_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
    /// Handler invocations across all steps, retries included.
    pub total_attempts: u32,
    /// Summed per-step execution time; exceeds `elapsed` when steps overlap.
    pub cumulative_step_time: Duration,
    /// Workflow wall-clock time.
    pub elapsed: Duration,
    /// Succeeded steps over total steps, in [0, 1].
    pub compliance_score: f64,
    /// Deterministic function of outcomes and timing; see `finalize`.
    pub performance_score: f64,
}

/// Accumulates step outcomes for a single run. Steps in a wave terminate
/// concurrently, so updates go through a write lock; lost updates would skew
/// the verdict.
#[derive(Debug, Clone, Default)]
pub struct MetricsAggregator {
    counters: Arc<RwLock<Counters>>,
}

#[derive(Debug, Default)]
struct Counters {
    succeeded: usize,
    failed: usize,
    skipped: usize,
    attempts: u32,
    step_time: Duration,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_step(&self, result: &StepResult) {
        let mut counters = self.counters.write().await;
        match result.status {
            StepStatus::Succeeded => counters.succeeded += 1,
            StepStatus::Failed => counters.failed += 1,
            StepStatus::Skipped => counters.skipped += 1,
            _ => {}
        }
        counters.attempts += result.attempts;
        counters.step_time += result.elapsed;
    }

    /// Compute the final metrics. The performance score is the compliance
    /// score weighted by how the run's wall-clock time compares to the
    /// declared estimate; without an estimate the two scores are equal.
    pub async fn finalize(
        &self,
        total_steps: usize,
        elapsed: Duration,
        estimated: Option<Duration>,
    ) -> WorkflowMetrics {
        let counters = self.counters.read().await;

        let compliance = if total_steps == 0 {
            0.0
        } else {
            counters.succeeded as f64 / total_steps as f64
        };

        let time_factor = match estimated {
            Some(estimate) if !elapsed.is_zero() => {
                (estimate.as_secs_f64() / elapsed.as_secs_f64()).min(1.0)
            }
            _ => 1.0,
        };

        WorkflowMetrics {
            total_steps,
            succeeded_steps: counters.succeeded,
            failed_steps: counters.failed,
            skipped_steps: counters.skipped,
            total_attempts: counters.attempts,
            cumulative_step_time: counters.step_time,
            elapsed,
            compliance_score: compliance,
            performance_score: compliance * time_factor,
        }
    }
}
