// ABOUTME: Step and workflow result types with status aggregation
// ABOUTME: A terminated run always yields a fully populated result object

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{StepFailure, WorkflowFailure};
use super::metrics::WorkflowMetrics;
use crate::capability::Payload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Retrying,
    Succeeded,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Succeeded | StepStatus::Failed | StepStatus::Skipped
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Created,
    Running,
    Completed,
    PartiallyCompleted,
    Failed,
    Cancelled,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Created | WorkflowStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub capability: String,
    pub status: StepStatus,
    pub output: Payload,
    pub failure: Option<StepFailure>,
    /// Handler invocations made; 0 when the step never ran.
    pub attempts: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed: Duration,
}

impl StepResult {
    pub fn new(step_id: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            capability: capability.into(),
            status: StepStatus::Pending,
            output: Payload::new(),
            failure: None,
            attempts: 0,
            started_at: None,
            finished_at: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn succeeded(mut self, output: Payload, attempts: u32, elapsed: Duration) -> Self {
        self.status = StepStatus::Succeeded;
        self.output = output;
        self.attempts = attempts;
        self.elapsed = elapsed;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn failed(mut self, failure: StepFailure, attempts: u32, elapsed: Duration) -> Self {
        self.status = StepStatus::Failed;
        self.failure = Some(failure);
        self.attempts = attempts;
        self.elapsed = elapsed;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn skipped(mut self, reason: StepFailure) -> Self {
        self.status = StepStatus::Skipped;
        self.failure = Some(reason);
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn is_successful(&self) -> bool {
        self.status == StepStatus::Succeeded
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub workflow_name: String,
    pub run_id: String,
    pub status: WorkflowStatus,
    pub failure: Option<WorkflowFailure>,
    /// One entry per declared step, in declaration order, whatever the outcome.
    pub steps: Vec<StepResult>,
    pub metrics: WorkflowMetrics,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl WorkflowResult {
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            run_id: run_id.into(),
            status: WorkflowStatus::Created,
            failure: None,
            steps: Vec::new(),
            metrics: WorkflowMetrics::default(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }

    pub fn succeeded_count(&self) -> usize {
        self.steps.iter().filter(|s| s.is_successful()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Failed)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Skipped)
            .count()
    }

    pub fn has_failures(&self) -> bool {
        self.failed_count() > 0
    }

    /// Apply the success policy once every step is terminal.
    pub fn finalize(&mut self, required: usize, cancelled: bool) {
        self.finished_at = Some(Utc::now());

        if cancelled {
            self.status = WorkflowStatus::Cancelled;
            self.failure = Some(WorkflowFailure::Cancelled);
            return;
        }

        let succeeded = self.succeeded_count();
        if succeeded == self.steps.len() {
            self.status = WorkflowStatus::Completed;
        } else if succeeded >= required {
            self.status = WorkflowStatus::PartiallyCompleted;
        } else {
            self.status = WorkflowStatus::Failed;
            self.failure = Some(WorkflowFailure::ThresholdNotMet {
                required,
                succeeded,
            });
        }
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StepStatus::Pending => "pending",
            StepStatus::Ready => "ready",
            StepStatus::Running => "running",
            StepStatus::Retrying => "retrying",
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        };
        write!(f, "{}", label)
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            WorkflowStatus::Created => "created",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::PartiallyCompleted => "partially_completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Cancelled => "cancelled",
        };
        write!(f, "{}", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminal_step(id: &str, status: StepStatus) -> StepResult {
        let result = StepResult::new(id, "noop");
        match status {
            StepStatus::Succeeded => {
                result.succeeded(Payload::new(), 1, Duration::from_millis(10))
            }
            StepStatus::Failed => result.failed(
                StepFailure::HandlerError {
                    message: "boom".into(),
                },
                1,
                Duration::from_millis(10),
            ),
            StepStatus::Skipped => result.skipped(StepFailure::DependencyFailed {
                dependency: "up".into(),
            }),
            _ => result,
        }
    }

    #[test]
    fn test_step_result_lifecycle() {
        let result = StepResult::new("draft", "content-creator");
        assert_eq!(result.status, StepStatus::Pending);
        assert!(!result.is_terminal());

        let done = result.succeeded(Payload::new(), 1, Duration::from_millis(5));
        assert!(done.is_successful());
        assert!(done.is_terminal());
        assert_eq!(done.attempts, 1);
    }

    #[test]
    fn test_finalize_completed() {
        let mut result = WorkflowResult::new("wf", "Test", "run-1");
        result.steps.push(terminal_step("a", StepStatus::Succeeded));
        result.steps.push(terminal_step("b", StepStatus::Succeeded));

        result.finalize(2, false);
        assert_eq!(result.status, WorkflowStatus::Completed);
        assert!(result.failure.is_none());
    }

    #[test]
    fn test_finalize_partially_completed() {
        let mut result = WorkflowResult::new("wf", "Test", "run-1");
        result.steps.push(terminal_step("a", StepStatus::Succeeded));
        result.steps.push(terminal_step("b", StepStatus::Succeeded));
        result.steps.push(terminal_step("c", StepStatus::Failed));

        result.finalize(2, false);
        assert_eq!(result.status, WorkflowStatus::PartiallyCompleted);
    }

    #[test]
    fn test_finalize_threshold_not_met() {
        let mut result = WorkflowResult::new("wf", "Test", "run-1");
        result.steps.push(terminal_step("a", StepStatus::Succeeded));
        result.steps.push(terminal_step("b", StepStatus::Failed));
        result.steps.push(terminal_step("c", StepStatus::Failed));

        result.finalize(2, false);
        assert_eq!(result.status, WorkflowStatus::Failed);
        assert_eq!(
            result.failure,
            Some(WorkflowFailure::ThresholdNotMet {
                required: 2,
                succeeded: 1
            })
        );
    }

    #[test]
    fn test_finalize_cancelled_wins() {
        let mut result = WorkflowResult::new("wf", "Test", "run-1");
        result.steps.push(terminal_step("a", StepStatus::Succeeded));
        result.steps.push(terminal_step("b", StepStatus::Skipped));

        result.finalize(1, true);
        assert_eq!(result.status, WorkflowStatus::Cancelled);
        assert_eq!(result.failure, Some(WorkflowFailure::Cancelled));
    }

    #[test]
    fn test_counts() {
        let mut result = WorkflowResult::new("wf", "Test", "run-1");
        result.steps.push(terminal_step("a", StepStatus::Succeeded));
        result.steps.push(terminal_step("b", StepStatus::Failed));
        result.steps.push(terminal_step("c", StepStatus::Skipped));

        assert_eq!(result.succeeded_count(), 1);
        assert_eq!(result.failed_count(), 1);
        assert_eq!(result.skipped_count(), 1);
        assert!(result.has_failures());
    }
}
