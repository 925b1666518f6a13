// ABOUTME: Error types for the workflow execution engine
// ABOUTME: Separates run-fatal errors from step-level failures recorded on results

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::workflow::DefinitionError;

/// Errors fatal to a run. These surface to the caller before any step
/// executes; step-level failures never propagate through this type.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Circular dependency detected among steps: {steps:?}")]
    CycleDetected { steps: Vec<String> },

    #[error(transparent)]
    Definition(#[from] DefinitionError),

    #[error("Step '{step_id}' not found in workflow")]
    StepNotFound { step_id: String },
}

/// Failure detail recorded on a step result. Contained by design: dependents
/// observe these only through the Skipped status.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepFailure {
    #[error("Attempt exceeded timeout of {timeout:?}")]
    TimeoutExceeded { timeout: Duration },

    #[error("Capability handler failed: {message}")]
    HandlerError { message: String },

    #[error("Result missing required output keys: {missing:?}")]
    ValidationFailed { missing: Vec<String> },

    #[error("Upstream step '{upstream}' produced no output key '{key}'")]
    MissingBinding { upstream: String, key: String },

    #[error("No capability registered under '{capability}'")]
    UnknownCapability { capability: String },

    #[error("Dependency '{dependency}' did not succeed")]
    DependencyFailed { dependency: String },

    #[error("Workflow was cancelled before the step completed")]
    Cancelled,
}

impl StepFailure {
    /// Deterministic failures re-run to the same outcome and are not retried
    /// unless the step opts in.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StepFailure::TimeoutExceeded { .. } | StepFailure::HandlerError { .. }
        )
    }
}

/// Workflow-level failure detail derived from aggregated step outcomes.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkflowFailure {
    #[error("Only {succeeded} of the required {required} steps succeeded")]
    ThresholdNotMet { required: usize, succeeded: usize },

    #[error("Workflow was cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
