// ABOUTME: Workflow execution engine module for the conductor crate
// ABOUTME: Planning, variable mapping, step execution, scheduling and metrics

pub mod bindings;
pub mod context;
pub mod error;
pub mod executor;
pub mod metrics;
pub mod plan;
pub mod result;
pub mod scheduler;

pub use bindings::VariableMapper;
pub use context::ExecutionContext;
pub use error::{ExecutionError, Result, StepFailure, WorkflowFailure};
pub use executor::StepExecutor;
pub use metrics::{MetricsAggregator, WorkflowMetrics};
pub use plan::{DependencyGraph, ExecutionPlan};
pub use result::{StepResult, StepStatus, WorkflowResult, WorkflowStatus};
pub use scheduler::WorkflowEngine;
