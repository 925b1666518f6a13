// ABOUTME: Main library module for the conductor workflow orchestration engine
// ABOUTME: Exports all core modules and provides the public API

pub mod capability;
pub mod engine;
pub mod sink;
pub mod stats;
pub mod workflow;

// Re-export commonly used types
pub use capability::{CapabilityError, CapabilityHandler, CapabilityRegistry, Payload};
pub use engine::{
    ExecutionError, StepFailure, StepResult, StepStatus, WorkflowEngine, WorkflowMetrics,
    WorkflowResult, WorkflowStatus,
};
pub use sink::{LogSink, MemorySink, ResultSink};
pub use stats::{CapabilityStats, InMemoryStatsStore, StatsStore};
pub use workflow::{BackoffPolicy, DefinitionError, Priority, StepConfig, Workflow};

// Error handling
pub type Result<T> = anyhow::Result<T>;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
