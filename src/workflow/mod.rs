// ABOUTME: Workflow definition module for the conductor orchestration engine
// ABOUTME: Declarative workflow and step records plus construction-time validation

pub mod error;
pub mod step;
pub mod workflow;

pub use error::{DefinitionError, Result};
pub use step::{BackoffPolicy, StepConfig};
pub use workflow::{Priority, Workflow};
