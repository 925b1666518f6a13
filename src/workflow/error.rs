// ABOUTME: Error types for workflow definition validation
// ABOUTME: Defines construction-time errors surfaced before any execution begins

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DefinitionError {
    #[error("Failed to parse workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Empty workflow: no steps defined")]
    EmptyWorkflow,

    #[error("Workflow id must not be blank")]
    BlankWorkflowId,

    #[error("Step id must not be blank")]
    BlankStepId,

    #[error("Step '{step}' depends on itself")]
    SelfDependency { step: String },

    #[error("Step '{step}' depends on unknown step '{dependency}'")]
    UnknownDependency { step: String, dependency: String },

    #[error("Step '{step}' declares duplicate dependency '{dependency}'")]
    DuplicateDependency { step: String, dependency: String },

    #[error("Step '{step}' binds output of '{source_step}', which is not one of its dependencies")]
    UnboundBindingSource { step: String, source_step: String },

    #[error("Step '{step}' names no target capability")]
    BlankCapability { step: String },

    #[error("Success threshold {threshold} exceeds step count {steps}")]
    ThresholdOutOfRange { threshold: usize, steps: usize },
}

pub type Result<T> = std::result::Result<T, DefinitionError>;
