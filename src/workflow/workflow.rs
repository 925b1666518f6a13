// ABOUTME: Core workflow definition structures and construction-time validation
// ABOUTME: Defines the Workflow record consumed as-is by the execution engine

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::error::{DefinitionError, Result};
use super::step::StepConfig;

fn default_priority() -> Priority {
    Priority::Medium
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    /// Free-form classification tag, not interpreted by the engine.
    pub domain: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    /// Declarative order; execution order comes from the dependency plan.
    pub steps: IndexMap<String, StepConfig>,
    /// Minimum number of succeeded steps for overall success. None means all.
    #[serde(default)]
    pub success_threshold: Option<usize>,
    /// Informational only; feeds the performance score.
    #[serde(with = "humantime_serde", default)]
    pub estimated_duration: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            domain: None,
            priority: Priority::Medium,
            steps: IndexMap::new(),
            success_threshold: None,
            estimated_duration: None,
        }
    }

    pub fn add_step(mut self, id: impl Into<String>, step: StepConfig) -> Self {
        self.steps.insert(id.into(), step);
        self
    }

    pub fn with_success_threshold(mut self, threshold: usize) -> Self {
        self.success_threshold = Some(threshold);
        self
    }

    pub fn with_estimated_duration(mut self, duration: Duration) -> Self {
        self.estimated_duration = Some(duration);
        self
    }

    /// Parse a workflow definition from a JSON record.
    pub fn from_json(content: &str) -> Result<Self> {
        let workflow: Workflow = serde_json::from_str(content)
            .map_err(|e| DefinitionError::InvalidDefinition(e.to_string()))?;
        workflow.validate()?;
        Ok(workflow)
    }

    /// Validate the definition. All checks here run before any execution;
    /// cycle detection runs when the engine builds its plan, also pre-run.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DefinitionError::BlankWorkflowId);
        }

        if self.steps.is_empty() {
            return Err(DefinitionError::EmptyWorkflow);
        }

        let known: HashSet<&str> = self.steps.keys().map(String::as_str).collect();

        for (step_id, step) in &self.steps {
            if step_id.trim().is_empty() {
                return Err(DefinitionError::BlankStepId);
            }

            if step.capability.trim().is_empty() {
                return Err(DefinitionError::BlankCapability {
                    step: step_id.clone(),
                });
            }

            let mut seen = HashSet::new();
            for dependency in &step.depends_on {
                if dependency == step_id {
                    return Err(DefinitionError::SelfDependency {
                        step: step_id.clone(),
                    });
                }
                if !known.contains(dependency.as_str()) {
                    return Err(DefinitionError::UnknownDependency {
                        step: step_id.clone(),
                        dependency: dependency.clone(),
                    });
                }
                if !seen.insert(dependency.as_str()) {
                    return Err(DefinitionError::DuplicateDependency {
                        step: step_id.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }

            // A binding source without a dependency edge has no ordering guarantee.
            for source in step.bindings.keys() {
                if !step.depends_on.contains(source) {
                    return Err(DefinitionError::UnboundBindingSource {
                        step: step_id.clone(),
                        source_step: source.clone(),
                    });
                }
            }
        }

        if let Some(threshold) = self.success_threshold {
            if threshold > self.steps.len() {
                return Err(DefinitionError::ThresholdOutOfRange {
                    threshold,
                    steps: self.steps.len(),
                });
            }
        }

        Ok(())
    }

    /// Number of succeeded steps required for overall success.
    pub fn required_successes(&self) -> usize {
        self.success_threshold.unwrap_or(self.steps.len())
    }

    pub fn step_ids(&self) -> Vec<String> {
        self.steps.keys().cloned().collect()
    }

    pub fn get_step(&self, step_id: &str) -> Option<&StepConfig> {
        self.steps.get(step_id)
    }

    pub fn has_step(&self, step_id: &str) -> bool {
        self.steps.contains_key(step_id)
    }

    /// Steps that declare a direct dependency on the given step.
    pub fn dependents_of(&self, step_id: &str) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|(id, step)| {
                if step.depends_on.iter().any(|d| d == step_id) {
                    Some(id.clone())
                } else {
                    None
                }
            })
            .collect()
    }
}
