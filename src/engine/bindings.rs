// ABOUTME: Variable mapper feeding upstream step outputs into dependent inputs
// ABOUTME: Pure input construction; runs immediately before each step executes

use std::collections::HashMap;

use super::error::StepFailure;
use crate::capability::Payload;
use crate::workflow::StepConfig;

/// Resolves the effective input configuration for a step from its declared
/// input plus its bindings over upstream outputs. No side effects: failures
/// here mean the capability is never invoked.
pub struct VariableMapper;

impl VariableMapper {
    /// Copy each bound output key from its upstream result into the step's
    /// input under the same key. A bound key absent from the upstream output
    /// is a `MissingBinding` failure even though the upstream step succeeded.
    pub fn resolve(
        step: &StepConfig,
        upstream_outputs: &HashMap<String, Payload>,
    ) -> Result<Payload, StepFailure> {
        let mut input = step.input.clone();

        for (upstream, key) in &step.bindings {
            let output = upstream_outputs.get(upstream).ok_or_else(|| {
                StepFailure::MissingBinding {
                    upstream: upstream.clone(),
                    key: key.clone(),
                }
            })?;

            let value = output.get(key).ok_or_else(|| StepFailure::MissingBinding {
                upstream: upstream.clone(),
                key: key.clone(),
            })?;

            // A binding wins over a declared default under the same key.
            input.insert(key.clone(), value.clone());
        }

        Ok(input)
    }
}
