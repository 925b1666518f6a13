// ABOUTME: Shared execution state for a single workflow run
// ABOUTME: Step statuses and finalized outputs behind a read-write lock

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::result::StepStatus;
use crate::capability::Payload;

/// Run-scoped context. The scheduler is the only writer; the variable mapper
/// and callers observing progress only read.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    shared: Arc<RwLock<SharedRunState>>,
}

#[derive(Debug, Default)]
struct SharedRunState {
    statuses: HashMap<String, StepStatus>,
    /// Outputs of terminal-successful steps only; upstream results are
    /// finalized before any dependent wave reads them.
    outputs: HashMap<String, Payload>,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            run_id: run_id.into(),
            started_at: Utc::now(),
            shared: Arc::new(RwLock::new(SharedRunState::default())),
        }
    }

    pub async fn init_steps<I, S>(&self, step_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.shared.write().await;
        for step_id in step_ids {
            state.statuses.insert(step_id.into(), StepStatus::Pending);
        }
    }

    pub async fn status_of(&self, step_id: &str) -> Option<StepStatus> {
        self.shared.read().await.statuses.get(step_id).copied()
    }

    pub async fn set_status(&self, step_id: &str, status: StepStatus) {
        let mut state = self.shared.write().await;
        state.statuses.insert(step_id.to_string(), status);
    }

    pub async fn record_output(&self, step_id: &str, output: Payload) {
        let mut state = self.shared.write().await;
        state.outputs.insert(step_id.to_string(), output);
    }

    pub async fn output_of(&self, step_id: &str) -> Option<Payload> {
        self.shared.read().await.outputs.get(step_id).cloned()
    }

    /// True when every listed dependency is terminal-successful.
    pub async fn dependencies_succeeded(&self, dependencies: &[String]) -> bool {
        let state = self.shared.read().await;
        dependencies
            .iter()
            .all(|dep| state.statuses.get(dep) == Some(&StepStatus::Succeeded))
    }

    /// First listed dependency that can no longer succeed, if any.
    pub async fn first_failed_dependency(&self, dependencies: &[String]) -> Option<String> {
        let state = self.shared.read().await;
        dependencies
            .iter()
            .find(|dep| {
                matches!(
                    state.statuses.get(dep.as_str()),
                    Some(StepStatus::Failed) | Some(StepStatus::Skipped) | None
                )
            })
            .cloned()
    }

    pub async fn non_terminal_steps(&self) -> Vec<String> {
        let state = self.shared.read().await;
        state
            .statuses
            .iter()
            .filter(|(_, status)| !status.is_terminal())
            .map(|(id, _)| id.clone())
            .collect()
    }
}
