// ABOUTME: Result emission seam for terminated workflow runs
// ABOUTME: The engine publishes results here; storage format belongs to the caller

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use crate::engine::WorkflowResult;

/// External persistence/logging collaborator. The engine hands over the full
/// structured result on termination and assumes nothing about what happens to
/// it.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn publish(&self, result: &WorkflowResult);
}

/// Keeps published results in memory; mainly for tests and embedding callers
/// that poll for outcomes.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    results: Arc<RwLock<Vec<WorkflowResult>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn results(&self) -> Vec<WorkflowResult> {
        self.results.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.results.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.results.read().await.is_empty()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn publish(&self, result: &WorkflowResult) {
        self.results.write().await.push(result.clone());
    }
}

/// Emits a one-line summary per run through `tracing`.
#[derive(Debug, Clone, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ResultSink for LogSink {
    async fn publish(&self, result: &WorkflowResult) {
        info!(
            workflow_id = %result.workflow_id,
            run_id = %result.run_id,
            status = %result.status,
            succeeded = result.metrics.succeeded_steps,
            failed = result.metrics.failed_steps,
            skipped = result.metrics.skipped_steps,
            compliance = result.metrics.compliance_score,
            "workflow result"
        );
    }
}
