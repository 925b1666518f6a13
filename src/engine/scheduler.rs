// ABOUTME: Wave-by-wave workflow scheduling with bounded concurrency
// ABOUTME: Drives step execution, skip propagation, cancellation and the final verdict

use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::bindings::VariableMapper;
use super::context::ExecutionContext;
use super::error::{ExecutionError, Result, StepFailure};
use super::executor::StepExecutor;
use super::metrics::MetricsAggregator;
use super::plan::DependencyGraph;
use super::result::{StepResult, StepStatus, WorkflowResult};
use crate::capability::CapabilityRegistry;
use crate::sink::ResultSink;
use crate::stats::{InMemoryStatsStore, StatsStore};
use crate::workflow::Workflow;

// The original engine defaulted step timeouts to 30 minutes.
const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(1800);
const DEFAULT_MAX_CONCURRENT: usize = 4;

/// Orchestrates workflow runs against a capability registry. The engine is the
/// sole mutator of workflow and step state while a run is in flight; callers
/// read the returned result after termination.
pub struct WorkflowEngine {
    registry: Arc<CapabilityRegistry>,
    stats: Arc<dyn StatsStore>,
    sink: Option<Arc<dyn ResultSink>>,
    semaphore: Arc<Semaphore>,
    default_timeout: Duration,
}

impl WorkflowEngine {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            stats: Arc::new(InMemoryStatsStore::new()),
            sink: None,
            semaphore: Arc::new(Semaphore::new(DEFAULT_MAX_CONCURRENT)),
            default_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.semaphore = Arc::new(Semaphore::new(max_concurrent));
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_stats_store(mut self, stats: Arc<dyn StatsStore>) -> Self {
        self.stats = stats;
        self
    }

    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn stats_store(&self) -> Arc<dyn StatsStore> {
        self.stats.clone()
    }

    /// Validate a workflow without executing it: definition checks plus plan
    /// construction, so cycles surface here too.
    pub fn validate_workflow(&self, workflow: &Workflow) -> Result<()> {
        workflow.validate()?;
        DependencyGraph::from_workflow(workflow)?.create_plan()?;
        Ok(())
    }

    /// Execute a workflow to termination with an internally owned
    /// cancellation scope.
    pub async fn execute_workflow(&self, workflow: &Workflow) -> Result<WorkflowResult> {
        self.execute_workflow_with_cancel(workflow, CancellationToken::new())
            .await
    }

    /// Execute a workflow; cancelling the token transitions every step not
    /// yet terminal to Skipped and the run to Cancelled. Construction-time
    /// errors return before any step starts; afterwards the call always
    /// yields a fully populated result.
    #[instrument(skip(self, workflow, cancel), fields(workflow_id = %workflow.id))]
    pub async fn execute_workflow_with_cancel(
        &self,
        workflow: &Workflow,
        cancel: CancellationToken,
    ) -> Result<WorkflowResult> {
        workflow.validate()?;
        let plan = DependencyGraph::from_workflow(workflow)?.create_plan()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let started = Instant::now();
        info!(
            %run_id,
            waves = plan.depth(),
            steps = plan.total_steps,
            max_parallelism = plan.max_parallelism(),
            "starting workflow"
        );

        let context = ExecutionContext::new(workflow.id.clone(), run_id.clone());
        context.init_steps(workflow.steps.keys().cloned()).await;

        let mut result = WorkflowResult::new(&workflow.id, &workflow.name, &run_id);
        result.status = super::result::WorkflowStatus::Running;

        let executor = Arc::new(StepExecutor::new(
            self.registry.clone(),
            self.stats.clone(),
            self.default_timeout,
        ));
        let aggregator = MetricsAggregator::new();
        let mut step_results: HashMap<String, StepResult> = HashMap::new();

        for (wave_index, wave) in plan.waves.iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            info!(wave = wave_index, steps = wave.len(), "executing wave");
            let wave_results = self
                .execute_wave(wave, workflow, &context, &executor, &cancel)
                .await?;

            for mut step_result in wave_results {
                // A step interrupted by cancellation never reached a terminal
                // state of its own; it is skipped, not failed.
                if step_result.failure == Some(StepFailure::Cancelled) {
                    step_result.status = StepStatus::Skipped;
                }

                context
                    .set_status(&step_result.step_id, step_result.status)
                    .await;
                if step_result.is_successful() {
                    context
                        .record_output(&step_result.step_id, step_result.output.clone())
                        .await;
                }

                aggregator.record_step(&step_result).await;
                step_results.insert(step_result.step_id.clone(), step_result);
            }
        }

        // Steps left behind by a cancelled run still get a terminal result.
        for (step_id, step) in &workflow.steps {
            if !step_results.contains_key(step_id) {
                let skipped =
                    StepResult::new(step_id, &step.capability).skipped(StepFailure::Cancelled);
                context.set_status(step_id, StepStatus::Skipped).await;
                aggregator.record_step(&skipped).await;
                step_results.insert(step_id.clone(), skipped);
            }
        }

        // Results in declaration order, one per step, whatever the outcome.
        result.steps = workflow
            .steps
            .keys()
            .filter_map(|id| step_results.remove(id))
            .collect();

        result.metrics = aggregator
            .finalize(
                workflow.steps.len(),
                started.elapsed(),
                workflow.estimated_duration,
            )
            .await;
        result.finalize(workflow.required_successes(), cancel.is_cancelled());

        info!(
            %run_id,
            status = %result.status,
            succeeded = result.metrics.succeeded_steps,
            failed = result.metrics.failed_steps,
            skipped = result.metrics.skipped_steps,
            "workflow terminated"
        );

        if let Some(sink) = &self.sink {
            sink.publish(&result).await;
        }

        Ok(result)
    }

    /// Run one wave: skip steps whose dependencies cannot succeed, resolve
    /// bindings, then execute the remainder concurrently. The wave completes
    /// only when every spawned step has terminated.
    async fn execute_wave(
        &self,
        wave: &[String],
        workflow: &Workflow,
        context: &ExecutionContext,
        executor: &Arc<StepExecutor>,
        cancel: &CancellationToken,
    ) -> Result<Vec<StepResult>> {
        let mut settled = Vec::new();
        let mut spawned = Vec::new();
        let mut handles = Vec::new();

        for step_id in wave {
            let step = workflow
                .get_step(step_id)
                .ok_or_else(|| ExecutionError::StepNotFound {
                    step_id: step_id.clone(),
                })?;

            if let Some(dependency) = context.first_failed_dependency(&step.depends_on).await {
                warn!(%step_id, %dependency, "skipping step, dependency did not succeed");
                context.set_status(step_id, StepStatus::Skipped).await;
                settled.push(
                    StepResult::new(step_id, &step.capability)
                        .skipped(StepFailure::DependencyFailed { dependency }),
                );
                continue;
            }

            let mut upstream_outputs = HashMap::new();
            for dependency in &step.depends_on {
                if let Some(output) = context.output_of(dependency).await {
                    upstream_outputs.insert(dependency.clone(), output);
                }
            }

            let input = match VariableMapper::resolve(step, &upstream_outputs) {
                Ok(input) => input,
                Err(failure) => {
                    warn!(%step_id, %failure, "binding resolution failed");
                    context.set_status(step_id, StepStatus::Failed).await;
                    settled.push(StepResult::new(step_id, &step.capability).failed(
                        failure,
                        0,
                        Duration::ZERO,
                    ));
                    continue;
                }
            };

            context.set_status(step_id, StepStatus::Ready).await;

            let step = step.clone();
            let capability = step.capability.clone();
            let task_step_id = step_id.clone();
            let executor = executor.clone();
            let context = context.clone();
            let cancel = cancel.clone();
            let semaphore = self.semaphore.clone();

            spawned.push((step_id.clone(), capability));
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore closed");
                executor
                    .execute(&task_step_id, &step, input, &context, &cancel)
                    .await
            }));
        }

        let joined = join_all(handles).await;
        for ((step_id, capability), outcome) in spawned.into_iter().zip(joined) {
            match outcome {
                Ok(step_result) => settled.push(step_result),
                Err(join_error) => {
                    warn!(%step_id, %join_error, "step task aborted");
                    settled.push(StepResult::new(&step_id, &capability).failed(
                        StepFailure::HandlerError {
                            message: format!("step task aborted: {join_error}"),
                        },
                        0,
                        Duration::ZERO,
                    ));
                }
            }
        }

        Ok(settled)
    }
}
