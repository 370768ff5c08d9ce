//! Orchestrator façade composing the full engine.
//!
//! One `Orchestrator` owns the shared context (registry, cache, quality,
//! diagnostics), the task router, the workflow executor, and optionally a
//! narrative integrator. Public operations wrap agent dispatch in the retry
//! policy and update the quality tracker exactly once per call, so the score
//! reflects orchestrator-level outcomes rather than internal retries.

mod config;

pub use config::{ConfigError, OrchestratorConfig};

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::agent::AnalysisAgent;
use crate::context::AnalysisContext;
use crate::diagnostics::{ErrorKind, ErrorRecord};
use crate::error::{NarrativeError, RegistryError};
use crate::narrative::{NarrativeGenerator, NarrativeIntegrator, NarrativeReport};
use crate::quality::{health_score, CallOutcome, HealthLabel};
use crate::retry::retry_with_policy;
use crate::router::{RoutingError, Task, TaskRouter, TaskSpec};
use crate::workflow::{Workflow, WorkflowError, WorkflowExecutor, WorkflowStatus};

/// Errors surfaced by the orchestrator façade.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Agent registration or lookup failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A directly executed task failed after retry exhaustion.
    #[error("Task execution failed: {0}")]
    Routing(#[from] RoutingError),

    /// A workflow was rejected or aborted.
    #[error("Workflow failed: {0}")]
    Workflow(#[from] WorkflowError),

    /// Narrative integration failed.
    #[error("Narrative integration failed: {0}")]
    Narrative(#[from] NarrativeError),
}

/// A completed workflow together with its generated narrative.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRun {
    /// The executed workflow record.
    pub workflow: Workflow,
    /// The narrative produced over its cached results.
    pub narrative: NarrativeReport,
}

/// Point-in-time snapshot of the orchestrator's state.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    /// Registered agent names, in registration order.
    pub registered_agents: Vec<String>,
    /// Cached data keys, in insertion order.
    pub cached_keys: Vec<String>,
    /// Task records currently retained.
    pub tasks_recorded: usize,
    /// Workflow records currently retained.
    pub workflows_recorded: usize,
    /// Current quality score.
    pub quality_score: f64,
    /// Total errors ever recorded.
    pub errors_recorded: u64,
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
}

/// Health snapshot combining quality outcomes and error volume.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Health score in [0, 100].
    pub health_score: f64,
    /// Qualitative label for the health score.
    pub label: HealthLabel,
    /// Quality score in [0, 1].
    pub quality_score: f64,
    /// Successful orchestrator-level calls.
    pub successful_calls: u64,
    /// Partially successful calls.
    pub partial_calls: u64,
    /// Failed calls.
    pub failed_calls: u64,
    /// Total errors ever recorded.
    pub errors_recorded: u64,
    /// Lifetime error counts per kind.
    pub errors_by_kind: BTreeMap<String, u64>,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

/// Façade over the orchestration engine.
pub struct Orchestrator {
    config: OrchestratorConfig,
    ctx: Arc<AnalysisContext>,
    router: Arc<TaskRouter>,
    executor: WorkflowExecutor,
    narrative: Option<NarrativeIntegrator>,
}

impl Orchestrator {
    /// Creates an orchestrator from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the configuration fails validation.
    pub fn new(config: OrchestratorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let ctx = Arc::new(AnalysisContext::new(&config));
        let router = Arc::new(TaskRouter::new(Arc::clone(&ctx), config.max_task_history));
        let executor = WorkflowExecutor::new(
            Arc::clone(&ctx),
            Arc::clone(&router),
            config.retry_policy(),
            config.max_workflow_history,
        );

        Ok(Self {
            config,
            ctx,
            router,
            executor,
            narrative: None,
        })
    }

    /// Attaches the external narrative generation capability, enabling
    /// [`execute_workflow_with_narrative`](Self::execute_workflow_with_narrative).
    pub fn with_narrative_generator(mut self, generator: Arc<dyn NarrativeGenerator>) -> Self {
        self.narrative = Some(NarrativeIntegrator::new(
            Arc::clone(&self.ctx),
            generator,
            self.config.min_narrative_length,
        ));
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The shared context (registry, cache, quality, diagnostics).
    pub fn context(&self) -> &Arc<AnalysisContext> {
        &self.ctx
    }

    /// Registers an agent under the given name.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` on duplicate names or unnamed agents; the
    /// failure is also filed with diagnostics.
    pub async fn register_agent(
        &self,
        name: &str,
        agent: Arc<dyn AnalysisAgent>,
    ) -> Result<(), RegistryError> {
        let result = {
            let mut registry = self.ctx.registry.write().await;
            registry.register(name, agent)
        };

        match result {
            Ok(()) => {
                info!(agent = name, "Agent registered");
                Ok(())
            }
            Err(err) => {
                self.ctx
                    .record_failure(
                        ErrorRecord::builder(ErrorKind::Lifecycle, name)
                            .message(err.to_string())
                            .build(),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Stores a dataset in the shared cache.
    pub async fn cache_dataset(&self, key: &str, value: Value) {
        self.ctx.data.write().await.set(key, value);
    }

    /// Executes one task through the router, wrapped in the retry policy.
    ///
    /// # Errors
    ///
    /// Returns the routing error after retry exhaustion, wrapped in
    /// `OrchestratorError` and carrying the original message.
    pub async fn execute_task(&self, spec: &TaskSpec) -> Result<Task, OrchestratorError> {
        let router = self.router.as_ref();
        let result = retry_with_policy(self.config.retry_policy(), spec.stage.as_str(), move || {
            router.route(spec)
        })
        .await;

        match result {
            Ok(task) => {
                self.record_outcome(CallOutcome::Success).await;
                Ok(task)
            }
            Err(err) => {
                self.record_outcome(CallOutcome::Failure).await;
                Err(err.into())
            }
        }
    }

    /// Executes an ordered workflow submission.
    ///
    /// # Errors
    ///
    /// Returns `WorkflowError` for order violations (nothing ran) and
    /// critical-task aborts, wrapped in `OrchestratorError`.
    pub async fn execute_workflow(
        &self,
        specs: &[TaskSpec],
    ) -> Result<Workflow, OrchestratorError> {
        let result = self.executor.execute(specs).await;

        match &result {
            Ok(workflow) => {
                self.record_outcome(workflow_outcome(workflow.status)).await;
            }
            Err(_) => {
                self.record_outcome(CallOutcome::Failure).await;
            }
        }

        result.map_err(Into::into)
    }

    /// Executes a workflow and then narrates its cached results in one call.
    ///
    /// # Errors
    ///
    /// Fails when no narrative generator is configured, when the workflow is
    /// rejected or aborted, or when narrative generation fails.
    pub async fn execute_workflow_with_narrative(
        &self,
        specs: &[TaskSpec],
    ) -> Result<AnalysisRun, OrchestratorError> {
        let Some(integrator) = &self.narrative else {
            self.record_outcome(CallOutcome::Failure).await;
            return Err(NarrativeError::GeneratorUnavailable.into());
        };

        let workflow = match self.executor.execute(specs).await {
            Ok(workflow) => workflow,
            Err(err) => {
                self.record_outcome(CallOutcome::Failure).await;
                return Err(err.into());
            }
        };

        match integrator.narrate(&workflow).await {
            Ok(narrative) => {
                let outcome = match workflow.status {
                    WorkflowStatus::Completed if narrative.validation.complete => {
                        CallOutcome::Success
                    }
                    WorkflowStatus::Failed => CallOutcome::Failure,
                    _ => CallOutcome::Partial,
                };
                self.record_outcome(outcome).await;
                Ok(AnalysisRun {
                    workflow,
                    narrative,
                })
            }
            Err(err) => {
                // The workflow itself may have succeeded; the call as a
                // whole did not produce its deliverable.
                let outcome = if workflow.status == WorkflowStatus::Completed {
                    CallOutcome::Partial
                } else {
                    CallOutcome::Failure
                };
                self.record_outcome(outcome).await;
                Err(err.into())
            }
        }
    }

    /// Snapshot of registered agents, cache keys, histories, and scores.
    pub async fn status(&self) -> OrchestratorStatus {
        let registered_agents = self.ctx.registry.read().await.names().to_vec();
        let cached_keys = self.ctx.data.read().await.keys().to_vec();
        let quality_score = self.ctx.quality.read().await.score();
        let errors_recorded = self.ctx.diagnostics.read().await.total_recorded();

        OrchestratorStatus {
            registered_agents,
            cached_keys,
            tasks_recorded: self.router.history_len().await,
            workflows_recorded: self.executor.history_len().await,
            quality_score,
            errors_recorded,
            generated_at: Utc::now(),
        }
    }

    /// Health report combining the quality score with the error volume.
    pub async fn health_report(&self) -> HealthReport {
        let quality = self.ctx.quality.read().await.clone();
        let summary = self.ctx.diagnostics.read().await.summary();

        let quality_score = quality.score();
        let health = health_score(quality_score, summary.total_recorded);

        HealthReport {
            health_score: health,
            label: HealthLabel::from_score(health),
            quality_score,
            successful_calls: quality.successful(),
            partial_calls: quality.partial(),
            failed_calls: quality.failed(),
            errors_recorded: summary.total_recorded,
            errors_by_kind: summary.by_kind,
            generated_at: Utc::now(),
        }
    }

    /// Clears the data cache, histories, quality counters, and diagnostics.
    /// Registered agents are preserved.
    pub async fn reset(&self) {
        self.ctx.data.write().await.clear();
        self.router.clear_history().await;
        self.executor.clear_history().await;
        self.ctx.quality.write().await.reset();
        self.ctx.diagnostics.write().await.clear();
        info!("Orchestrator state reset; registered agents preserved");
    }

    /// Takes a final health snapshot, then resets the engine.
    pub async fn shutdown(&self) -> HealthReport {
        let report = self.health_report().await;
        self.reset().await;
        info!(
            health = report.health_score,
            label = %report.label,
            "Orchestrator shut down"
        );
        report
    }

    /// Snapshot of the task execution history, oldest first.
    pub async fn execution_history(&self) -> Vec<Task> {
        self.router.history().await
    }

    /// Snapshot of the workflow history, oldest first.
    pub async fn workflow_history(&self) -> Vec<Workflow> {
        self.executor.history().await
    }

    async fn record_outcome(&self, outcome: CallOutcome) {
        self.ctx.quality.write().await.record(outcome);
    }
}

/// Maps a terminal workflow status to the call outcome recorded for it.
fn workflow_outcome(status: WorkflowStatus) -> CallOutcome {
    match status {
        WorkflowStatus::Completed => CallOutcome::Success,
        WorkflowStatus::PartiallyCompleted => CallOutcome::Partial,
        _ => CallOutcome::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_outcome_mapping() {
        assert_eq!(
            workflow_outcome(WorkflowStatus::Completed),
            CallOutcome::Success
        );
        assert_eq!(
            workflow_outcome(WorkflowStatus::PartiallyCompleted),
            CallOutcome::Partial
        );
        assert_eq!(workflow_outcome(WorkflowStatus::Failed), CallOutcome::Failure);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = OrchestratorConfig::new().with_retry_attempts(0);
        assert!(Orchestrator::new(config).is_err());
    }

    #[tokio::test]
    async fn test_fresh_orchestrator_is_healthy() {
        let orchestrator =
            Orchestrator::new(OrchestratorConfig::default()).expect("default config is valid");

        let report = orchestrator.health_report().await;
        assert!((report.health_score - 100.0).abs() < f64::EPSILON);
        assert_eq!(report.label, HealthLabel::Healthy);
        assert_eq!(report.errors_recorded, 0);

        let status = orchestrator.status().await;
        assert!(status.registered_agents.is_empty());
        assert!(status.cached_keys.is_empty());
        assert!((status.quality_score - 1.0).abs() < f64::EPSILON);
    }
}
