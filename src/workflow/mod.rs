//! Workflow execution over an ordered list of tasks.
//!
//! A workflow is validated against the canonical pipeline order as a whole
//! before the first task runs, then executed strictly in submission order.
//! Each task carries a `critical` flag deciding between fail-fast and
//! continue-on-error; the finished record reports per-workflow counts and a
//! mean quality score over its completed tasks.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::context::AnalysisContext;
use crate::diagnostics::{ErrorKind, ErrorRecord, Severity};
use crate::retry::{retry_with_policy, RetryPolicy};
use crate::router::{Task, TaskRouter, TaskSpec, TaskStatus};
use crate::stage::{validate_pipeline_order, OrderViolation, Stage};

/// Errors that can occur while executing a workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The submission violated the canonical pipeline order; nothing ran.
    #[error("Workflow rejected: {0}")]
    OrderViolation(#[from] OrderViolation),

    /// A critical task failed; the remaining tasks were aborted.
    #[error("Critical task '{task_id}' (stage '{stage}') failed: {message}")]
    CriticalTaskFailed {
        workflow_id: String,
        task_id: String,
        stage: Stage,
        message: String,
    },
}

/// Status of a workflow. `created → running` and then one terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Record built, nothing validated yet.
    Created,
    /// Tasks are executing in submission order.
    Running,
    /// Every task completed.
    Completed,
    /// Some tasks completed, some failed non-critically.
    PartiallyCompleted,
    /// No task completed, or a critical task failed.
    Failed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Created => write!(f, "created"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::PartiallyCompleted => write!(f, "partially_completed"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Record of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique workflow id.
    pub id: String,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Number of submitted tasks.
    pub total_tasks: usize,
    /// Tasks that completed.
    pub completed_tasks: usize,
    /// Tasks that failed.
    pub failed_tasks: usize,
    /// Final task record per task id.
    pub results: HashMap<String, Task>,
    /// Mean quality score over the completed tasks.
    pub quality_score: f64,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Workflow {
    fn new(total_tasks: usize) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: WorkflowStatus::Created,
            total_tasks,
            completed_tasks: 0,
            failed_tasks: 0,
            results: HashMap::new(),
            quality_score: 1.0,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    fn record_success(&mut self, task: Task) {
        self.completed_tasks += 1;
        self.results.insert(task.id.clone(), task);
    }

    fn record_failure(&mut self, task: Task) {
        self.failed_tasks += 1;
        self.results.insert(task.id.clone(), task);
    }

    /// Mean quality score over completed tasks: 1.0 for an empty workflow,
    /// 0.0 when nothing completed. A completed task without a report counts
    /// as 1.0. This is deliberately distinct from the orchestrator-wide
    /// quality tracker, which scores call outcomes instead.
    fn compute_quality(&self) -> f64 {
        if self.total_tasks == 0 {
            return 1.0;
        }
        let completed: Vec<f64> = self
            .results
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.report.as_ref().map(|r| r.quality_score).unwrap_or(1.0))
            .collect();
        if completed.is_empty() {
            return 0.0;
        }
        completed.iter().sum::<f64>() / completed.len() as f64
    }

    fn finalize(&mut self) {
        self.status = if self.failed_tasks == 0 {
            WorkflowStatus::Completed
        } else if self.completed_tasks > 0 {
            WorkflowStatus::PartiallyCompleted
        } else {
            WorkflowStatus::Failed
        };
        self.quality_score = self.compute_quality();
        self.finished_at = Some(Utc::now());
    }

    fn abort(&mut self) {
        self.status = WorkflowStatus::Failed;
        self.quality_score = self.compute_quality();
        self.finished_at = Some(Utc::now());
    }
}

/// Executes ordered task lists through the router.
pub struct WorkflowExecutor {
    ctx: Arc<AnalysisContext>,
    router: Arc<TaskRouter>,
    retry: RetryPolicy,
    history: RwLock<VecDeque<Workflow>>,
    max_history: usize,
}

impl WorkflowExecutor {
    /// Creates an executor routing through `router` with the given per-task
    /// retry policy, retaining at most `max_history` workflow records.
    pub fn new(
        ctx: Arc<AnalysisContext>,
        router: Arc<TaskRouter>,
        retry: RetryPolicy,
        max_history: usize,
    ) -> Self {
        Self {
            ctx,
            router,
            retry,
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Executes the submitted tasks in order.
    ///
    /// The whole submission is checked against the canonical pipeline order
    /// first; any inversion rejects the workflow before a single task runs.
    /// Each routed task is wrapped in the retry policy. Non-critical failures
    /// are tolerated and counted; a critical failure aborts the remainder.
    pub async fn execute(&self, specs: &[TaskSpec]) -> Result<Workflow, WorkflowError> {
        let stages: Vec<Stage> = specs.iter().map(|s| s.stage).collect();
        if let Err(violation) = validate_pipeline_order(&stages) {
            self.ctx
                .record_failure(
                    ErrorRecord::builder(ErrorKind::Validation, "workflow_executor")
                        .severity(Severity::Major)
                        .message(violation.to_string())
                        .context("stages", json!(stages.iter().map(|s| s.as_str()).collect::<Vec<_>>()))
                        .build(),
                )
                .await;
            return Err(violation.into());
        }

        let mut workflow = Workflow::new(specs.len());
        workflow.status = WorkflowStatus::Running;
        info!(workflow_id = %workflow.id, total_tasks = specs.len(), "Workflow started");

        for spec in specs {
            let router = self.router.as_ref();
            let result =
                retry_with_policy(self.retry, spec.stage.as_str(), move || router.route(spec))
                    .await;

            match result {
                Ok(task) => workflow.record_success(task),
                Err(err) => {
                    let failed = Task::failed_from_spec(spec, err.to_string());
                    let task_id = failed.id.clone();
                    workflow.record_failure(failed);

                    if spec.critical {
                        workflow.abort();
                        warn!(
                            workflow_id = %workflow.id,
                            stage = %spec.stage,
                            "Critical task failed; aborting workflow"
                        );
                        self.ctx
                            .record_failure(
                                ErrorRecord::builder(ErrorKind::Workflow, "workflow_executor")
                                    .severity(Severity::Critical)
                                    .message(format!(
                                        "critical stage '{}' failed: {err}",
                                        spec.stage
                                    ))
                                    .context("workflow_id", json!(workflow.id.clone()))
                                    .build(),
                            )
                            .await;
                        let workflow_id = workflow.id.clone();
                        self.push_history(workflow).await;
                        return Err(WorkflowError::CriticalTaskFailed {
                            workflow_id,
                            task_id,
                            stage: spec.stage,
                            message: err.to_string(),
                        });
                    }
                    warn!(
                        workflow_id = %workflow.id,
                        stage = %spec.stage,
                        "Non-critical task failed; continuing"
                    );
                }
            }
        }

        workflow.finalize();
        info!(
            workflow_id = %workflow.id,
            status = %workflow.status,
            completed = workflow.completed_tasks,
            failed = workflow.failed_tasks,
            "Workflow finished"
        );

        if workflow.status == WorkflowStatus::Failed {
            self.ctx
                .record_failure(
                    ErrorRecord::builder(ErrorKind::Workflow, "workflow_executor")
                        .severity(Severity::Major)
                        .message(format!(
                            "workflow failed: {} of {} tasks failed",
                            workflow.failed_tasks, workflow.total_tasks
                        ))
                        .context("workflow_id", json!(workflow.id.clone()))
                        .build(),
                )
                .await;
        }

        self.push_history(workflow.clone()).await;
        Ok(workflow)
    }

    async fn push_history(&self, workflow: Workflow) {
        let mut history = self.history.write().await;
        history.push_back(workflow);
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Snapshot of finished workflow records, oldest first.
    pub async fn history(&self) -> Vec<Workflow> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Number of retained workflow records.
    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Clears the workflow history.
    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }
}
