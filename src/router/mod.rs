//! Task routing: one task in, one agent operation out.
//!
//! The router drives the per-task state machine
//! (`created → validating → routing → executing → completed | failed`),
//! validates stage-specific parameters, resolves the working dataset through
//! the data cache, dispatches the one agent operation that satisfies the
//! task, and caches the raw result under the stage name so later stages can
//! read every prior stage's output by name.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::agent::{AgentError, AgentRequest, Parameters, StageReport};
use crate::context::AnalysisContext;
use crate::data::{dataset_is_empty, DEFAULT_DATA_KEY};
use crate::diagnostics::{ErrorKind, ErrorRecord, Severity};
use crate::error::{DataError, RegistryError};
use crate::stage::{Stage, ANOMALY_METHODS};

/// Errors that can occur while routing a single task.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// Stage-specific parameter validation failed.
    #[error("Invalid parameters for stage '{stage}': {message}")]
    InvalidParameters { stage: Stage, message: String },

    /// The agent required by the stage is not registered.
    #[error("No agent registered for stage '{stage}': {source}")]
    AgentUnavailable {
        stage: Stage,
        source: RegistryError,
    },

    /// The working dataset could not be resolved.
    #[error("Data resolution failed for stage '{stage}': {source}")]
    Data { stage: Stage, source: DataError },

    /// The agent call itself failed.
    #[error("Agent '{agent}' failed during stage '{stage}': {source}")]
    Execution {
        stage: Stage,
        agent: String,
        source: AgentError,
    },
}

impl RoutingError {
    /// Failure classification for diagnostics.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RoutingError::InvalidParameters { .. } => ErrorKind::Validation,
            RoutingError::AgentUnavailable { .. } => ErrorKind::Lifecycle,
            RoutingError::Data { source, .. } => match source {
                DataError::LoaderUnavailable { .. } => ErrorKind::Lifecycle,
                DataError::LoadFailed { .. } => ErrorKind::Execution,
                DataError::NoDataAvailable => ErrorKind::Validation,
            },
            RoutingError::Execution { .. } => ErrorKind::Execution,
        }
    }

    /// Worker the failure is attributed to.
    pub fn worker(&self) -> String {
        match self {
            RoutingError::InvalidParameters { .. } => "task_router".to_string(),
            RoutingError::AgentUnavailable { stage, .. } => stage.agent_name().to_string(),
            RoutingError::Data { stage, .. } => stage.agent_name().to_string(),
            RoutingError::Execution { agent, .. } => agent.clone(),
        }
    }
}

/// Status of a routed task. Transitions are linear and terminal; retry is a
/// wrapper around the whole machine, never a state of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task record built, nothing checked yet.
    Created,
    /// Stage parameters are being validated.
    Validating,
    /// The required agent is being looked up.
    Routing,
    /// The agent operation is running.
    Executing,
    /// The agent returned a report.
    Completed,
    /// Validation, routing, or execution failed.
    Failed,
}

impl TaskStatus {
    /// Whether this status ends the task's lifecycle.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether the linear state machine permits the transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Created, TaskStatus::Validating)
                | (TaskStatus::Validating, TaskStatus::Routing)
                | (TaskStatus::Routing, TaskStatus::Executing)
                | (TaskStatus::Executing, TaskStatus::Completed)
                | (TaskStatus::Created, TaskStatus::Failed)
                | (TaskStatus::Validating, TaskStatus::Failed)
                | (TaskStatus::Routing, TaskStatus::Failed)
                | (TaskStatus::Executing, TaskStatus::Failed)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Created => write!(f, "created"),
            TaskStatus::Validating => write!(f, "validating"),
            TaskStatus::Routing => write!(f, "routing"),
            TaskStatus::Executing => write!(f, "executing"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One task of a workflow submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Pipeline stage to run.
    #[serde(rename = "type")]
    pub stage: Stage,
    /// Stage parameters.
    #[serde(default)]
    pub parameters: Parameters,
    /// Whether a failure aborts the rest of the workflow.
    #[serde(default)]
    pub critical: bool,
}

impl TaskSpec {
    /// Creates a spec for the given stage with no parameters.
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            parameters: Parameters::new(),
            critical: false,
        }
    }

    /// Adds one parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Marks the task as critical.
    pub fn mark_critical(mut self) -> Self {
        self.critical = true;
        self
    }
}

/// One invocation of a single stage, recorded in the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task id.
    pub id: String,
    /// Pipeline stage.
    pub stage: Stage,
    /// Parameters the task was submitted with.
    pub parameters: Parameters,
    /// Whether the task was marked critical.
    pub critical: bool,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// When the task record was created.
    pub created_at: DateTime<Utc>,
    /// Agent report, present once completed.
    pub report: Option<StageReport>,
    /// Failure message, present once failed.
    pub error: Option<String>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
}

impl Task {
    fn new(spec: &TaskSpec) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            stage: spec.stage,
            parameters: spec.parameters.clone(),
            critical: spec.critical,
            status: TaskStatus::Created,
            created_at: Utc::now(),
            report: None,
            error: None,
            duration_ms: 0,
        }
    }

    /// Builds an already-failed record for a spec whose routing raised.
    pub(crate) fn failed_from_spec(spec: &TaskSpec, message: impl Into<String>) -> Self {
        let mut task = Self::new(spec);
        task.status = TaskStatus::Failed;
        task.error = Some(message.into());
        task
    }

    fn advance(&mut self, next: TaskStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal task transition {} -> {}",
            self.status,
            next
        );
        self.status = next;
    }

    fn complete(&mut self, report: StageReport, duration_ms: u64) {
        self.advance(TaskStatus::Completed);
        self.report = Some(report);
        self.duration_ms = duration_ms;
    }

    fn fail(&mut self, message: String, duration_ms: u64) {
        self.advance(TaskStatus::Failed);
        self.error = Some(message);
        self.duration_ms = duration_ms;
    }
}

/// Validates the stage-specific required parameters of a submission.
///
/// Used by the router before any agent is touched and by the CLI for offline
/// validation of workflow files.
pub fn validate_task_spec(spec: &TaskSpec) -> Result<(), RoutingError> {
    let invalid = |message: &str| RoutingError::InvalidParameters {
        stage: spec.stage,
        message: message.to_string(),
    };

    if let Some(method) = spec.parameters.get("method") {
        if !method.is_string() {
            return Err(invalid("'method' must be a string"));
        }
    }

    match spec.stage {
        Stage::LoadData => {
            let has_path = spec
                .parameters
                .get("file_path")
                .and_then(Value::as_str)
                .is_some_and(|p| !p.is_empty());
            let has_inline = spec
                .parameters
                .get("data")
                .is_some_and(|d| !dataset_is_empty(d));
            if !has_path && !has_inline {
                return Err(invalid("'file_path' or inline 'data' is required"));
            }
        }
        Stage::Aggregate => {
            let group_by = spec.parameters.get("group_by");
            let usable = match group_by {
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Array(items)) => !items.is_empty(),
                _ => false,
            };
            if !usable {
                return Err(invalid("'group_by' column (or list of columns) is required"));
            }
        }
        Stage::DetectAnomalies => {
            let has_column = spec
                .parameters
                .get("column")
                .and_then(Value::as_str)
                .is_some_and(|c| !c.is_empty());
            if !has_column {
                return Err(invalid("'column' is required"));
            }
            if let Some(method) = spec.parameters.get("method").and_then(Value::as_str) {
                if !ANOMALY_METHODS.contains(&method) {
                    return Err(RoutingError::InvalidParameters {
                        stage: spec.stage,
                        message: format!(
                            "unknown anomaly method '{}': expected one of {}",
                            method,
                            ANOMALY_METHODS.join(", ")
                        ),
                    });
                }
            }
        }
        _ => {}
    }

    Ok(())
}

/// Operation dispatched to the agent: the `method` parameter when present,
/// the stage default otherwise.
fn operation_for(spec: &TaskSpec) -> String {
    spec.parameters
        .get("method")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| spec.stage.default_operation().to_string())
}

/// Routes one task to the one agent operation that satisfies it.
pub struct TaskRouter {
    ctx: Arc<AnalysisContext>,
    history: RwLock<VecDeque<Task>>,
    max_history: usize,
}

impl TaskRouter {
    /// Creates a router over the shared context, retaining at most
    /// `max_history` task records.
    pub fn new(ctx: Arc<AnalysisContext>, max_history: usize) -> Self {
        Self {
            ctx,
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Routes and executes one task.
    ///
    /// On success the completed task record (with the agent report attached)
    /// is appended to the execution history and returned. On failure the
    /// failed record is appended, an [`ErrorRecord`] is filed, and the error
    /// is returned to the caller.
    pub async fn route(&self, spec: &TaskSpec) -> Result<Task, RoutingError> {
        let started = Instant::now();
        let mut task = Task::new(spec);
        debug!(task_id = %task.id, stage = %spec.stage, "Routing task");

        match self.dispatch(spec, &mut task).await {
            Ok(report) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                task.complete(report, duration_ms);
                info!(
                    task_id = %task.id,
                    stage = %spec.stage,
                    duration_ms,
                    "Task completed"
                );
                self.push_history(task.clone()).await;
                Ok(task)
            }
            Err(err) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                task.fail(err.to_string(), duration_ms);
                self.push_history(task.clone()).await;
                self.ctx
                    .record_failure(
                        ErrorRecord::builder(err.kind(), err.worker())
                            .severity(Severity::Major)
                            .message(err.to_string())
                            .context("stage", json!(spec.stage.as_str()))
                            .context("task_id", json!(task.id.clone()))
                            .build(),
                    )
                    .await;
                Err(err)
            }
        }
    }

    /// Steps 1–4 of the routing algorithm; the caller records the outcome.
    async fn dispatch(
        &self,
        spec: &TaskSpec,
        task: &mut Task,
    ) -> Result<StageReport, RoutingError> {
        task.advance(TaskStatus::Validating);
        validate_task_spec(spec)?;

        task.advance(TaskStatus::Routing);
        let agent = {
            let registry = self.ctx.registry.read().await;
            registry
                .get_required(spec.stage.agent_name())
                .map_err(|source| RoutingError::AgentUnavailable {
                    stage: spec.stage,
                    source,
                })?
        };

        task.advance(TaskStatus::Executing);
        let dataset = self.resolve_dataset(spec).await?;

        let mut request =
            AgentRequest::new(spec.stage, operation_for(spec)).with_parameters(spec.parameters.clone());
        if let Some(dataset) = dataset {
            request = request.with_dataset(dataset);
        }

        let report = agent
            .execute(request)
            .await
            .map_err(|source| RoutingError::Execution {
                stage: spec.stage,
                agent: spec.stage.agent_name().to_string(),
                source,
            })?;

        // Cache the raw result under the stage name; the load stage also
        // refreshes the default dataset entry so the linear pipeline resolves
        // data without re-loading.
        let mut data = self.ctx.data.write().await;
        data.set(spec.stage.as_str(), report.to_value());
        if spec.stage == Stage::LoadData {
            data.set(DEFAULT_DATA_KEY, report.data.clone());
        }

        Ok(report)
    }

    /// Resolves the working dataset for the stage, when it uses one.
    ///
    /// Stages past the modelling steps consume prior stage outputs from the
    /// cache, so for them an unresolvable dataset is tolerated.
    async fn resolve_dataset(&self, spec: &TaskSpec) -> Result<Option<Value>, RoutingError> {
        if spec.stage == Stage::LoadData {
            return Ok(None);
        }

        let registry = self.ctx.registry.read().await;
        let mut data = self.ctx.data.write().await;
        match data.resolve_for_task(&spec.parameters, &registry).await {
            Ok(dataset) => Ok(Some(dataset)),
            Err(DataError::NoDataAvailable) if !spec.stage.requires_dataset() => Ok(None),
            Err(source) => Err(RoutingError::Data {
                stage: spec.stage,
                source,
            }),
        }
    }

    async fn push_history(&self, task: Task) {
        let mut history = self.history.write().await;
        history.push_back(task);
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Snapshot of the execution history, oldest first.
    pub async fn history(&self) -> Vec<Task> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Number of retained task records.
    pub async fn history_len(&self) -> usize {
        self.history.read().await.len()
    }

    /// Clears the execution history.
    pub async fn clear_history(&self) {
        self.history.write().await.clear();
    }
}
