//! Agent contract shared by every pluggable analysis worker.
//!
//! The orchestrator treats agents as opaque capability providers: given a
//! validated request they return a structured [`StageReport`] or fail with an
//! [`AgentError`]. How a worker computes its result is not this crate's
//! concern; the orchestrator reads only success/failure and the report's
//! quality score, and forwards everything else as opaque payload.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::stage::Stage;

/// Parameter map attached to tasks, requests, and report metadata.
pub type Parameters = serde_json::Map<String, Value>;

/// Errors an agent may raise while serving a request.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The request parameters were unusable for the operation.
    #[error("Invalid input for operation '{operation}': {message}")]
    InvalidInput { operation: String, message: String },

    /// The agent does not implement the requested operation.
    #[error("Operation '{0}' is not supported by this agent")]
    UnsupportedOperation(String),

    /// The operation needs a dataset and none was provided.
    #[error("Missing dataset for operation '{0}'")]
    MissingDataset(String),

    /// The operation itself failed.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

/// Result type alias for agent operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// A single validated request dispatched to one agent operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRequest {
    /// Pipeline stage being served.
    pub stage: Stage,
    /// Concrete operation within the stage (e.g. `iqr` for anomaly detection).
    pub operation: String,
    /// Caller-supplied parameters, forwarded verbatim.
    pub parameters: Parameters,
    /// Working dataset resolved by the orchestrator, when the stage uses one.
    pub dataset: Option<Value>,
}

impl AgentRequest {
    /// Creates a request for the given stage and operation.
    pub fn new(stage: Stage, operation: impl Into<String>) -> Self {
        Self {
            stage,
            operation: operation.into(),
            parameters: Parameters::new(),
            dataset: None,
        }
    }

    /// Attaches the full parameter map.
    pub fn with_parameters(mut self, parameters: Parameters) -> Self {
        self.parameters = parameters;
        self
    }

    /// Attaches the resolved working dataset.
    pub fn with_dataset(mut self, dataset: Value) -> Self {
        self.dataset = Some(dataset);
        self
    }

    /// Looks up a parameter by key.
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Looks up a string parameter by key.
    pub fn str_param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).and_then(Value::as_str)
    }
}

/// Uniform success envelope returned by every agent operation.
///
/// Failure travels through [`AgentError`], making the pair a discriminated
/// result rather than a shape checked by key presence. [`StageReport::to_value`]
/// converts the envelope to a generic JSON map at the orchestrator boundary
/// for cache storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageReport {
    /// Name of the worker that produced the result.
    pub worker: String,
    /// Stage the result belongs to.
    pub stage: Stage,
    /// Operation that produced the result.
    pub operation: String,
    /// Opaque result payload.
    pub data: Value,
    /// Non-fatal issues encountered while computing the result.
    pub warnings: Vec<String>,
    /// Worker-reported quality of the result, clamped to [0, 1].
    pub quality_score: f64,
    /// Additional worker-specific metadata.
    pub metadata: Parameters,
    /// When the result was produced.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock execution time reported by the worker.
    pub execution_time_ms: u64,
}

impl StageReport {
    /// Creates a report with a perfect quality score and empty metadata.
    pub fn new(
        worker: impl Into<String>,
        stage: Stage,
        operation: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            worker: worker.into(),
            stage,
            operation: operation.into(),
            data,
            warnings: Vec::new(),
            quality_score: 1.0,
            metadata: Parameters::new(),
            timestamp: Utc::now(),
            execution_time_ms: 0,
        }
    }

    /// Sets the worker-reported quality score, clamped to [0, 1].
    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = score.clamp(0.0, 1.0);
        self
    }

    /// Appends a warning.
    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Inserts a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Sets the reported execution time.
    pub fn with_execution_time(mut self, millis: u64) -> Self {
        self.execution_time_ms = millis;
        self
    }

    /// Converts the report to a generic JSON map for cache storage, marking
    /// it as successful so downstream consumers can check one field.
    pub fn to_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut value {
            map.insert("success".to_string(), Value::Bool(true));
        }
        value
    }
}

/// Contract every pluggable analysis worker must satisfy.
///
/// The `name` is checked at registration time and must be non-empty. Stateful
/// workers receive their dataset through [`AgentRequest::dataset`]; stateless
/// ones read whatever parameters they need per call.
#[async_trait]
pub trait AnalysisAgent: Send + Sync {
    /// Human-readable worker name.
    fn name(&self) -> &str;

    /// Executes one operation and returns its report.
    async fn execute(&self, request: AgentRequest) -> AgentResult<StageReport>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_builders() {
        let mut params = Parameters::new();
        params.insert("column".to_string(), json!("revenue"));

        let request = AgentRequest::new(Stage::DetectAnomalies, "zscore")
            .with_parameters(params)
            .with_dataset(json!([{"revenue": 10}]));

        assert_eq!(request.operation, "zscore");
        assert_eq!(request.str_param("column"), Some("revenue"));
        assert!(request.dataset.is_some());
        assert!(request.param("missing").is_none());
    }

    #[test]
    fn test_report_quality_clamped() {
        let report = StageReport::new("explorer", Stage::Explore, "explore", json!({}))
            .with_quality_score(1.7);
        assert!((report.quality_score - 1.0).abs() < f64::EPSILON);

        let report = StageReport::new("explorer", Stage::Explore, "explore", json!({}))
            .with_quality_score(-0.2);
        assert!((report.quality_score - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_report_to_value_marks_success() {
        let report = StageReport::new("aggregator", Stage::Aggregate, "aggregate", json!([1, 2]))
            .with_warning("two groups were empty")
            .with_metadata("groups", json!(5));

        let value = report.to_value();
        assert_eq!(value["success"], json!(true));
        assert_eq!(value["worker"], json!("aggregator"));
        assert_eq!(value["stage"], json!("aggregate"));
        assert_eq!(value["data"], json!([1, 2]));
        assert_eq!(value["metadata"]["groups"], json!(5));
    }

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::InvalidInput {
            operation: "aggregate".to_string(),
            message: "group_by column missing".to_string(),
        };
        assert!(err.to_string().contains("aggregate"));
        assert!(err.to_string().contains("group_by"));

        let err = AgentError::UnsupportedOperation("pca".to_string());
        assert!(err.to_string().contains("pca"));
    }
}
