//! Structured error sink for the orchestration engine.
//!
//! Every failure, regardless of which component raised it, is classified by
//! kind and severity and retained as an [`ErrorRecord`] in a bounded history.
//! Recording is best-effort and infallible: it logs, it never raises. A
//! monotonic total survives history trimming so health reporting always sees
//! the full error volume.

use std::collections::{BTreeMap, HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::agent::Parameters;

/// Classification of a recorded failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or missing parameters, unknown stage, pipeline-order violation.
    Validation,
    /// Duplicate or missing agent registration.
    Lifecycle,
    /// An agent call failed.
    Execution,
    /// Aggregate failure across the tasks of a workflow.
    Workflow,
    /// Narrative generation or validation failed.
    Narrative,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Lifecycle => write!(f, "lifecycle"),
            ErrorKind::Execution => write!(f, "execution"),
            ErrorKind::Workflow => write!(f, "workflow"),
            ErrorKind::Narrative => write!(f, "narrative"),
        }
    }
}

/// Severity of a recorded failure. Ordering is ascending, so `>=` filters
/// select the more severe records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Logged but expected under normal operation.
    Warning,
    /// Degrades a single result.
    Minor,
    /// Fails a task or workflow.
    Major,
    /// Threatens the orchestrator's ability to continue.
    Critical,
}

/// One recorded failure. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// Failure classification.
    pub kind: ErrorKind,
    /// How damaging the failure was.
    pub severity: Severity,
    /// Worker or component the failure is attributed to.
    pub worker: String,
    /// Human-readable description.
    pub message: String,
    /// Structured context (stage, parameters, ids).
    pub context: Parameters,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
    /// Optional longer detail, e.g. a source error chain.
    pub detail: Option<String>,
}

impl ErrorRecord {
    /// Starts building a record for the given kind and worker.
    pub fn builder(kind: ErrorKind, worker: impl Into<String>) -> ErrorRecordBuilder {
        ErrorRecordBuilder {
            kind,
            worker: worker.into(),
            severity: Severity::Major,
            message: String::new(),
            context: Parameters::new(),
            detail: None,
        }
    }
}

/// Builder producing immutable [`ErrorRecord`]s.
pub struct ErrorRecordBuilder {
    kind: ErrorKind,
    worker: String,
    severity: Severity,
    message: String,
    context: Parameters,
    detail: Option<String>,
}

impl ErrorRecordBuilder {
    /// Sets the severity (defaults to major).
    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Sets the description.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Adds one context entry.
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.insert(key.into(), value);
        self
    }

    /// Sets the optional longer detail.
    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Finalizes the record, stamping the current time.
    pub fn build(self) -> ErrorRecord {
        ErrorRecord {
            kind: self.kind,
            severity: self.severity,
            worker: self.worker,
            message: self.message,
            context: self.context,
            timestamp: Utc::now(),
            detail: self.detail,
        }
    }
}

/// Aggregate view over the recorded errors, used by health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorSummary {
    /// Total errors ever recorded, including those trimmed from history.
    pub total_recorded: u64,
    /// Records currently retained.
    pub in_history: usize,
    /// Per-kind totals.
    pub by_kind: BTreeMap<String, u64>,
    /// Timestamp of the most recent record, if any.
    pub most_recent: Option<DateTime<Utc>>,
}

/// Bounded history of classified failures with filtered queries.
#[derive(Debug)]
pub struct ErrorIntelligence {
    history: VecDeque<ErrorRecord>,
    max_history: usize,
    total_recorded: u64,
    counts: HashMap<ErrorKind, u64>,
}

impl ErrorIntelligence {
    /// Creates a sink retaining at most `max_history` records.
    pub fn new(max_history: usize) -> Self {
        Self {
            history: VecDeque::new(),
            max_history,
            total_recorded: 0,
            counts: HashMap::new(),
        }
    }

    /// Records a failure. Never fails; the record is also logged.
    pub fn record(&mut self, record: ErrorRecord) {
        warn!(
            kind = %record.kind,
            severity = ?record.severity,
            worker = %record.worker,
            message = %record.message,
            "Recorded orchestration error"
        );

        self.total_recorded += 1;
        *self.counts.entry(record.kind).or_insert(0) += 1;

        self.history.push_back(record);
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }

    /// Total errors ever recorded, including trimmed ones.
    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }

    /// Number of records currently retained.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// The `n` most recent records, newest first.
    pub fn recent(&self, n: usize) -> Vec<&ErrorRecord> {
        self.history.iter().rev().take(n).collect()
    }

    /// All retained records of the given kind, oldest first.
    pub fn by_kind(&self, kind: ErrorKind) -> Vec<&ErrorRecord> {
        self.history.iter().filter(|r| r.kind == kind).collect()
    }

    /// All retained records attributed to the given worker, oldest first.
    pub fn by_worker(&self, worker: &str) -> Vec<&ErrorRecord> {
        self.history.iter().filter(|r| r.worker == worker).collect()
    }

    /// All retained records at or above the given severity, oldest first.
    pub fn at_least(&self, severity: Severity) -> Vec<&ErrorRecord> {
        self.history
            .iter()
            .filter(|r| r.severity >= severity)
            .collect()
    }

    /// Lifetime count for one kind.
    pub fn count_for(&self, kind: ErrorKind) -> u64 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    /// Aggregate summary for reporting.
    pub fn summary(&self) -> ErrorSummary {
        ErrorSummary {
            total_recorded: self.total_recorded,
            in_history: self.history.len(),
            by_kind: self
                .counts
                .iter()
                .map(|(kind, count)| (kind.to_string(), *count))
                .collect(),
            most_recent: self.history.back().map(|r| r.timestamp),
        }
    }

    /// Clears history, counts, and the lifetime total.
    pub fn clear(&mut self) {
        self.history.clear();
        self.counts.clear();
        self.total_recorded = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(kind: ErrorKind, worker: &str, severity: Severity) -> ErrorRecord {
        ErrorRecord::builder(kind, worker)
            .severity(severity)
            .message("boom")
            .build()
    }

    #[test]
    fn test_builder_produces_full_record() {
        let record = ErrorRecord::builder(ErrorKind::Execution, "anomaly_detector")
            .severity(Severity::Minor)
            .message("zscore failed on empty column")
            .context("stage", json!("detect_anomalies"))
            .detail("column 'revenue' had zero variance")
            .build();

        assert_eq!(record.kind, ErrorKind::Execution);
        assert_eq!(record.severity, Severity::Minor);
        assert_eq!(record.worker, "anomaly_detector");
        assert_eq!(record.context.get("stage"), Some(&json!("detect_anomalies")));
        assert!(record.detail.is_some());
    }

    #[test]
    fn test_history_is_bounded_but_total_is_not() {
        let mut sink = ErrorIntelligence::new(3);
        for _ in 0..10 {
            sink.record(record(ErrorKind::Execution, "predictor", Severity::Major));
        }

        assert_eq!(sink.history_len(), 3);
        assert_eq!(sink.total_recorded(), 10);
        assert_eq!(sink.count_for(ErrorKind::Execution), 10);
    }

    #[test]
    fn test_filters() {
        let mut sink = ErrorIntelligence::new(16);
        sink.record(record(ErrorKind::Validation, "router", Severity::Minor));
        sink.record(record(ErrorKind::Execution, "predictor", Severity::Major));
        sink.record(record(ErrorKind::Execution, "loader", Severity::Critical));

        assert_eq!(sink.by_kind(ErrorKind::Execution).len(), 2);
        assert_eq!(sink.by_worker("loader").len(), 1);
        assert_eq!(sink.at_least(Severity::Major).len(), 2);
        assert_eq!(sink.recent(2).len(), 2);
        assert_eq!(sink.recent(2)[0].worker, "loader");
    }

    #[test]
    fn test_summary() {
        let mut sink = ErrorIntelligence::new(16);
        assert!(sink.summary().most_recent.is_none());

        sink.record(record(ErrorKind::Workflow, "workflow_executor", Severity::Major));
        sink.record(record(ErrorKind::Workflow, "workflow_executor", Severity::Major));
        sink.record(record(ErrorKind::Narrative, "narrative", Severity::Minor));

        let summary = sink.summary();
        assert_eq!(summary.total_recorded, 3);
        assert_eq!(summary.in_history, 3);
        assert_eq!(summary.by_kind.get("workflow"), Some(&2));
        assert_eq!(summary.by_kind.get("narrative"), Some(&1));
        assert!(summary.most_recent.is_some());
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut sink = ErrorIntelligence::new(4);
        sink.record(record(ErrorKind::Lifecycle, "registry", Severity::Major));
        sink.clear();

        assert_eq!(sink.history_len(), 0);
        assert_eq!(sink.total_recorded(), 0);
        assert_eq!(sink.count_for(ErrorKind::Lifecycle), 0);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Major);
        assert!(Severity::Major > Severity::Minor);
        assert!(Severity::Minor > Severity::Warning);
    }
}
