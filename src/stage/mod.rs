//! Pipeline stage vocabulary for the analysis workflow.
//!
//! Defines the nine fixed stages of the analysis pipeline, their canonical
//! execution order, and the static stage-to-agent routing table. Unknown stage
//! names fail at the parse boundary, so routing never sees an invalid stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Accepted methods for the anomaly-detection stage.
pub const ANOMALY_METHODS: [&str; 3] = ["iqr", "zscore", "isolation_forest"];

/// One stage of the fixed analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Load a dataset from a file into the cache.
    LoadData,
    /// Profile the dataset (shape, column statistics, distributions).
    Explore,
    /// Group and aggregate the dataset.
    Aggregate,
    /// Detect anomalous rows or values.
    DetectAnomalies,
    /// Fit a model and produce forecasts.
    Predict,
    /// Derive actionable recommendations.
    Recommend,
    /// Generate narrative text over prior stage outputs.
    Narrate,
    /// Render charts and visual summaries.
    Visualize,
    /// Assemble the final report artifact.
    Report,
}

impl Stage {
    /// The canonical pipeline order. Workflow submissions must not move a
    /// stage ahead of any stage that precedes it in this list.
    pub const PIPELINE: [Stage; 9] = [
        Stage::LoadData,
        Stage::Explore,
        Stage::Aggregate,
        Stage::DetectAnomalies,
        Stage::Predict,
        Stage::Recommend,
        Stage::Narrate,
        Stage::Visualize,
        Stage::Report,
    ];

    /// Position of this stage in the canonical pipeline order.
    pub fn pipeline_index(self) -> usize {
        match self {
            Stage::LoadData => 0,
            Stage::Explore => 1,
            Stage::Aggregate => 2,
            Stage::DetectAnomalies => 3,
            Stage::Predict => 4,
            Stage::Recommend => 5,
            Stage::Narrate => 6,
            Stage::Visualize => 7,
            Stage::Report => 8,
        }
    }

    /// Name of the agent that must be registered to serve this stage.
    pub fn agent_name(self) -> &'static str {
        match self {
            Stage::LoadData => "loader",
            Stage::Explore => "explorer",
            Stage::Aggregate => "aggregator",
            Stage::DetectAnomalies => "anomaly_detector",
            Stage::Predict => "predictor",
            Stage::Recommend => "recommender",
            Stage::Narrate => "narrative_generator",
            Stage::Visualize => "visualizer",
            Stage::Report => "reporter",
        }
    }

    /// Operation dispatched to the agent when the task carries no `method`
    /// parameter.
    pub fn default_operation(self) -> &'static str {
        match self {
            Stage::LoadData => "load",
            Stage::Explore => "explore",
            Stage::Aggregate => "aggregate",
            Stage::DetectAnomalies => "iqr",
            Stage::Predict => "linear",
            Stage::Recommend => "recommend",
            Stage::Narrate => "narrate",
            Stage::Visualize => "visualize",
            Stage::Report => "report",
        }
    }

    /// Whether the router must resolve a working dataset before dispatching
    /// this stage. Later stages mainly consume prior stage outputs from the
    /// cache, so a missing dataset is tolerated there.
    pub fn requires_dataset(self) -> bool {
        matches!(
            self,
            Stage::Explore | Stage::Aggregate | Stage::DetectAnomalies | Stage::Predict
        )
    }

    /// Snake-case wire form of the stage name.
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::LoadData => "load_data",
            Stage::Explore => "explore",
            Stage::Aggregate => "aggregate",
            Stage::DetectAnomalies => "detect_anomalies",
            Stage::Predict => "predict",
            Stage::Recommend => "recommend",
            Stage::Narrate => "narrate",
            Stage::Visualize => "visualize",
            Stage::Report => "report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown pipeline stage '{0}': expected one of load_data, explore, aggregate, detect_anomalies, predict, recommend, narrate, visualize, report")]
pub struct UnknownStage(pub String);

impl std::str::FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::PIPELINE
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| UnknownStage(s.to_string()))
    }
}

/// A pipeline-order inversion inside one workflow submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Stage '{stage}' at position {position} precedes '{previous}' in the canonical pipeline order")]
pub struct OrderViolation {
    /// Zero-based position of the offending task in the submission.
    pub position: usize,
    /// The stage that appeared too early.
    pub stage: Stage,
    /// The stage it was submitted after.
    pub previous: Stage,
}

/// Validates that the submitted stages respect the canonical pipeline order.
///
/// The mapped canonical indices must be non-decreasing; the first inversion
/// rejects the whole submission. This is a whole-workflow precondition: no
/// task may run before the entire list has been checked.
pub fn validate_pipeline_order(stages: &[Stage]) -> Result<(), OrderViolation> {
    for (position, window) in stages.windows(2).enumerate() {
        let (previous, current) = (window[0], window[1]);
        if current.pipeline_index() < previous.pipeline_index() {
            return Err(OrderViolation {
                position: position + 1,
                stage: current,
                previous,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_pipeline_indices_are_canonical() {
        for (idx, stage) in Stage::PIPELINE.iter().enumerate() {
            assert_eq!(stage.pipeline_index(), idx);
        }
    }

    #[test]
    fn test_stage_round_trip() {
        for stage in Stage::PIPELINE {
            let parsed = Stage::from_str(stage.as_str()).expect("known stage should parse");
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let err = Stage::from_str("transmogrify").unwrap_err();
        assert!(err.to_string().contains("transmogrify"));
    }

    #[test]
    fn test_serde_forms_match_as_str() {
        for stage in Stage::PIPELINE {
            let json = serde_json::to_string(&stage).expect("stage serializes");
            assert_eq!(json, format!("\"{}\"", stage.as_str()));
        }
    }

    #[test]
    fn test_every_stage_has_an_agent() {
        let names: std::collections::HashSet<_> =
            Stage::PIPELINE.iter().map(|s| s.agent_name()).collect();
        assert_eq!(names.len(), 9, "agent names must be distinct");
    }

    #[test]
    fn test_order_validation_accepts_sorted() {
        let stages = [Stage::LoadData, Stage::Explore, Stage::Narrate];
        assert!(validate_pipeline_order(&stages).is_ok());
    }

    #[test]
    fn test_order_validation_accepts_repeats() {
        let stages = [Stage::Explore, Stage::Explore, Stage::Predict];
        assert!(validate_pipeline_order(&stages).is_ok());
    }

    #[test]
    fn test_order_validation_rejects_inversion() {
        let stages = [Stage::Explore, Stage::LoadData];
        let violation = validate_pipeline_order(&stages).unwrap_err();
        assert_eq!(violation.position, 1);
        assert_eq!(violation.stage, Stage::LoadData);
        assert_eq!(violation.previous, Stage::Explore);
    }

    #[test]
    fn test_order_validation_empty_and_single() {
        assert!(validate_pipeline_order(&[]).is_ok());
        assert!(validate_pipeline_order(&[Stage::Report]).is_ok());
    }

    #[test]
    fn test_requires_dataset() {
        assert!(Stage::Explore.requires_dataset());
        assert!(Stage::DetectAnomalies.requires_dataset());
        assert!(!Stage::LoadData.requires_dataset());
        assert!(!Stage::Narrate.requires_dataset());
    }
}
