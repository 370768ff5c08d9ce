//! Narrative integration over completed workflows.
//!
//! Bridges the per-stage results cached during a workflow into the role-keyed
//! shape the external narrative capability expects, invokes the capability,
//! enriches its output, and validates completeness into a derived confidence
//! score. The capability itself is an opaque collaborator behind the
//! [`NarrativeGenerator`] trait.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::context::AnalysisContext;
use crate::diagnostics::{ErrorKind, ErrorRecord, Severity};
use crate::error::NarrativeError;
use crate::stage::Stage;
use crate::workflow::Workflow;

/// Sections the generated narrative must contain to count as complete.
const REQUIRED_SECTIONS: [&str; 3] = ["executive_summary", "problem_statement", "action_plan"];

/// Per-section weight of the confidence rubric.
const SECTION_CONFIDENCE: f64 = 0.1;

/// Cap on the recommendation count feeding the confidence bonus.
const RECOMMENDATION_BONUS_CAP: u64 = 6;

/// External narrative generation capability.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Generates a narrative over the role-keyed stage results. The returned
    /// object is expected to contain `executive_summary`,
    /// `problem_statement`, `action_plan`, `full_narrative`, and
    /// `total_recommendations`.
    async fn generate(&self, input: &NarrativeInput) -> Result<Value, NarrativeError>;
}

/// Role-keyed stage results handed to the narrative capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NarrativeInput {
    /// Explore-stage payload.
    pub explorer: Value,
    /// Anomaly-detection payload.
    pub anomalies: Value,
    /// Prediction payload.
    pub predictions: Value,
    /// Recommendation payload.
    pub recommendations: Value,
    /// Dataset shape lifted from the explore report metadata, when present.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_shape: Option<Value>,
}

/// Completeness verdict and derived confidence for one narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeValidation {
    /// Whether every required section is present.
    pub complete: bool,
    /// Names of the missing sections.
    pub missing_sections: Vec<String>,
    /// Confidence score in [0, 1] from the additive rubric.
    pub confidence: f64,
}

/// Enriched narrative plus its validation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeReport {
    /// The enriched narrative object.
    pub narrative: Value,
    /// Completeness verdict.
    pub validation: NarrativeValidation,
}

/// Reshapes workflow results for the narrative capability and validates its
/// output.
pub struct NarrativeIntegrator {
    ctx: Arc<AnalysisContext>,
    generator: Arc<dyn NarrativeGenerator>,
    min_narrative_length: usize,
}

impl NarrativeIntegrator {
    /// Creates an integrator over the shared context and capability.
    pub fn new(
        ctx: Arc<AnalysisContext>,
        generator: Arc<dyn NarrativeGenerator>,
        min_narrative_length: usize,
    ) -> Self {
        Self {
            ctx,
            generator,
            min_narrative_length,
        }
    }

    /// Collects the role-keyed input from the cached stage results.
    pub async fn collect_inputs(&self) -> NarrativeInput {
        let data = self.ctx.data.read().await;

        let payload = |stage: Stage| -> Value {
            match data.get(stage.as_str()) {
                Some(Value::Object(report)) => report
                    .get("data")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(report.clone())),
                Some(other) => other.clone(),
                None => Value::Null,
            }
        };

        let data_shape = data
            .get(Stage::Explore.as_str())
            .and_then(|report| report.get("metadata"))
            .and_then(|metadata| metadata.get("shape"))
            .cloned();

        NarrativeInput {
            explorer: payload(Stage::Explore),
            anomalies: payload(Stage::DetectAnomalies),
            predictions: payload(Stage::Predict),
            recommendations: payload(Stage::Recommend),
            data_shape,
        }
    }

    /// Generates, enriches, and validates a narrative for the workflow.
    ///
    /// Incompleteness is reported in the validation verdict, not raised;
    /// only a failing or malformed generation is an error.
    pub async fn narrate(&self, workflow: &Workflow) -> Result<NarrativeReport, NarrativeError> {
        let input = self.collect_inputs().await;
        debug!(workflow_id = %workflow.id, "Generating narrative");

        let mut narrative = match self.generator.generate(&input).await {
            Ok(output) => output,
            Err(err) => {
                self.record_failure(&err).await;
                return Err(err);
            }
        };

        match &mut narrative {
            Value::Object(map) => {
                map.insert(
                    "agent_results".to_string(),
                    serde_json::to_value(&input).unwrap_or(Value::Null),
                );
                map.insert(
                    "generated_at".to_string(),
                    json!(Utc::now().to_rfc3339()),
                );
            }
            _ => {
                let err = NarrativeError::MalformedOutput;
                self.record_failure(&err).await;
                return Err(err);
            }
        }

        let validation = self.validate(&narrative);
        if !validation.complete {
            warn!(
                workflow_id = %workflow.id,
                missing = ?validation.missing_sections,
                "Narrative is incomplete"
            );
        }

        Ok(NarrativeReport {
            narrative,
            validation,
        })
    }

    /// Validates narrative completeness and derives the confidence score:
    /// +0.1 per present required section (the full narrative counts once it
    /// meets the minimum length), plus 0.1 × min(total_recommendations, 6),
    /// capped at 1.0.
    pub fn validate(&self, narrative: &Value) -> NarrativeValidation {
        let mut missing = Vec::new();
        let mut confidence = 0.0;

        for section in REQUIRED_SECTIONS {
            let present = match narrative.get(section) {
                Some(Value::String(s)) => !s.is_empty(),
                Some(Value::Null) | None => false,
                Some(_) => true,
            };
            if present {
                confidence += SECTION_CONFIDENCE;
            } else {
                missing.push(section.to_string());
            }
        }

        let narrative_long_enough = narrative
            .get("full_narrative")
            .and_then(Value::as_str)
            .is_some_and(|text| text.len() >= self.min_narrative_length);
        if narrative_long_enough {
            confidence += SECTION_CONFIDENCE;
        } else {
            missing.push("full_narrative".to_string());
        }

        let recommendations = narrative
            .get("total_recommendations")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        confidence += SECTION_CONFIDENCE * recommendations.min(RECOMMENDATION_BONUS_CAP) as f64;

        NarrativeValidation {
            complete: missing.is_empty(),
            missing_sections: missing,
            confidence: confidence.min(1.0),
        }
    }

    async fn record_failure(&self, err: &NarrativeError) {
        self.ctx
            .record_failure(
                ErrorRecord::builder(ErrorKind::Narrative, "narrative_integrator")
                    .severity(Severity::Major)
                    .message(err.to_string())
                    .build(),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::OrchestratorConfig;

    struct CannedGenerator {
        output: Value,
    }

    #[async_trait]
    impl NarrativeGenerator for CannedGenerator {
        async fn generate(&self, _input: &NarrativeInput) -> Result<Value, NarrativeError> {
            Ok(self.output.clone())
        }
    }

    struct FailingGenerator;

    #[async_trait]
    impl NarrativeGenerator for FailingGenerator {
        async fn generate(&self, _input: &NarrativeInput) -> Result<Value, NarrativeError> {
            Err(NarrativeError::GenerationFailed("model offline".to_string()))
        }
    }

    fn complete_narrative() -> Value {
        json!({
            "executive_summary": "Revenue dipped in Q3 driven by EMEA churn.",
            "problem_statement": "Churn in the EMEA region outpaced acquisition.",
            "action_plan": ["Target at-risk accounts", "Revisit pricing"],
            "full_narrative": "x".repeat(120),
            "total_recommendations": 4,
        })
    }

    async fn integrator_with(
        generator: Arc<dyn NarrativeGenerator>,
    ) -> (Arc<AnalysisContext>, NarrativeIntegrator) {
        let ctx = Arc::new(AnalysisContext::new(&OrchestratorConfig::default()));
        let integrator = NarrativeIntegrator::new(Arc::clone(&ctx), generator, 80);
        (ctx, integrator)
    }

    fn empty_workflow() -> Workflow {
        // Serde round-trip is the simplest way to fabricate a record here.
        serde_json::from_value(json!({
            "id": "wf-test",
            "status": "completed",
            "total_tasks": 0,
            "completed_tasks": 0,
            "failed_tasks": 0,
            "results": {},
            "quality_score": 1.0,
            "started_at": Utc::now().to_rfc3339(),
            "finished_at": null,
        }))
        .expect("workflow fixture should deserialize")
    }

    #[tokio::test]
    async fn test_collect_inputs_remaps_roles() {
        let (ctx, integrator) =
            integrator_with(Arc::new(CannedGenerator {
                output: complete_narrative(),
            }))
            .await;

        {
            let mut data = ctx.data.write().await;
            data.set(
                "explore",
                json!({
                    "data": {"columns": 4},
                    "metadata": {"shape": [100, 4]},
                    "success": true,
                }),
            );
            data.set("detect_anomalies", json!({"data": [{"row": 17}]}));
            data.set("recommend", json!(["raise prices"]));
        }

        let input = integrator.collect_inputs().await;
        assert_eq!(input.explorer, json!({"columns": 4}));
        assert_eq!(input.anomalies, json!([{"row": 17}]));
        assert_eq!(input.predictions, Value::Null);
        assert_eq!(input.recommendations, json!(["raise prices"]));
        assert_eq!(input.data_shape, Some(json!([100, 4])));
    }

    #[tokio::test]
    async fn test_narrate_enriches_output() {
        let (_ctx, integrator) =
            integrator_with(Arc::new(CannedGenerator {
                output: complete_narrative(),
            }))
            .await;

        let report = integrator
            .narrate(&empty_workflow())
            .await
            .expect("narration should succeed");

        assert!(report.narrative.get("agent_results").is_some());
        assert!(report.narrative.get("generated_at").is_some());
        assert!(report.validation.complete);
        // 4 sections + 4 recommendations: 0.4 + 0.4.
        assert!((report.validation.confidence - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_confidence_caps_at_one() {
        let (_ctx, integrator) =
            integrator_with(Arc::new(CannedGenerator {
                output: complete_narrative(),
            }))
            .await;

        let mut narrative = complete_narrative();
        narrative["total_recommendations"] = json!(50);
        let validation = integrator.validate(&narrative);
        assert!((validation.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_missing_sections_reported_not_raised() {
        let (_ctx, integrator) = integrator_with(Arc::new(CannedGenerator {
            output: json!({
                "executive_summary": "short summary",
                "full_narrative": "too short",
                "total_recommendations": 1,
            }),
        }))
        .await;

        let report = integrator
            .narrate(&empty_workflow())
            .await
            .expect("incomplete narrative still returns");

        assert!(!report.validation.complete);
        assert!(report
            .validation
            .missing_sections
            .contains(&"problem_statement".to_string()));
        assert!(report
            .validation
            .missing_sections
            .contains(&"full_narrative".to_string()));
        // 1 section + 1 recommendation.
        assert!((report.validation.confidence - 0.2).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_generation_failure_recorded() {
        let (ctx, integrator) = integrator_with(Arc::new(FailingGenerator)).await;

        let err = integrator.narrate(&empty_workflow()).await.unwrap_err();
        assert!(matches!(err, NarrativeError::GenerationFailed(_)));
        assert_eq!(
            ctx.diagnostics.read().await.count_for(ErrorKind::Narrative),
            1
        );
    }

    #[tokio::test]
    async fn test_non_object_output_is_malformed() {
        let (ctx, integrator) = integrator_with(Arc::new(CannedGenerator {
            output: json!(["not", "an", "object"]),
        }))
        .await;

        let err = integrator.narrate(&empty_workflow()).await.unwrap_err();
        assert!(matches!(err, NarrativeError::MalformedOutput));
        assert_eq!(
            ctx.diagnostics.read().await.count_for(ErrorKind::Narrative),
            1
        );
    }
}
