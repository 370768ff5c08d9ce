//! Shared state for one orchestrator instance.
//!
//! Instead of module-level singletons, every shared table lives in one
//! explicit context object constructed with the orchestrator and passed by
//! reference into each component. Each table sits behind its own lock; all
//! guards are short-lived and execution stays sequential.

use tokio::sync::RwLock;

use crate::data::DataManager;
use crate::diagnostics::{ErrorIntelligence, ErrorRecord};
use crate::orchestrator::OrchestratorConfig;
use crate::quality::QualityTracker;
use crate::registry::AgentRegistry;

/// Shared mutable state of one orchestrator instance.
pub struct AnalysisContext {
    /// Registered agents.
    pub registry: RwLock<AgentRegistry>,
    /// Stage data cache.
    pub data: RwLock<DataManager>,
    /// Orchestrator-level call outcomes.
    pub quality: RwLock<QualityTracker>,
    /// Classified failure history.
    pub diagnostics: RwLock<ErrorIntelligence>,
}

impl AnalysisContext {
    /// Creates fresh shared state sized from the configuration.
    pub fn new(config: &OrchestratorConfig) -> Self {
        Self {
            registry: RwLock::new(AgentRegistry::new()),
            data: RwLock::new(DataManager::new()),
            quality: RwLock::new(QualityTracker::new()),
            diagnostics: RwLock::new(ErrorIntelligence::new(config.max_error_history)),
        }
    }

    /// Records a failure in the diagnostics sink. Best-effort: recording
    /// logs and never raises.
    pub async fn record_failure(&self, record: ErrorRecord) {
        self.diagnostics.write().await.record(record);
    }
}
