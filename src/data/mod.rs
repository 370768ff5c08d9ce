//! Shared data cache and dataset resolution.
//!
//! The `DataManager` answers the question "what data should this stage
//! operate on" for every task of one workflow. Stage results are cached under
//! the stage name, loaded datasets under the well-known default key, and
//! resolution walks a fixed priority order so that later stages can run
//! against ad-hoc data without re-running the load stage.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::agent::{AgentRequest, Parameters};
use crate::error::DataError;
use crate::registry::AgentRegistry;
use crate::stage::Stage;

/// Cache key under which loaded datasets are stored by default.
pub const DEFAULT_DATA_KEY: &str = "loaded_data";

/// Returns true when a cached value carries no usable dataset.
pub fn dataset_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Insertion-ordered key/value cache shared across the stages of a workflow.
///
/// Entries are overwritten on re-set and never auto-expired; `clear` is the
/// only bulk eviction.
#[derive(Debug, Default)]
pub struct DataManager {
    entries: HashMap<String, Value>,
    order: Vec<String>,
}

impl DataManager {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under `key`, overwriting any previous entry.
    pub fn set(&mut self, key: &str, value: Value) {
        if !self.entries.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.entries.insert(key.to_string(), value);
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Returns the value stored under `key`, or `default` when absent.
    pub fn get_or_default(&self, key: &str, default: Value) -> Value {
        self.entries.get(key).cloned().unwrap_or(default)
    }

    /// Removes the entry under `key`. Returns true when an entry existed.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.order.retain(|k| k != key);
        }
        removed
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// All cached keys, in insertion order.
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    /// Number of cached entries.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Whether an entry exists under `key`.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Resolves the working dataset for a task from its parameters.
    ///
    /// Strategies are tried in priority order, first non-empty dataset wins:
    /// 1. a dataset embedded in the parameters under `data`,
    /// 2. a cache entry named by the `data_key` parameter,
    /// 3. the default cache entry (`loaded_data`),
    /// 4. a load through the registered load-stage agent from `file_path`,
    ///    caching the payload under the default key.
    ///
    /// # Errors
    ///
    /// `NoDataAvailable` when no strategy yields data, `LoaderUnavailable`
    /// when a file load is requested without a registered loader, and
    /// `LoadFailed` when the loader itself fails.
    pub async fn resolve_for_task(
        &mut self,
        parameters: &Parameters,
        registry: &AgentRegistry,
    ) -> Result<Value, DataError> {
        if let Some(inline) = parameters.get("data") {
            if !dataset_is_empty(inline) {
                debug!("Resolved dataset from inline parameters");
                return Ok(inline.clone());
            }
        }

        if let Some(key) = parameters.get("data_key").and_then(Value::as_str) {
            if let Some(value) = self.entries.get(key) {
                if !dataset_is_empty(value) {
                    debug!(key, "Resolved dataset from explicit cache key");
                    return Ok(value.clone());
                }
            }
        }

        if let Some(value) = self.entries.get(DEFAULT_DATA_KEY) {
            if !dataset_is_empty(value) {
                debug!("Resolved dataset from default cache key");
                return Ok(value.clone());
            }
        }

        if let Some(path) = parameters.get("file_path").and_then(Value::as_str) {
            let agent_name = Stage::LoadData.agent_name();
            let loader = registry.get(agent_name).ok_or(DataError::LoaderUnavailable {
                agent: agent_name.to_string(),
            })?;

            let mut load_parameters = Parameters::new();
            load_parameters.insert("file_path".to_string(), Value::String(path.to_string()));
            let request = AgentRequest::new(Stage::LoadData, Stage::LoadData.default_operation())
                .with_parameters(load_parameters);

            let report = loader
                .execute(request)
                .await
                .map_err(|e| DataError::LoadFailed {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;

            if dataset_is_empty(&report.data) {
                return Err(DataError::NoDataAvailable);
            }

            debug!(path, "Loaded dataset cached under default key");
            self.set(DEFAULT_DATA_KEY, report.data.clone());
            return Ok(report.data);
        }

        Err(DataError::NoDataAvailable)
    }
}
