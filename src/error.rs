//! Error types for orchestration subsystems.
//!
//! Defines per-subsystem error enums for:
//! - Agent registry lifecycle (registration, lookup)
//! - Data cache resolution
//! - Narrative integration
//!
//! Routing, workflow, configuration, and façade errors live next to the
//! components that raise them.

use thiserror::Error;

/// Errors that can occur during agent registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// An agent with the same name is already registered.
    #[error("Agent '{0}' is already registered")]
    DuplicateAgent(String),

    /// No agent with the given name is registered.
    #[error("Agent '{0}' is not registered")]
    AgentNotFound(String),

    /// The agent did not provide a usable name.
    #[error("Agent must expose a non-empty name")]
    UnnamedAgent,
}

/// Errors that can occur while resolving the working dataset for a task.
#[derive(Debug, Error)]
pub enum DataError {
    /// No resolution strategy produced a non-empty dataset.
    #[error("No data available: provide inline data, a data_key, cached loaded_data, or a file_path")]
    NoDataAvailable,

    /// A file load was requested but the loader agent is missing.
    #[error("Load agent '{agent}' is not registered")]
    LoaderUnavailable { agent: String },

    /// The loader agent failed to produce a dataset from the given path.
    #[error("Loading data from '{path}' failed: {message}")]
    LoadFailed { path: String, message: String },
}

/// Errors that can occur during narrative integration.
#[derive(Debug, Error)]
pub enum NarrativeError {
    /// No narrative generation capability was configured.
    #[error("No narrative generator is configured")]
    GeneratorUnavailable,

    /// The external capability failed to produce a narrative.
    #[error("Narrative generation failed: {0}")]
    GenerationFailed(String),

    /// The capability returned something other than a JSON object.
    #[error("Narrative output is not a JSON object")]
    MalformedOutput,
}
