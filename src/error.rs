use thiserror::Error;

use crate::execution::hooks::HookPoint;
use crate::workflow::SprintStatus;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid transition for sprint {sprint_id}: {from} -> {to}")]
    InvalidTransition {
        sprint_id: String,
        from: SprintStatus,
        to: SprintStatus,
    },

    #[error("Sprint {sprint_id} has unmet dependencies: {}", unmet.join(", "))]
    DependencyNotMet {
        sprint_id: String,
        unmet: Vec<String>,
    },

    #[error("Blocking hook failed at {point}: {message}")]
    HookBlocked { point: HookPoint, message: String },

    #[error("Step '{step}' failed after {attempts} attempt(s): {message}")]
    StepExecutionFailed {
        step: String,
        attempts: u32,
        message: String,
    },

    /// Directory location, metadata, and side-file disagree in a way the
    /// path-wins reconciliation rule cannot resolve.
    #[error("Persistence inconsistency: {0}")]
    PersistenceInconsistency(String),

    #[error("Epic not found: {0}")]
    EpicNotFound(String),

    #[error("Sprint not found: {0}")]
    SprintNotFound(String),

    #[error("No agent registered for step type: {0}")]
    AgentNotFound(String),

    #[error("Not all steps are done for sprint {0}")]
    StepsIncomplete(String),

    #[error("No step currently in progress for sprint {0}")]
    NoStepInProgress(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
