//! Per-sprint execution state, stored as JSON beside the board.
//!
//! The markdown document owns status and the audit trail; the side-file owns
//! fine-grained step progress so the runner can resume mid-sprint after a
//! crash. Lives at `.cadence/sprint-N-state.json` under the project root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Result, WorkflowError};
use crate::workflow::Step;

pub const STATE_DIR: &str = ".cadence";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SprintStateFile {
    pub sprint_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    /// Every review rejection, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejection_history: Vec<RejectionRecord>,
}

pub fn state_path(root: &Path, sprint_number: u32) -> PathBuf {
    root.join(STATE_DIR)
        .join(format!("sprint-{sprint_number}-state.json"))
}

/// `Ok(None)` when no side-file exists; a present but unreadable file is an
/// inconsistency, not a fresh start.
pub async fn read(root: &Path, sprint_number: u32) -> Result<Option<SprintStateFile>> {
    let path = state_path(root, sprint_number);
    match fs::read_to_string(&path).await {
        Ok(content) => serde_json::from_str(&content).map(Some).map_err(|e| {
            WorkflowError::PersistenceInconsistency(format!(
                "unreadable state file {}: {e}",
                path.display()
            ))
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub async fn write(root: &Path, sprint_number: u32, state: &SprintStateFile) -> Result<()> {
    let path = state_path(root, sprint_number);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(state)?;
    fs::write(&path, format!("{json}\n")).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::StepStatus;

    #[tokio::test]
    async fn round_trips_step_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let mut step = Step::new("step-1", "design", "architect");
        step.status = StepStatus::Done;

        let state = SprintStateFile {
            sprint_id: "s-4".into(),
            status: "in-progress".into(),
            steps: vec![step, Step::new("step-2", "implement", "product_engineer")],
            ..Default::default()
        };
        write(tmp.path(), 4, &state).await.unwrap();

        let loaded = read(tmp.path(), 4).await.unwrap().unwrap();
        assert_eq!(loaded.sprint_id, "s-4");
        assert_eq!(loaded.steps.len(), 2);
        assert_eq!(loaded.steps[0].status, StepStatus::Done);
    }

    #[tokio::test]
    async fn missing_file_is_none_but_garbage_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(read(tmp.path(), 9).await.unwrap().is_none());

        let path = state_path(tmp.path(), 9);
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, "not json").await.unwrap();

        let err = read(tmp.path(), 9).await.unwrap_err();
        assert!(matches!(err, WorkflowError::PersistenceInconsistency(_)));
    }
}
