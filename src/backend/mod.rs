//! Storage contract for sprint and epic persistence.
//!
//! Two implementations ship: [`memory::MemoryBackend`] (ephemeral, used by
//! tests and `--memory` runs) and [`board::BoardBackend`], where the kanban
//! directory layout on disk is itself the source of truth for status.

pub mod board;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::workflow::{Epic, Sprint, SprintStatus, StepStatus, TaskPlan};

pub use board::BoardBackend;
pub use memory::MemoryBackend;

/// Parameters for creating a sprint.
#[derive(Debug, Clone, Default)]
pub struct NewSprint {
    pub goal: String,
    pub epic_id: Option<String>,
    pub kind: Option<String>,
    pub tasks: Vec<TaskPlan>,
    pub dependencies: Vec<String>,
}

/// Field-level patch for `update_sprint`. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct SprintPatch {
    pub goal: Option<String>,
    pub kind: Option<String>,
    pub tasks: Option<Vec<TaskPlan>>,
    pub dependencies: Option<Vec<String>>,
}

/// Per-step detail inside a [`StepStatusReport`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDetail {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
}

/// Progress snapshot consumed by the runner and by status-reporting tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepStatusReport {
    pub current_step: Option<String>,
    pub completed_steps: usize,
    pub total_steps: usize,
    pub progress_pct: f64,
    /// Last recorded block or rejection reason, if any.
    pub last_block_reason: Option<String>,
    pub steps: Vec<StepDetail>,
}

/// Project-wide counts for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total_epics: usize,
    pub total_sprints: usize,
    pub sprints_done: usize,
    pub sprints_in_progress: usize,
    pub sprints_blocked: usize,
    pub sprints_todo: usize,
    pub progress_pct: f64,
}

pub(crate) fn progress_pct(completed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (completed as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

/// Interface every workflow backend implements.
///
/// Lifecycle operations are atomic from the caller's point of view: they
/// validate against the transition table and step state before mutating, so
/// a failure leaves prior state intact.
#[async_trait]
pub trait WorkflowBackend: Send + Sync {
    async fn get_epic(&self, epic_id: &str) -> Result<Epic>;

    async fn get_sprint(&self, sprint_id: &str) -> Result<Sprint>;

    async fn list_epics(&self) -> Result<Vec<Epic>>;

    async fn list_sprints(&self, epic_id: Option<&str>) -> Result<Vec<Sprint>>;

    async fn create_epic(&self, title: &str, description: &str) -> Result<Epic>;

    async fn create_sprint(&self, new: NewSprint) -> Result<Sprint>;

    async fn update_sprint(&self, sprint_id: &str, patch: SprintPatch) -> Result<Sprint>;

    /// Todo -> InProgress. Materializes steps from the declared task plan and
    /// marks the first step in progress.
    async fn start_sprint(&self, sprint_id: &str) -> Result<Sprint>;

    /// Marks the in-progress step Done (recording its output) and starts the
    /// next one, if any.
    async fn advance_step(
        &self,
        sprint_id: &str,
        output: Option<serde_json::Value>,
    ) -> Result<Sprint>;

    /// InProgress/Review -> Done. Requires every step Done or Skipped.
    async fn complete_sprint(&self, sprint_id: &str) -> Result<Sprint>;

    /// InProgress -> Review. Requires every step Done or Skipped.
    async fn move_to_review(&self, sprint_id: &str) -> Result<Sprint>;

    /// Review -> InProgress, recording the rejection reason.
    async fn reject_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint>;

    /// InProgress -> Blocked with a mandatory reason.
    async fn block_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint>;

    /// Blocked -> InProgress. Clears the blocker; step progress is preserved
    /// so execution continues from the last completed step.
    async fn resume_sprint(&self, sprint_id: &str) -> Result<Sprint>;

    /// Todo -> Abandoned. Used when cancelling a sprint that never started.
    async fn abandon_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint>;

    /// Backlog -> Todo.
    async fn schedule_sprint(&self, sprint_id: &str) -> Result<Sprint>;

    /// Todo -> Backlog.
    async fn deschedule_sprint(&self, sprint_id: &str) -> Result<Sprint>;

    async fn get_step_status(&self, sprint_id: &str) -> Result<StepStatusReport>;

    async fn status_summary(&self) -> Result<StatusSummary>;

    /// Moves an epic to the archive location. A storage change, not a data
    /// change: the epic keeps its status and content.
    async fn archive_epic(&self, epic_id: &str) -> Result<()>;
}

pub(crate) fn step_status_report(sprint: &Sprint) -> StepStatusReport {
    let completed = sprint
        .steps
        .iter()
        .filter(|s| s.status == StepStatus::Done)
        .count();
    StepStatusReport {
        current_step: sprint.current_step().map(|s| s.name.clone()),
        completed_steps: completed,
        total_steps: sprint.steps.len(),
        progress_pct: progress_pct(completed, sprint.steps.len()),
        last_block_reason: sprint
            .blocker
            .clone()
            .or_else(|| sprint.rejection_reason.clone()),
        steps: sprint
            .steps
            .iter()
            .map(|s| StepDetail {
                id: s.id.clone(),
                name: s.name.clone(),
                status: s.status,
            })
            .collect(),
    }
}

pub(crate) fn summarize(epics: usize, sprints: &[Sprint]) -> StatusSummary {
    let done = sprints
        .iter()
        .filter(|s| s.status == SprintStatus::Done)
        .count();
    StatusSummary {
        total_epics: epics,
        total_sprints: sprints.len(),
        sprints_done: done,
        sprints_in_progress: sprints
            .iter()
            .filter(|s| s.status == SprintStatus::InProgress)
            .count(),
        sprints_blocked: sprints
            .iter()
            .filter(|s| s.status == SprintStatus::Blocked)
            .count(),
        sprints_todo: sprints
            .iter()
            .filter(|s| s.status == SprintStatus::Todo)
            .count(),
        progress_pct: progress_pct(done, sprints.len()),
    }
}
