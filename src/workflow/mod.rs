//! Domain model for the sprint workflow system.
//!
//! Epics group sprints; sprints carry an ordered step plan, an append-only
//! transition audit trail, and prerequisite sprint ids. Value types returned
//! by agents, hooks, and the runner live here too so every layer shares one
//! vocabulary.

pub mod transitions;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use transitions::validate_transition;

/// Epic lifecycle states, driven entirely by the statuses of owned sprints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EpicStatus {
    Todo,
    InProgress,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Epic {
    pub id: String,
    pub title: String,
    pub description: String,
    pub status: EpicStatus,
    #[serde(default)]
    pub sprint_ids: Vec<String>,
}

/// Sprint lifecycle states. The closed set of legal moves between them is
/// defined in [`transitions::VALID_TRANSITIONS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SprintStatus {
    Backlog,
    Todo,
    InProgress,
    Review,
    Done,
    Blocked,
    Abandoned,
}

impl SprintStatus {
    /// Stable wire/path name, matching the serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            SprintStatus::Backlog => "backlog",
            SprintStatus::Todo => "todo",
            SprintStatus::InProgress => "in-progress",
            SprintStatus::Review => "review",
            SprintStatus::Done => "done",
            SprintStatus::Blocked => "blocked",
            SprintStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SprintStatus::Done | SprintStatus::Abandoned)
    }
}

impl std::fmt::Display for SprintStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Todo,
    InProgress,
    Done,
    Failed,
    Skipped,
}

impl StepStatus {
    /// Done and Skipped both satisfy completion checks.
    pub fn is_complete(&self) -> bool {
        matches!(self, StepStatus::Done | StepStatus::Skipped)
    }
}

/// One ordered unit of execution within a sprint, dispatched to an agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub status: StepStatus,
    /// Agent type label resolved through the agent registry.
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Declared prerequisites within the sprint. Recorded for a future DAG
    /// scheduler; execution is sequential today.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            status: StepStatus::Todo,
            agent: agent.into(),
            output: None,
            started_at: None,
            completed_at: None,
            depends_on: Vec::new(),
        }
    }
}

/// Immutable audit record of one status change. Sprint transition lists are
/// append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub from: SprintStatus,
    pub to: SprintStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// A planned task, materialized into a [`Step`] when the sprint starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskPlan {
    pub name: String,
    /// Agent type to dispatch the resulting step to. Defaults to the task
    /// name when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
}

impl TaskPlan {
    pub fn new(name: impl Into<String>, agent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            agent: Some(agent.into()),
        }
    }

    pub fn agent_label(&self) -> &str {
        self.agent.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprint {
    pub id: String,
    pub goal: String,
    pub status: SprintStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic_id: Option<String>,
    /// Sprint kind label (backend, frontend, fullstack, infrastructure,
    /// research); drives the default gate thresholds.
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub tasks: Vec<TaskPlan>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub transitions: Vec<Transition>,
    /// Prerequisite sprint ids that must be Done before this sprint starts.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

fn default_kind() -> String {
    "fullstack".to_string()
}

impl Sprint {
    /// The step currently in progress, if any. At most one step per sprint
    /// is in progress at a time.
    pub fn current_step(&self) -> Option<&Step> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
    }

    /// Index of the first step that is neither Done nor Skipped.
    pub fn first_incomplete_step(&self) -> Option<usize> {
        self.steps.iter().position(|s| !s.status.is_complete())
    }

    pub fn all_steps_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status.is_complete())
    }
}

/// Result of one agent execution. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub success: bool,
    pub output: String,
    #[serde(default)]
    pub files_modified: Vec<String>,
    #[serde(default)]
    pub files_created: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_results: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coverage: Option<f64>,
    /// "approve" or "request_changes", when the agent acted as a reviewer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_verdict: Option<String>,
    #[serde(default)]
    pub deferred_items: Vec<String>,
}

impl AgentResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            files_modified: Vec::new(),
            files_created: Vec::new(),
            test_results: None,
            coverage: None,
            review_verdict: None,
            deferred_items: Vec::new(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            ..Self::ok(output)
        }
    }
}

/// Outcome of one hook evaluation.
#[derive(Debug, Clone)]
pub struct HookResult {
    pub passed: bool,
    pub message: String,
    pub blocking: bool,
    pub deferred_items: Vec<String>,
}

impl HookResult {
    pub fn pass(message: impl Into<String>) -> Self {
        Self {
            passed: true,
            message: message.into(),
            blocking: true,
            deferred_items: Vec::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
            blocking: true,
            deferred_items: Vec::new(),
        }
    }

    pub fn advisory(mut self) -> Self {
        self.blocking = false;
        self
    }

    pub fn with_deferred(mut self, items: Vec<String>) -> Self {
        self.deferred_items = items;
        self
    }
}

/// Summary of one run/resume pass. Returned to the caller, never persisted.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub sprint_id: String,
    pub success: bool,
    pub steps_completed: usize,
    pub steps_total: usize,
    /// Agent results in execution order for this pass.
    pub agent_results: Vec<AgentResult>,
    /// Deferred notes aggregated from agents and advisory hooks.
    pub deferred_items: Vec<String>,
    pub duration: std::time::Duration,
    pub stopped_at_review: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_step_is_the_single_in_progress_step() {
        let mut sprint = Sprint {
            id: "s-1".into(),
            goal: "goal".into(),
            status: SprintStatus::InProgress,
            epic_id: None,
            kind: "backend".into(),
            tasks: vec![],
            steps: vec![
                Step::new("step-1", "design", "product_engineer"),
                Step::new("step-2", "implement", "product_engineer"),
            ],
            transitions: vec![],
            dependencies: vec![],
            blocker: None,
            rejection_reason: None,
            created_at: None,
            started_at: None,
            completed_at: None,
        };
        assert!(sprint.current_step().is_none());

        sprint.steps[1].status = StepStatus::InProgress;
        assert_eq!(sprint.current_step().map(|s| s.id.as_str()), Some("step-2"));
    }

    #[test]
    fn first_incomplete_skips_done_and_skipped() {
        let mut a = Step::new("step-1", "a", "t");
        let mut b = Step::new("step-2", "b", "t");
        let c = Step::new("step-3", "c", "t");
        a.status = StepStatus::Done;
        b.status = StepStatus::Skipped;

        let sprint = Sprint {
            id: "s-1".into(),
            goal: String::new(),
            status: SprintStatus::InProgress,
            epic_id: None,
            kind: "backend".into(),
            tasks: vec![],
            steps: vec![a, b, c],
            transitions: vec![],
            dependencies: vec![],
            blocker: None,
            rejection_reason: None,
            created_at: None,
            started_at: None,
            completed_at: None,
        };
        assert_eq!(sprint.first_incomplete_step(), Some(2));
        assert!(!sprint.all_steps_complete());
    }

    #[test]
    fn status_round_trips_through_path_names() {
        for status in [
            SprintStatus::Backlog,
            SprintStatus::Todo,
            SprintStatus::InProgress,
            SprintStatus::Review,
            SprintStatus::Done,
            SprintStatus::Blocked,
            SprintStatus::Abandoned,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json.trim_matches('"'), status.as_str());
        }
    }
}
