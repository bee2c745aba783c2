//! In-memory workflow backend for tests and demos.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;

use crate::error::{Result, WorkflowError};
use crate::workflow::{
    validate_transition, Epic, EpicStatus, Sprint, SprintStatus, Step, StepStatus, Transition,
};

use super::{
    step_status_report, summarize, NewSprint, SprintPatch, StatusSummary, StepStatusReport,
    WorkflowBackend,
};

#[derive(Default)]
struct State {
    epics: BTreeMap<String, Epic>,
    sprints: BTreeMap<String, Sprint>,
    archived_epics: HashSet<String>,
    next_epic: u32,
    next_sprint: u32,
}

/// Backend backed by maps. Nothing survives the process.
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_epic: 1,
                next_sprint: 1,
                ..State::default()
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Epic status is derived from its sprints: any active sprint makes it
/// in-progress, all sprints done completes it.
fn derive_epic_status(epic: &Epic, sprints: &BTreeMap<String, Sprint>) -> EpicStatus {
    let owned: Vec<&Sprint> = epic
        .sprint_ids
        .iter()
        .filter_map(|id| sprints.get(id))
        .collect();
    if owned.is_empty() {
        return EpicStatus::Todo;
    }
    if owned.iter().all(|s| s.status == SprintStatus::Done) {
        return EpicStatus::Done;
    }
    if owned.iter().any(|s| {
        matches!(
            s.status,
            SprintStatus::InProgress | SprintStatus::Review | SprintStatus::Blocked
        )
    }) {
        return EpicStatus::InProgress;
    }
    EpicStatus::Todo
}

fn record_transition(sprint: &mut Sprint, to: SprintStatus, reason: Option<&str>) {
    sprint.transitions.push(Transition {
        from: sprint.status,
        to,
        timestamp: Utc::now(),
        reason: reason.map(String::from),
    });
    sprint.status = to;
}

impl State {
    fn sprint(&self, id: &str) -> Result<&Sprint> {
        self.sprints
            .get(id)
            .ok_or_else(|| WorkflowError::SprintNotFound(id.to_string()))
    }

    fn sprint_mut(&mut self, id: &str) -> Result<&mut Sprint> {
        self.sprints
            .get_mut(id)
            .ok_or_else(|| WorkflowError::SprintNotFound(id.to_string()))
    }
}

#[async_trait]
impl WorkflowBackend for MemoryBackend {
    async fn get_epic(&self, epic_id: &str) -> Result<Epic> {
        let state = self.state.lock().await;
        let mut epic = state
            .epics
            .get(epic_id)
            .cloned()
            .ok_or_else(|| WorkflowError::EpicNotFound(epic_id.to_string()))?;
        epic.status = derive_epic_status(&epic, &state.sprints);
        Ok(epic)
    }

    async fn get_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let state = self.state.lock().await;
        state.sprint(sprint_id).cloned()
    }

    async fn list_epics(&self) -> Result<Vec<Epic>> {
        let state = self.state.lock().await;
        Ok(state
            .epics
            .values()
            .filter(|e| !state.archived_epics.contains(&e.id))
            .map(|e| {
                let mut epic = e.clone();
                epic.status = derive_epic_status(e, &state.sprints);
                epic
            })
            .collect())
    }

    async fn list_sprints(&self, epic_id: Option<&str>) -> Result<Vec<Sprint>> {
        let state = self.state.lock().await;
        Ok(state
            .sprints
            .values()
            .filter(|s| epic_id.is_none() || s.epic_id.as_deref() == epic_id)
            .cloned()
            .collect())
    }

    async fn create_epic(&self, title: &str, description: &str) -> Result<Epic> {
        let mut state = self.state.lock().await;
        let id = format!("e-{}", state.next_epic);
        state.next_epic += 1;
        let epic = Epic {
            id: id.clone(),
            title: title.to_string(),
            description: description.to_string(),
            status: EpicStatus::Todo,
            sprint_ids: Vec::new(),
        };
        state.epics.insert(id, epic.clone());
        Ok(epic)
    }

    async fn create_sprint(&self, new: NewSprint) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        if let Some(epic_id) = &new.epic_id {
            if !state.epics.contains_key(epic_id) {
                return Err(WorkflowError::EpicNotFound(epic_id.clone()));
            }
        }
        let id = format!("s-{}", state.next_sprint);
        state.next_sprint += 1;
        let sprint = Sprint {
            id: id.clone(),
            goal: new.goal,
            status: SprintStatus::Todo,
            epic_id: new.epic_id.clone(),
            kind: new.kind.unwrap_or_else(|| "fullstack".to_string()),
            tasks: new.tasks,
            steps: Vec::new(),
            transitions: Vec::new(),
            dependencies: new.dependencies,
            blocker: None,
            rejection_reason: None,
            created_at: Some(Utc::now()),
            started_at: None,
            completed_at: None,
        };
        if let Some(epic_id) = &new.epic_id {
            if let Some(epic) = state.epics.get_mut(epic_id) {
                epic.sprint_ids.push(id.clone());
            }
        }
        state.sprints.insert(id, sprint.clone());
        Ok(sprint)
    }

    async fn update_sprint(&self, sprint_id: &str, patch: SprintPatch) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        if let Some(goal) = patch.goal {
            sprint.goal = goal;
        }
        if let Some(kind) = patch.kind {
            sprint.kind = kind;
        }
        if let Some(tasks) = patch.tasks {
            sprint.tasks = tasks;
        }
        if let Some(dependencies) = patch.dependencies {
            sprint.dependencies = dependencies;
        }
        Ok(sprint.clone())
    }

    async fn start_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;

        // Every prerequisite must be Done; report the full unmet list.
        let dependencies = state.sprint(sprint_id)?.dependencies.clone();
        let unmet: Vec<String> = dependencies
            .into_iter()
            .filter(|dep| {
                state
                    .sprints
                    .get(dep)
                    .map(|s| s.status != SprintStatus::Done)
                    .unwrap_or(true)
            })
            .collect();
        if !unmet.is_empty() {
            return Err(WorkflowError::DependencyNotMet {
                sprint_id: sprint_id.to_string(),
                unmet,
            });
        }

        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::InProgress)?;

        if sprint.steps.is_empty() {
            sprint.steps = sprint
                .tasks
                .iter()
                .enumerate()
                .map(|(i, task)| {
                    Step::new(format!("step-{}", i + 1), &task.name, task.agent_label())
                })
                .collect();
        }
        if let Some(first) = sprint.steps.first_mut() {
            first.status = StepStatus::InProgress;
            first.started_at = Some(Utc::now());
        }
        sprint.started_at = Some(Utc::now());
        record_transition(sprint, SprintStatus::InProgress, None);
        Ok(sprint.clone())
    }

    async fn advance_step(
        &self,
        sprint_id: &str,
        output: Option<serde_json::Value>,
    ) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        let idx = sprint
            .steps
            .iter()
            .position(|s| s.status == StepStatus::InProgress)
            .ok_or_else(|| WorkflowError::NoStepInProgress(sprint_id.to_string()))?;

        let step = &mut sprint.steps[idx];
        step.status = StepStatus::Done;
        step.completed_at = Some(Utc::now());
        step.output = output;

        if let Some(next) = sprint.steps.get_mut(idx + 1) {
            next.status = StepStatus::InProgress;
            next.started_at = Some(Utc::now());
        }
        Ok(sprint.clone())
    }

    async fn complete_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::Done)?;
        if !sprint.all_steps_complete() {
            return Err(WorkflowError::StepsIncomplete(sprint_id.to_string()));
        }
        sprint.completed_at = Some(Utc::now());
        record_transition(sprint, SprintStatus::Done, None);
        Ok(sprint.clone())
    }

    async fn move_to_review(&self, sprint_id: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::Review)?;
        if !sprint.all_steps_complete() {
            return Err(WorkflowError::StepsIncomplete(sprint_id.to_string()));
        }
        record_transition(sprint, SprintStatus::Review, None);
        Ok(sprint.clone())
    }

    async fn reject_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::InProgress)?;
        sprint.rejection_reason = Some(reason.to_string());
        record_transition(sprint, SprintStatus::InProgress, Some(reason));
        Ok(sprint.clone())
    }

    async fn block_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::Blocked)?;
        sprint.blocker = Some(reason.to_string());
        record_transition(sprint, SprintStatus::Blocked, Some(reason));
        Ok(sprint.clone())
    }

    async fn resume_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::InProgress)?;
        sprint.blocker = None;
        // Continue from the last completed step.
        if sprint.current_step().is_none() {
            if let Some(idx) = sprint.first_incomplete_step() {
                sprint.steps[idx].status = StepStatus::InProgress;
                sprint.steps[idx].started_at = Some(Utc::now());
            }
        }
        record_transition(sprint, SprintStatus::InProgress, None);
        Ok(sprint.clone())
    }

    async fn abandon_sprint(&self, sprint_id: &str, reason: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::Abandoned)?;
        record_transition(sprint, SprintStatus::Abandoned, Some(reason));
        Ok(sprint.clone())
    }

    async fn schedule_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::Todo)?;
        record_transition(sprint, SprintStatus::Todo, None);
        Ok(sprint.clone())
    }

    async fn deschedule_sprint(&self, sprint_id: &str) -> Result<Sprint> {
        let mut state = self.state.lock().await;
        let sprint = state.sprint_mut(sprint_id)?;
        validate_transition(sprint_id, sprint.status, SprintStatus::Backlog)?;
        record_transition(sprint, SprintStatus::Backlog, None);
        Ok(sprint.clone())
    }

    async fn get_step_status(&self, sprint_id: &str) -> Result<StepStatusReport> {
        let state = self.state.lock().await;
        Ok(step_status_report(state.sprint(sprint_id)?))
    }

    async fn status_summary(&self) -> Result<StatusSummary> {
        let state = self.state.lock().await;
        let sprints: Vec<Sprint> = state.sprints.values().cloned().collect();
        Ok(summarize(state.epics.len(), &sprints))
    }

    async fn archive_epic(&self, epic_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.epics.contains_key(epic_id) {
            return Err(WorkflowError::EpicNotFound(epic_id.to_string()));
        }
        state.archived_epics.insert(epic_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NewSprint;
    use crate::workflow::TaskPlan;

    async fn sprint_with_tasks(backend: &MemoryBackend, tasks: &[&str]) -> Sprint {
        let epic = backend.create_epic("Epic", "desc").await.unwrap();
        backend
            .create_sprint(NewSprint {
                goal: "do the thing".into(),
                epic_id: Some(epic.id),
                kind: Some("backend".into()),
                tasks: tasks
                    .iter()
                    .map(|name| TaskPlan::new(*name, "product_engineer"))
                    .collect(),
                dependencies: vec![],
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn start_materializes_steps_and_records_the_transition() {
        let backend = MemoryBackend::new();
        let sprint = sprint_with_tasks(&backend, &["design", "implement"]).await;

        let started = backend.start_sprint(&sprint.id).await.unwrap();
        assert_eq!(started.status, SprintStatus::InProgress);
        assert_eq!(started.steps.len(), 2);
        assert_eq!(started.steps[0].status, StepStatus::InProgress);
        assert_eq!(started.transitions.len(), 1);
        assert_eq!(started.transitions[0].from, SprintStatus::Todo);
        assert_eq!(started.transitions[0].to, SprintStatus::InProgress);
    }

    #[tokio::test]
    async fn advance_walks_steps_in_order_and_complete_requires_all_done() {
        let backend = MemoryBackend::new();
        let sprint = sprint_with_tasks(&backend, &["a", "b"]).await;
        backend.start_sprint(&sprint.id).await.unwrap();

        // Completing early is rejected without mutating.
        assert!(matches!(
            backend.complete_sprint(&sprint.id).await,
            Err(WorkflowError::StepsIncomplete(_))
        ));
        assert_eq!(
            backend.get_sprint(&sprint.id).await.unwrap().status,
            SprintStatus::InProgress
        );

        backend
            .advance_step(&sprint.id, Some(serde_json::json!({"out": 1})))
            .await
            .unwrap();
        let mid = backend.get_sprint(&sprint.id).await.unwrap();
        assert_eq!(mid.steps[0].status, StepStatus::Done);
        assert_eq!(mid.steps[1].status, StepStatus::InProgress);

        backend.advance_step(&sprint.id, None).await.unwrap();
        let done = backend.complete_sprint(&sprint.id).await.unwrap();
        assert_eq!(done.status, SprintStatus::Done);
        assert_eq!(done.transitions.last().unwrap().to, SprintStatus::Done);
    }

    #[tokio::test]
    async fn block_then_resume_preserves_step_progress() {
        let backend = MemoryBackend::new();
        let sprint = sprint_with_tasks(&backend, &["a", "b", "c"]).await;
        backend.start_sprint(&sprint.id).await.unwrap();
        backend.advance_step(&sprint.id, None).await.unwrap();

        let blocked = backend
            .block_sprint(&sprint.id, "waiting on credentials")
            .await
            .unwrap();
        assert_eq!(blocked.status, SprintStatus::Blocked);
        assert_eq!(blocked.blocker.as_deref(), Some("waiting on credentials"));

        let resumed = backend.resume_sprint(&sprint.id).await.unwrap();
        assert_eq!(resumed.status, SprintStatus::InProgress);
        assert!(resumed.blocker.is_none());
        assert_eq!(resumed.steps[0].status, StepStatus::Done);
        assert_eq!(resumed.current_step().map(|s| s.name.as_str()), Some("b"));
    }

    #[tokio::test]
    async fn patch_updates_only_the_named_fields() {
        let backend = MemoryBackend::new();
        let sprint = sprint_with_tasks(&backend, &["a"]).await;

        let patched = backend
            .update_sprint(
                &sprint.id,
                crate::backend::SprintPatch {
                    goal: Some("sharper goal".into()),
                    dependencies: Some(vec!["s-9".into()]),
                    ..crate::backend::SprintPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(patched.goal, "sharper goal");
        assert_eq!(patched.dependencies, vec!["s-9"]);
        assert_eq!(patched.kind, "backend");
        assert_eq!(patched.tasks.len(), 1);
    }

    #[tokio::test]
    async fn archiving_hides_the_epic_from_listings_but_keeps_it_readable() {
        let backend = MemoryBackend::new();
        let epic = backend.create_epic("Old epic", "desc").await.unwrap();
        backend.archive_epic(&epic.id).await.unwrap();

        assert!(backend.list_epics().await.unwrap().is_empty());
        assert_eq!(backend.get_epic(&epic.id).await.unwrap().title, "Old epic");
    }

    #[tokio::test]
    async fn epic_status_follows_sprint_counts() {
        let backend = MemoryBackend::new();
        let epic = backend.create_epic("Epic", "desc").await.unwrap();
        assert_eq!(
            backend.get_epic(&epic.id).await.unwrap().status,
            EpicStatus::Todo
        );

        let sprint = backend
            .create_sprint(NewSprint {
                goal: "g".into(),
                epic_id: Some(epic.id.clone()),
                tasks: vec![TaskPlan::new("a", "t")],
                ..NewSprint::default()
            })
            .await
            .unwrap();

        backend.start_sprint(&sprint.id).await.unwrap();
        assert_eq!(
            backend.get_epic(&epic.id).await.unwrap().status,
            EpicStatus::InProgress
        );

        backend.advance_step(&sprint.id, None).await.unwrap();
        backend.complete_sprint(&sprint.id).await.unwrap();
        assert_eq!(
            backend.get_epic(&epic.id).await.unwrap().status,
            EpicStatus::Done
        );
    }

    #[tokio::test]
    async fn start_fails_listing_exactly_the_unmet_prerequisites() {
        let backend = MemoryBackend::new();
        let done = sprint_with_tasks(&backend, &["a"]).await;
        backend.start_sprint(&done.id).await.unwrap();
        backend.advance_step(&done.id, None).await.unwrap();
        backend.complete_sprint(&done.id).await.unwrap();

        let pending = backend
            .create_sprint(NewSprint {
                goal: "still todo".into(),
                ..NewSprint::default()
            })
            .await
            .unwrap();

        let gated = backend
            .create_sprint(NewSprint {
                goal: "gated".into(),
                dependencies: vec![done.id.clone(), pending.id.clone()],
                tasks: vec![TaskPlan::new("t", "x")],
                ..NewSprint::default()
            })
            .await
            .unwrap();

        let err = backend.start_sprint(&gated.id).await.unwrap_err();
        match err {
            WorkflowError::DependencyNotMet { unmet, .. } => {
                assert_eq!(unmet, vec![pending.id]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The failed start mutated nothing.
        assert_eq!(
            backend.get_sprint(&gated.id).await.unwrap().status,
            SprintStatus::Todo
        );
    }

    #[tokio::test]
    async fn review_round_trip_records_rejection_reason() {
        let backend = MemoryBackend::new();
        let sprint = sprint_with_tasks(&backend, &["a"]).await;
        backend.start_sprint(&sprint.id).await.unwrap();
        backend.advance_step(&sprint.id, None).await.unwrap();

        backend.move_to_review(&sprint.id).await.unwrap();
        let rejected = backend
            .reject_sprint(&sprint.id, "missing edge-case tests")
            .await
            .unwrap();
        assert_eq!(rejected.status, SprintStatus::InProgress);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some("missing edge-case tests")
        );
        assert_eq!(
            rejected.transitions.last().unwrap().reason.as_deref(),
            Some("missing edge-case tests")
        );
    }
}
