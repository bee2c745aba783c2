//! Prerequisite checks for sprints and steps.

use crate::backend::WorkflowBackend;
use crate::error::{Result, WorkflowError};
use crate::workflow::{Sprint, SprintStatus, StepStatus};

/// Every listed prerequisite that is not Done, in declaration order. A
/// dependency on a sprint that does not exist counts as unmet rather than
/// erroring, so a report covers the whole list.
pub async fn check_sprint_dependencies(
    sprint_id: &str,
    backend: &dyn WorkflowBackend,
) -> Result<Vec<String>> {
    let sprint = backend.get_sprint(sprint_id).await?;
    let mut unmet = Vec::new();
    for dep in &sprint.dependencies {
        match backend.get_sprint(dep).await {
            Ok(s) if s.status == SprintStatus::Done => {}
            Ok(_) => unmet.push(dep.clone()),
            Err(WorkflowError::SprintNotFound(_)) => unmet.push(dep.clone()),
            Err(e) => return Err(e),
        }
    }
    Ok(unmet)
}

pub async fn validate_sprint_dependencies(
    sprint_id: &str,
    backend: &dyn WorkflowBackend,
) -> Result<()> {
    let unmet = check_sprint_dependencies(sprint_id, backend).await?;
    if unmet.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::DependencyNotMet {
            sprint_id: sprint_id.to_string(),
            unmet,
        })
    }
}

/// A step may run only when every step before it is Done or Skipped.
pub fn validate_step_order(sprint: &Sprint, step_id: &str) -> Result<()> {
    let idx = sprint
        .steps
        .iter()
        .position(|s| s.id == step_id)
        .ok_or_else(|| WorkflowError::NoStepInProgress(sprint.id.clone()))?;
    let pending: Vec<&str> = sprint.steps[..idx]
        .iter()
        .filter(|s| !matches!(s.status, StepStatus::Done | StepStatus::Skipped))
        .map(|s| s.name.as_str())
        .collect();
    if pending.is_empty() {
        Ok(())
    } else {
        Err(WorkflowError::DependencyNotMet {
            sprint_id: sprint.id.clone(),
            unmet: pending.into_iter().map(String::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, NewSprint, WorkflowBackend};
    use crate::workflow::{Step, TaskPlan};

    #[tokio::test]
    async fn reports_every_unmet_prerequisite_not_just_the_first() {
        let backend = MemoryBackend::new();
        let a = backend
            .create_sprint(NewSprint {
                goal: "a".into(),
                tasks: vec![TaskPlan::new("t", "x")],
                ..NewSprint::default()
            })
            .await
            .unwrap();
        let b = backend
            .create_sprint(NewSprint {
                goal: "b".into(),
                ..NewSprint::default()
            })
            .await
            .unwrap();

        // A is done, B is still todo.
        backend.start_sprint(&a.id).await.unwrap();
        backend.advance_step(&a.id, None).await.unwrap();
        backend.complete_sprint(&a.id).await.unwrap();

        let dependent = backend
            .create_sprint(NewSprint {
                goal: "c".into(),
                dependencies: vec![a.id.clone(), b.id.clone(), "s-99".into()],
                ..NewSprint::default()
            })
            .await
            .unwrap();

        let unmet = check_sprint_dependencies(&dependent.id, &backend)
            .await
            .unwrap();
        assert_eq!(unmet, vec![b.id.clone(), "s-99".to_string()]);

        let err = validate_sprint_dependencies(&dependent.id, &backend)
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(&b.id));
        assert!(msg.contains("s-99"));
        assert!(!msg.contains(&format!("{},", a.id)));
    }

    #[test]
    fn step_order_requires_all_predecessors_complete() {
        let mut sprint = Sprint {
            id: "s-1".into(),
            goal: "g".into(),
            status: crate::workflow::SprintStatus::InProgress,
            epic_id: None,
            kind: "backend".into(),
            tasks: vec![],
            steps: vec![
                Step::new("step-1", "design", "x"),
                Step::new("step-2", "implement", "x"),
                Step::new("step-3", "verify", "x"),
            ],
            transitions: vec![],
            dependencies: vec![],
            blocker: None,
            rejection_reason: None,
            created_at: None,
            started_at: None,
            completed_at: None,
        };

        assert!(validate_step_order(&sprint, "step-1").is_ok());
        assert!(validate_step_order(&sprint, "step-3").is_err());

        sprint.steps[0].status = StepStatus::Done;
        sprint.steps[1].status = StepStatus::Skipped;
        assert!(validate_step_order(&sprint, "step-3").is_ok());
    }
}
