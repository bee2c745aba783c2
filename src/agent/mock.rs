//! Scripted agent used by tests and `--memory` demo runs.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::Result;
use crate::workflow::AgentResult;

use super::{ExecutionAgent, StepContext};

/// Returns queued results in order; once the script runs out it succeeds with
/// a canned result. Records call count and the last context it saw.
pub struct MockAgent {
    name: String,
    script: Mutex<VecDeque<AgentResult>>,
    calls: AtomicUsize,
    last_context: Mutex<Option<StepContext>>,
}

impl MockAgent {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            last_context: Mutex::new(None),
        }
    }

    pub fn push_result(&self, result: AgentResult) {
        self.script.lock().unwrap().push_back(result);
    }

    pub fn with_results(self, results: impl IntoIterator<Item = AgentResult>) -> Self {
        self.script.lock().unwrap().extend(results);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_context(&self) -> Option<StepContext> {
        self.last_context.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionAgent for MockAgent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StepContext) -> Result<AgentResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_context.lock().unwrap() = Some(ctx.clone());
        let scripted = self.script.lock().unwrap().pop_front();
        Ok(scripted
            .unwrap_or_else(|| AgentResult::ok(format!("{} handled '{}'", self.name, ctx.step.name))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{Sprint, SprintStatus, Step};
    use std::path::PathBuf;

    fn ctx(step_name: &str) -> StepContext {
        StepContext {
            step: Step::new("step-1", step_name, "mock"),
            sprint: Sprint {
                id: "s-1".into(),
                goal: "g".into(),
                status: SprintStatus::InProgress,
                epic_id: None,
                kind: "backend".into(),
                tasks: vec![],
                steps: vec![],
                transitions: vec![],
                dependencies: vec![],
                blocker: None,
                rejection_reason: None,
                created_at: None,
                started_at: None,
                completed_at: None,
            },
            epic: None,
            project_root: PathBuf::from("."),
            previous_results: vec![],
        }
    }

    #[tokio::test]
    async fn scripted_results_drain_in_order_then_default_to_success() {
        let agent = MockAgent::new("mock")
            .with_results([AgentResult::failed("boom"), AgentResult::ok("fixed")]);

        assert!(!agent.execute(&ctx("a")).await.unwrap().success);
        assert!(agent.execute(&ctx("a")).await.unwrap().success);
        assert!(agent.execute(&ctx("b")).await.unwrap().success);
        assert_eq!(agent.call_count(), 3);
        assert_eq!(
            agent.last_context().unwrap().step.name,
            "b".to_string()
        );
    }
}
