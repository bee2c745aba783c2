//! Cooperative cancellation and resume, exercised with an agent that parks
//! mid-step so the test controls the interleaving.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

use cadence::agent::{AgentRegistry, ExecutionAgent, StepContext};
use cadence::backend::{MemoryBackend, NewSprint, WorkflowBackend};
use cadence::error::Result;
use cadence::execution::{HookRegistry, RunConfig, SprintRunner};
use cadence::workflow::{AgentResult, SprintStatus, StepStatus, TaskPlan};

/// Succeeds instantly except on the named step, where (once) it signals the
/// test and waits to be released.
struct GatedAgent {
    gate_step: String,
    armed: AtomicBool,
    entered: Arc<Notify>,
    release: Arc<Notify>,
    calls: Mutex<Vec<String>>,
}

impl GatedAgent {
    fn new(gate_step: &str, entered: Arc<Notify>, release: Arc<Notify>) -> Self {
        Self {
            gate_step: gate_step.to_string(),
            armed: AtomicBool::new(true),
            entered,
            release,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionAgent for GatedAgent {
    fn name(&self) -> &str {
        "gated"
    }

    async fn execute(&self, ctx: &StepContext) -> Result<AgentResult> {
        self.calls.lock().unwrap().push(ctx.step.name.clone());
        if ctx.step.name == self.gate_step && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        Ok(AgentResult::ok(format!("finished {}", ctx.step.name)))
    }
}

#[tokio::test]
async fn cancel_mid_step_blocks_and_resume_finishes_without_rerunning_done_steps() {
    let backend = Arc::new(MemoryBackend::new());
    let sprint = backend
        .create_sprint(NewSprint {
            goal: "four step job".into(),
            tasks: ["a", "b", "c", "d"]
                .iter()
                .map(|n| TaskPlan::new(*n, "gated"))
                .collect(),
            ..NewSprint::default()
        })
        .await
        .unwrap();

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let agent = Arc::new(GatedAgent::new("b", entered.clone(), release.clone()));

    let mut agents = AgentRegistry::new();
    agents.register("gated", agent.clone());
    let config = RunConfig {
        retry_delay: Duration::from_millis(1),
        ..RunConfig::default()
    };
    let runner = Arc::new(SprintRunner::new(
        backend.clone(),
        agents,
        HookRegistry::new(),
        config,
        ".",
    ));

    let handle = tokio::spawn({
        let runner = runner.clone();
        let id = sprint.id.clone();
        async move { runner.run(&id).await }
    });

    // Step 2 is in flight; cancel while the agent is parked.
    entered.notified().await;
    let cancelled = runner.cancel(&sprint.id, "shifting priorities").await.unwrap();
    assert_eq!(cancelled.status, SprintStatus::Blocked);
    release.notify_one();

    // The in-flight result is discarded, not applied.
    let result = handle.await.unwrap().unwrap();
    assert!(!result.success);

    let parked = backend.get_sprint(&sprint.id).await.unwrap();
    assert_eq!(parked.status, SprintStatus::Blocked);
    assert_eq!(parked.blocker.as_deref(), Some("shifting priorities"));
    assert_eq!(parked.steps[0].status, StepStatus::Done);
    assert_eq!(parked.steps[1].status, StepStatus::InProgress);

    // Resume picks up at step 2 and runs to completion.
    let resumed = runner.resume(&sprint.id).await.unwrap();
    assert!(resumed.success);
    assert_eq!(resumed.steps_completed, 4);
    assert_eq!(
        backend.get_sprint(&sprint.id).await.unwrap().status,
        SprintStatus::Done
    );

    // Step 1 ran exactly once; step 2 ran again because its first result was
    // thrown away.
    let calls = agent.calls();
    assert_eq!(calls.iter().filter(|c| c.as_str() == "a").count(), 1);
    assert_eq!(calls.iter().filter(|c| c.as_str() == "b").count(), 2);
    assert_eq!(calls, vec!["a", "b", "b", "c", "d"]);
}

#[tokio::test]
async fn cancelling_before_start_abandons_instead_of_blocking() {
    let backend = Arc::new(MemoryBackend::new());
    let sprint = backend
        .create_sprint(NewSprint {
            goal: "never started".into(),
            tasks: vec![TaskPlan::new("a", "gated")],
            ..NewSprint::default()
        })
        .await
        .unwrap();

    let runner = SprintRunner::new(
        backend.clone(),
        AgentRegistry::new(),
        HookRegistry::new(),
        RunConfig::default(),
        ".",
    );

    let gone = runner.cancel(&sprint.id, "descoped").await.unwrap();
    assert_eq!(gone.status, SprintStatus::Abandoned);
    assert_eq!(
        gone.transitions.last().unwrap().reason.as_deref(),
        Some("descoped")
    );
}
