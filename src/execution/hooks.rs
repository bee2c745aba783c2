//! Hook middleware: checks that run at fixed points in a sprint's execution.
//!
//! A blocking hook that fails halts the run and blocks the sprint with the
//! hook's message. A non-blocking hook that fails is logged, contributes its
//! deferred items, and the run continues. A hook whose evaluation itself
//! errors propagates; that is a systemic failure, not a workflow outcome.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::Result;
use crate::workflow::{AgentResult, HookResult, Sprint, Step};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookPoint {
    PreSprint,
    PreStep,
    PostStep,
    PreCompletion,
    /// Runs after the sprint reaches its terminal status. Failures here are
    /// always advisory; there is nothing left to halt.
    PostCompletion,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::PreSprint => "pre-sprint",
            HookPoint::PreStep => "pre-step",
            HookPoint::PostStep => "post-step",
            HookPoint::PreCompletion => "pre-completion",
            HookPoint::PostCompletion => "post-completion",
        }
    }
}

impl std::fmt::Display for HookPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a hook gets to look at. Borrowed from the runner's pass state.
pub struct HookContext<'a> {
    pub sprint: &'a Sprint,
    pub step: Option<&'a Step>,
    /// The agent result under evaluation, present at PostStep.
    pub result: Option<&'a AgentResult>,
    /// All agent results of the pass so far, in execution order.
    pub prior_results: &'a [AgentResult],
}

#[async_trait]
pub trait Hook: Send + Sync {
    fn name(&self) -> &str;

    fn point(&self) -> HookPoint;

    async fn evaluate(&self, ctx: &HookContext<'_>) -> Result<HookResult>;
}

/// Aggregate of one `evaluate_all` pass.
#[derive(Debug, Default)]
pub struct PointOutcome {
    /// Message of the first blocking failure, if any. Later hooks at the
    /// point were skipped.
    pub blocked: Option<String>,
    pub deferred_items: Vec<String>,
}

/// Hooks in registration order, filtered per point at evaluation time.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Vec<Arc<dyn Hook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn Hook>) {
        self.hooks.push(hook);
    }

    pub fn hooks_at(&self, point: HookPoint) -> Vec<Arc<dyn Hook>> {
        self.hooks
            .iter()
            .filter(|h| h.point() == point)
            .cloned()
            .collect()
    }

    /// Evaluates every hook registered at `point`, in registration order,
    /// stopping at the first blocking failure.
    pub async fn evaluate_all(
        &self,
        point: HookPoint,
        ctx: &HookContext<'_>,
    ) -> Result<PointOutcome> {
        let mut outcome = PointOutcome::default();
        for hook in self.hooks_at(point) {
            let result = hook.evaluate(ctx).await?;
            outcome.deferred_items.extend(result.deferred_items.clone());
            if result.passed {
                debug!(hook = hook.name(), %point, "hook passed");
                continue;
            }
            if result.blocking && point != HookPoint::PostCompletion {
                outcome.blocked = Some(result.message);
                break;
            }
            warn!(
                hook = hook.name(),
                %point,
                message = %result.message,
                "non-blocking hook failed, continuing"
            );
        }
        Ok(outcome)
    }
}

/// Scripted hook for tests: returns queued results in order, then passes.
pub struct MockHook {
    name: String,
    point: HookPoint,
    script: std::sync::Mutex<std::collections::VecDeque<HookResult>>,
}

impl MockHook {
    pub fn new(name: impl Into<String>, point: HookPoint) -> Self {
        Self {
            name: name.into(),
            point,
            script: std::sync::Mutex::new(std::collections::VecDeque::new()),
        }
    }

    pub fn returning(self, results: impl IntoIterator<Item = HookResult>) -> Self {
        self.script.lock().unwrap().extend(results);
        self
    }
}

#[async_trait]
impl Hook for MockHook {
    fn name(&self) -> &str {
        &self.name
    }

    fn point(&self) -> HookPoint {
        self.point
    }

    async fn evaluate(&self, _ctx: &HookContext<'_>) -> Result<HookResult> {
        Ok(self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| HookResult::pass("ok")))
    }
}
