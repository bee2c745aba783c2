//! The orchestrating runner: drives a sprint from start to its terminal
//! status, dispatching steps to agents through the hook middleware.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::agent::{AgentRegistry, ExecutionAgent, StepContext};
use crate::backend::WorkflowBackend;
use crate::error::{Result, WorkflowError};
use crate::workflow::{AgentResult, RunResult, Sprint, SprintStatus};

use super::config::RunConfig;
use super::dependencies;
use super::hooks::{HookContext, HookPoint, HookRegistry};

pub struct SprintRunner {
    backend: Arc<dyn WorkflowBackend>,
    agents: AgentRegistry,
    hooks: HookRegistry,
    config: RunConfig,
    project_root: PathBuf,
    /// Cooperative cancellation. An in-flight agent call is not interrupted;
    /// its result is discarded once the sprint is no longer in progress.
    cancelled: AtomicBool,
}

impl SprintRunner {
    pub fn new(
        backend: Arc<dyn WorkflowBackend>,
        agents: AgentRegistry,
        hooks: HookRegistry,
        config: RunConfig,
        project_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            backend,
            agents,
            hooks,
            config,
            project_root: project_root.into(),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn backend(&self) -> &Arc<dyn WorkflowBackend> {
        &self.backend
    }

    /// Executes a sprint end to end. Prerequisites must be Done; a Todo
    /// sprint is started, an InProgress one is re-entered at its current
    /// step.
    pub async fn run(&self, sprint_id: &str) -> Result<RunResult> {
        let started = Instant::now();
        dependencies::validate_sprint_dependencies(sprint_id, self.backend.as_ref()).await?;

        let sprint = self.backend.get_sprint(sprint_id).await?;
        let sprint = match sprint.status {
            SprintStatus::Todo => self.backend.start_sprint(sprint_id).await?,
            SprintStatus::InProgress => {
                info!(sprint = sprint_id, "re-entering sprint already in progress");
                sprint
            }
            other => {
                return Err(WorkflowError::InvalidTransition {
                    sprint_id: sprint_id.to_string(),
                    from: other,
                    to: SprintStatus::InProgress,
                })
            }
        };

        let ctx = HookContext {
            sprint: &sprint,
            step: None,
            result: None,
            prior_results: &[],
        };
        let outcome = self.hooks.evaluate_all(HookPoint::PreSprint, &ctx).await?;
        let deferred = outcome.deferred_items;
        if let Some(message) = outcome.blocked {
            let reason = Self::hook_block_reason(HookPoint::PreSprint, message);
            let blocked = self.backend.block_sprint(sprint_id, &reason).await?;
            return Ok(Self::summary(&blocked, false, vec![], deferred, started, false));
        }

        self.execute_pass(sprint, started, Vec::new(), deferred).await
    }

    /// Continues a Blocked or InProgress sprint from its first unfinished
    /// step. Completed steps are never re-run.
    pub async fn resume(&self, sprint_id: &str) -> Result<RunResult> {
        let started = Instant::now();
        self.cancelled.store(false, Ordering::SeqCst);

        let sprint = self.backend.get_sprint(sprint_id).await?;
        let sprint = match sprint.status {
            SprintStatus::Blocked => self.backend.resume_sprint(sprint_id).await?,
            SprintStatus::InProgress => sprint,
            other => {
                return Err(WorkflowError::InvalidTransition {
                    sprint_id: sprint_id.to_string(),
                    from: other,
                    to: SprintStatus::InProgress,
                })
            }
        };

        self.execute_pass(sprint, started, Vec::new(), Vec::new()).await
    }

    /// Cooperative cancel: flags the runner and parks the sprint
    /// immediately. An InProgress sprint is blocked with the reason; a Todo
    /// sprint is abandoned.
    pub async fn cancel(&self, sprint_id: &str, reason: &str) -> Result<Sprint> {
        self.cancelled.store(true, Ordering::SeqCst);
        let sprint = self.backend.get_sprint(sprint_id).await?;
        match sprint.status {
            SprintStatus::InProgress => self.backend.block_sprint(sprint_id, reason).await,
            SprintStatus::Todo => self.backend.abandon_sprint(sprint_id, reason).await,
            other => Err(WorkflowError::InvalidTransition {
                sprint_id: sprint_id.to_string(),
                from: other,
                to: SprintStatus::Blocked,
            }),
        }
    }

    async fn execute_pass(
        &self,
        mut sprint: Sprint,
        started: Instant,
        mut results: Vec<AgentResult>,
        mut deferred: Vec<String>,
    ) -> Result<RunResult> {
        let sprint_id = sprint.id.clone();
        let epic = match &sprint.epic_id {
            Some(id) => self.backend.get_epic(id).await.ok(),
            None => None,
        };

        while let Some(step) = sprint.current_step().cloned() {
            if self.cancelled.load(Ordering::SeqCst) {
                info!(sprint = %sprint_id, "cancellation requested, stopping before next step");
                let current = self.backend.get_sprint(&sprint_id).await?;
                return Ok(Self::summary(&current, false, results, deferred, started, false));
            }

            let ctx = HookContext {
                sprint: &sprint,
                step: Some(&step),
                result: None,
                prior_results: &results,
            };
            let outcome = self.hooks.evaluate_all(HookPoint::PreStep, &ctx).await?;
            deferred.extend(outcome.deferred_items);
            if let Some(message) = outcome.blocked {
                let reason = Self::hook_block_reason(HookPoint::PreStep, message);
                let blocked = self.backend.block_sprint(&sprint_id, &reason).await?;
                return Ok(Self::summary(&blocked, false, results, deferred, started, false));
            }

            let agent = self.agents.get(&step.agent)?;
            let step_ctx = StepContext {
                step: step.clone(),
                sprint: sprint.clone(),
                epic: epic.clone(),
                project_root: self.project_root.clone(),
                previous_results: results.clone(),
            };

            debug!(sprint = %sprint_id, step = %step.name, agent = %step.agent, "executing step");
            let (result, attempts) = self.invoke_with_retry(agent.as_ref(), &step_ctx).await?;

            // A result arriving after cancellation is discarded; the sprint
            // was already parked.
            let current = self.backend.get_sprint(&sprint_id).await?;
            if current.status != SprintStatus::InProgress {
                debug!(sprint = %sprint_id, step = %step.name, "discarding late result, sprint no longer in progress");
                return Ok(Self::summary(&current, false, results, deferred, started, false));
            }

            // PostStep hooks see the final result either way; advisory
            // deferred items survive a failed step.
            let ctx = HookContext {
                sprint: &sprint,
                step: Some(&step),
                result: Some(&result),
                prior_results: &results,
            };
            let outcome = self.hooks.evaluate_all(HookPoint::PostStep, &ctx).await?;
            deferred.extend(outcome.deferred_items);
            deferred.extend(result.deferred_items.clone());

            if !result.success {
                let reason = WorkflowError::StepExecutionFailed {
                    step: step.name.clone(),
                    attempts,
                    message: result.output.clone(),
                }
                .to_string();
                warn!(sprint = %sprint_id, %reason, "retries exhausted, blocking sprint");
                let blocked = self.backend.block_sprint(&sprint_id, &reason).await?;
                results.push(result);
                return Ok(Self::summary(&blocked, false, results, deferred, started, false));
            }

            if let Some(message) = outcome.blocked {
                let reason = Self::hook_block_reason(HookPoint::PostStep, message);
                let blocked = self.backend.block_sprint(&sprint_id, &reason).await?;
                results.push(result);
                return Ok(Self::summary(&blocked, false, results, deferred, started, false));
            }

            let output = serde_json::to_value(&result)?;
            sprint = self.backend.advance_step(&sprint_id, Some(output)).await?;
            results.push(result);
        }

        let ctx = HookContext {
            sprint: &sprint,
            step: None,
            result: None,
            prior_results: &results,
        };
        let outcome = self.hooks.evaluate_all(HookPoint::PreCompletion, &ctx).await?;
        deferred.extend(outcome.deferred_items);
        if let Some(message) = outcome.blocked {
            let reason = Self::hook_block_reason(HookPoint::PreCompletion, message);
            let blocked = self.backend.block_sprint(&sprint_id, &reason).await?;
            return Ok(Self::summary(&blocked, false, results, deferred, started, false));
        }

        let (sprint, stopped_at_review) = if self.config.review_checkpoint {
            (self.backend.move_to_review(&sprint_id).await?, true)
        } else {
            (self.backend.complete_sprint(&sprint_id).await?, false)
        };
        info!(
            sprint = %sprint_id,
            status = %sprint.status,
            "sprint pass finished"
        );

        let ctx = HookContext {
            sprint: &sprint,
            step: None,
            result: None,
            prior_results: &results,
        };
        let outcome = self
            .hooks
            .evaluate_all(HookPoint::PostCompletion, &ctx)
            .await?;
        deferred.extend(outcome.deferred_items);

        Ok(Self::summary(&sprint, true, results, deferred, started, stopped_at_review))
    }

    /// Blocker text for a hook-initiated halt, naming the checkpoint.
    fn hook_block_reason(point: HookPoint, message: String) -> String {
        WorkflowError::HookBlocked { point, message }.to_string()
    }

    /// Fixed-delay retry. A step runs at most `max_retries + 1` times; the
    /// last result is returned either way, with the attempt count.
    async fn invoke_with_retry(
        &self,
        agent: &dyn ExecutionAgent,
        ctx: &StepContext,
    ) -> Result<(AgentResult, u32)> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let result = self.invoke_once(agent, ctx).await?;
            if result.success
                || attempts > self.config.max_retries
                || self.cancelled.load(Ordering::SeqCst)
            {
                return Ok((result, attempts));
            }
            warn!(
                step = %ctx.step.name,
                attempts,
                "step attempt failed, retrying after fixed delay"
            );
            sleep(self.config.retry_delay).await;
        }
    }

    async fn invoke_once(
        &self,
        agent: &dyn ExecutionAgent,
        ctx: &StepContext,
    ) -> Result<AgentResult> {
        match self.config.step_timeout {
            Some(limit) => match timeout(limit, agent.execute(ctx)).await {
                Ok(result) => result,
                Err(_) => Ok(AgentResult::failed(format!(
                    "step '{}' timed out after {}s",
                    ctx.step.name,
                    limit.as_secs()
                ))),
            },
            None => agent.execute(ctx).await,
        }
    }

    fn summary(
        sprint: &Sprint,
        success: bool,
        agent_results: Vec<AgentResult>,
        deferred_items: Vec<String>,
        started: Instant,
        stopped_at_review: bool,
    ) -> RunResult {
        RunResult {
            sprint_id: sprint.id.clone(),
            success,
            steps_completed: sprint
                .steps
                .iter()
                .filter(|s| s.status.is_complete())
                .count(),
            steps_total: sprint.steps.len(),
            agent_results,
            deferred_items,
            duration: started.elapsed(),
            stopped_at_review,
        }
    }
}
