//! Concrete enforcement gates built on the hook middleware.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::workflow::HookResult;

use super::dependencies::validate_step_order;
use super::hooks::{Hook, HookContext, HookPoint};

/// Minimum test coverage by sprint kind. Research sprints are exempt.
pub fn coverage_threshold(kind: &str) -> f64 {
    match kind {
        "backend" => 85.0,
        "frontend" => 70.0,
        "fullstack" => 75.0,
        "infrastructure" => 60.0,
        "research" => 0.0,
        _ => 80.0,
    }
}

/// PostStep: blocks when a step reports coverage below the threshold for the
/// sprint's kind. Steps that report no coverage pass; absence of data is not
/// a failure.
pub struct CoverageGate {
    threshold: f64,
}

impl CoverageGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn for_kind(kind: &str) -> Self {
        Self::new(coverage_threshold(kind))
    }
}

#[async_trait]
impl Hook for CoverageGate {
    fn name(&self) -> &str {
        "coverage-gate"
    }

    fn point(&self) -> HookPoint {
        HookPoint::PostStep
    }

    async fn evaluate(&self, ctx: &HookContext<'_>) -> Result<HookResult> {
        if self.threshold <= 0.0 {
            return Ok(HookResult::pass("coverage exempt"));
        }
        let Some(coverage) = ctx.result.and_then(|r| r.coverage) else {
            return Ok(HookResult::pass("no coverage reported"));
        };
        if coverage >= self.threshold {
            Ok(HookResult::pass(format!(
                "coverage {coverage:.1}% meets the {:.1}% threshold",
                self.threshold
            )))
        } else {
            Ok(HookResult::fail(format!(
                "coverage {coverage:.1}% is below the {:.1}% threshold",
                self.threshold
            )))
        }
    }
}

/// PreCompletion: requires an explicit `approve` verdict among the pass's
/// agent results.
pub struct ReviewVerdictGate;

#[async_trait]
impl Hook for ReviewVerdictGate {
    fn name(&self) -> &str {
        "review-verdict-gate"
    }

    fn point(&self) -> HookPoint {
        HookPoint::PreCompletion
    }

    async fn evaluate(&self, ctx: &HookContext<'_>) -> Result<HookResult> {
        let approved = ctx
            .prior_results
            .iter()
            .chain(ctx.result)
            .any(|r| r.review_verdict.as_deref() == Some("approve"));
        if approved {
            Ok(HookResult::pass("review approved"))
        } else {
            Ok(HookResult::fail(
                "no approving review verdict among the sprint's results",
            ))
        }
    }
}

/// PreStep: the step about to run must have every predecessor Done or
/// Skipped.
pub struct StepOrderingGate;

#[async_trait]
impl Hook for StepOrderingGate {
    fn name(&self) -> &str {
        "step-ordering-gate"
    }

    fn point(&self) -> HookPoint {
        HookPoint::PreStep
    }

    async fn evaluate(&self, ctx: &HookContext<'_>) -> Result<HookResult> {
        let Some(step) = ctx.step else {
            return Ok(HookResult::pass("no step in context"));
        };
        match validate_step_order(ctx.sprint, &step.id) {
            Ok(()) => Ok(HookResult::pass("step order satisfied")),
            Err(e) => Ok(HookResult::fail(e.to_string())),
        }
    }
}

/// PreCompletion: all steps, or a named subset, must be Done or Skipped.
/// Failures contribute a `Complete step: <name>` deferred item per missing
/// step.
pub struct RequiredStepsGate {
    required: Option<Vec<String>>,
}

impl RequiredStepsGate {
    /// Requires every step of the sprint.
    pub fn all() -> Self {
        Self { required: None }
    }

    pub fn named(steps: impl IntoIterator<Item = String>) -> Self {
        Self {
            required: Some(steps.into_iter().collect()),
        }
    }
}

#[async_trait]
impl Hook for RequiredStepsGate {
    fn name(&self) -> &str {
        "required-steps-gate"
    }

    fn point(&self) -> HookPoint {
        HookPoint::PreCompletion
    }

    async fn evaluate(&self, ctx: &HookContext<'_>) -> Result<HookResult> {
        let missing: Vec<String> = match &self.required {
            Some(names) => names
                .iter()
                .filter(|name| {
                    !ctx.sprint
                        .steps
                        .iter()
                        .any(|s| &s.name == *name && s.status.is_complete())
                })
                .cloned()
                .collect(),
            None => ctx
                .sprint
                .steps
                .iter()
                .filter(|s| !s.status.is_complete())
                .map(|s| s.name.clone())
                .collect(),
        };
        if missing.is_empty() {
            Ok(HookResult::pass("all required steps complete"))
        } else {
            let deferred = missing
                .iter()
                .map(|name| format!("Complete step: {name}"))
                .collect();
            Ok(HookResult::fail(format!(
                "incomplete required steps: {}",
                missing.join(", ")
            ))
            .with_deferred(deferred))
        }
    }
}

/// The default enforcement set for a sprint of the given kind: step
/// ordering, coverage, an explicit review verdict, and all steps complete.
pub fn default_gates(kind: &str) -> Vec<Arc<dyn Hook>> {
    vec![
        Arc::new(StepOrderingGate),
        Arc::new(CoverageGate::for_kind(kind)),
        Arc::new(ReviewVerdictGate),
        Arc::new(RequiredStepsGate::all()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{AgentResult, Sprint, SprintStatus, Step, StepStatus};

    fn sprint(steps: Vec<Step>) -> Sprint {
        Sprint {
            id: "s-1".into(),
            goal: "g".into(),
            status: SprintStatus::InProgress,
            epic_id: None,
            kind: "backend".into(),
            tasks: vec![],
            steps,
            transitions: vec![],
            dependencies: vec![],
            blocker: None,
            rejection_reason: None,
            created_at: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn default_set_carries_all_four_gates() {
        let gates = default_gates("backend");
        let names: Vec<_> = gates.iter().map(|g| g.name()).collect();
        assert_eq!(
            names,
            [
                "step-ordering-gate",
                "coverage-gate",
                "review-verdict-gate",
                "required-steps-gate"
            ]
        );
    }

    #[test]
    fn unknown_kinds_fall_back_to_the_general_threshold() {
        assert_eq!(coverage_threshold("data-science"), 80.0);
        assert_eq!(coverage_threshold("fullstack"), 75.0);
    }

    #[tokio::test]
    async fn coverage_below_threshold_blocks_naming_both_values() {
        let gate = CoverageGate::for_kind("backend");
        let mut result = AgentResult::ok("done");
        result.coverage = Some(80.0);

        let s = sprint(vec![]);
        let ctx = HookContext {
            sprint: &s,
            step: None,
            result: Some(&result),
            prior_results: &[],
        };
        let outcome = gate.evaluate(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.blocking);
        assert!(outcome.message.contains("80.0"));
        assert!(outcome.message.contains("85.0"));
    }

    #[tokio::test]
    async fn research_sprints_and_missing_data_pass_coverage() {
        let s = sprint(vec![]);

        let mut low = AgentResult::ok("done");
        low.coverage = Some(1.0);
        let ctx = HookContext {
            sprint: &s,
            step: None,
            result: Some(&low),
            prior_results: &[],
        };
        assert!(CoverageGate::for_kind("research")
            .evaluate(&ctx)
            .await
            .unwrap()
            .passed);

        let none = AgentResult::ok("done");
        let ctx = HookContext {
            sprint: &s,
            step: None,
            result: Some(&none),
            prior_results: &[],
        };
        assert!(CoverageGate::for_kind("backend")
            .evaluate(&ctx)
            .await
            .unwrap()
            .passed);
    }

    #[tokio::test]
    async fn review_verdict_gate_needs_an_explicit_approve() {
        let s = sprint(vec![]);
        let mut approved = AgentResult::ok("lgtm");
        approved.review_verdict = Some("approve".into());
        let mut changes = AgentResult::ok("nope");
        changes.review_verdict = Some("request_changes".into());

        let ctx = HookContext {
            sprint: &s,
            step: None,
            result: None,
            prior_results: std::slice::from_ref(&changes),
        };
        assert!(!ReviewVerdictGate.evaluate(&ctx).await.unwrap().passed);

        let results = [changes, approved];
        let ctx = HookContext {
            sprint: &s,
            step: None,
            result: None,
            prior_results: &results,
        };
        assert!(ReviewVerdictGate.evaluate(&ctx).await.unwrap().passed);
    }

    #[tokio::test]
    async fn required_steps_gate_defers_each_missing_step() {
        let mut design = Step::new("step-1", "design", "x");
        design.status = StepStatus::Done;
        let s = sprint(vec![
            design,
            Step::new("step-2", "implement", "x"),
            Step::new("step-3", "verify", "x"),
        ]);
        let ctx = HookContext {
            sprint: &s,
            step: None,
            result: None,
            prior_results: &[],
        };

        let outcome = RequiredStepsGate::all().evaluate(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert_eq!(
            outcome.deferred_items,
            vec![
                "Complete step: implement".to_string(),
                "Complete step: verify".to_string()
            ]
        );

        let subset = RequiredStepsGate::named(["design".to_string()]);
        assert!(subset.evaluate(&ctx).await.unwrap().passed);
    }

    #[tokio::test]
    async fn step_ordering_gate_rejects_out_of_order_steps() {
        let s = sprint(vec![
            Step::new("step-1", "design", "x"),
            Step::new("step-2", "implement", "x"),
        ]);
        let step = s.steps[1].clone();
        let ctx = HookContext {
            sprint: &s,
            step: Some(&step),
            result: None,
            prior_results: &[],
        };
        let outcome = StepOrderingGate.evaluate(&ctx).await.unwrap();
        assert!(!outcome.passed);
        assert!(outcome.message.contains("design"));
    }
}
