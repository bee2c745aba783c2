//! Agent boundary: the runner dispatches each step to an agent looked up by
//! the step's agent label. What an agent actually does is out of scope here;
//! it gets a context and must come back with an [`AgentResult`].

pub mod mock;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Result, WorkflowError};
use crate::workflow::{AgentResult, Epic, Sprint, Step};

pub use mock::MockAgent;

/// Everything an agent may need to execute one step.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub step: Step,
    pub sprint: Sprint,
    pub epic: Option<Epic>,
    pub project_root: PathBuf,
    /// Results of earlier steps in this pass, in execution order.
    pub previous_results: Vec<AgentResult>,
}

#[async_trait]
pub trait ExecutionAgent: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &StepContext) -> Result<AgentResult>;
}

/// Maps step-type labels to agents.
#[derive(Default)]
pub struct AgentRegistry {
    agents: HashMap<String, Arc<dyn ExecutionAgent>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, label: impl Into<String>, agent: Arc<dyn ExecutionAgent>) {
        self.agents.insert(label.into(), agent);
    }

    pub fn get(&self, label: &str) -> Result<Arc<dyn ExecutionAgent>> {
        self.agents
            .get(label)
            .cloned()
            .ok_or_else(|| WorkflowError::AgentNotFound(label.to_string()))
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_label_is_agent_not_found() {
        let registry = AgentRegistry::new();
        assert!(matches!(
            registry.get("reviewer"),
            Err(WorkflowError::AgentNotFound(label)) if label == "reviewer"
        ));
    }

    #[test]
    fn registered_agents_resolve_by_label() {
        let mut registry = AgentRegistry::new();
        registry.register("product_engineer", Arc::new(MockAgent::new("product_engineer")));
        assert_eq!(
            registry.get("product_engineer").unwrap().name(),
            "product_engineer"
        );
    }
}
