//! # Cadence
//!
//! Durable sprint automation: a kanban-backed lifecycle state machine,
//! pluggable enforcement gates, and an agent-dispatching runner that
//! survives process restarts.
//!
//! ## Usage
//!
//! ```bash
//! cadence run s-7 [--board-dir board] [--memory] [--review]
//! ```
//!
//! ## Modules
//!
//! - `workflow` - Domain model: epics, sprints, steps, and the transition table
//! - `backend` - Storage contract with in-memory and filesystem-board implementations
//! - `execution` - Dependency validation, hook/gate middleware, and the sprint runner
//! - `agent` - Execution-agent boundary: trait, registry, and test doubles
//! - `error` - Crate-wide error taxonomy
pub mod agent;
pub mod backend;
pub mod error;
pub mod execution;
pub mod workflow;

pub use error::{Result, WorkflowError};
