//! Sprint state-machine transitions, defined as data.

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::error::{Result, WorkflowError};
use crate::workflow::SprintStatus;

use SprintStatus::*;

/// The closed set of legal sprint transitions. Everything else is rejected.
pub static VALID_TRANSITIONS: Lazy<HashSet<(SprintStatus, SprintStatus)>> = Lazy::new(|| {
    HashSet::from([
        (Todo, InProgress),       // start
        (InProgress, Review),     // submit for review
        (InProgress, Done),       // complete (direct)
        (Review, Done),           // approve from review
        (Review, InProgress),     // reject from review
        (InProgress, Blocked),    // block
        (Blocked, InProgress),    // resume
        (Backlog, Todo),          // schedule
        (Todo, Backlog),          // deschedule
        (Todo, Abandoned),        // abandon before start
    ])
});

/// Fails with [`WorkflowError::InvalidTransition`] if the move is not in the
/// table. Called before any mutation, so failures never require rollback.
pub fn validate_transition(
    sprint_id: &str,
    from: SprintStatus,
    to: SprintStatus,
) -> Result<()> {
    if VALID_TRANSITIONS.contains(&(from, to)) {
        Ok(())
    } else {
        Err(WorkflowError::InvalidTransition {
            sprint_id: sprint_id.to_string(),
            from,
            to,
        })
    }
}
