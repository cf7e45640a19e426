//! Lifecycle transition table.
//!
//! ```text
//! active  --pause-->  paused
//! paused  --resume--> active
//! active  --fail-->   failed
//! paused  --fail-->   failed
//! ```
//!
//! `failed` and `completed` are terminal. Repeating the action that produced
//! the current status is an idempotent no-op.

use waymark_types::instance::{InstanceStatus, LifecycleAction};

use super::error::OrchestratorError;

/// Smallest reason length honored regardless of configuration.
pub const MIN_REASON_CHARS: usize = 16;

/// A validated transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: InstanceStatus,
    pub to: InstanceStatus,
    /// True when the instance is already in `to` and nothing should change.
    pub idempotent: bool,
}

/// Validate `action` against the current status.
pub fn plan_transition(
    current: InstanceStatus,
    action: LifecycleAction,
) -> Result<Transition, OrchestratorError> {
    use InstanceStatus::*;
    use LifecycleAction::*;

    let to = action.target_status();
    let idempotent = match (current, action) {
        (Active, Pause) | (Paused, Resume) | (Active, Fail) | (Paused, Fail) => false,
        (Paused, Pause) | (Failed, Fail) => true,
        _ => return Err(OrchestratorError::InvalidTransition { from: current, to }),
    };

    Ok(Transition {
        from: current,
        to,
        idempotent,
    })
}

/// Trim a failure reason to at most `max_chars` characters.
pub fn bound_reason(reason: &str, max_chars: usize) -> String {
    let limit = max_chars.max(MIN_REASON_CHARS);
    reason.trim().chars().take(limit).collect()
}

/// Change in the active-instance gauge caused by a status change.
pub fn active_delta(from: InstanceStatus, to: InstanceStatus) -> i64 {
    match (from == InstanceStatus::Active, to == InstanceStatus::Active) {
        (true, false) => -1,
        (false, true) => 1,
        _ => 0,
    }
}
