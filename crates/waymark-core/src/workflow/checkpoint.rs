//! Checkpoint manager for workflow instances.
//!
//! Wraps a `CheckpointStore` with the operations the orchestrator needs:
//! idempotent step checkpoints, lifecycle audit records, history queries and
//! rebuilding an instance's completion map by replaying its log.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;
use waymark_types::checkpoint::{Checkpoint, NewCheckpoint, RecordOutcome};
use waymark_types::instance::{InstanceStatus, LifecycleAction, StepCompletion};

use crate::repository::checkpoint::{fold_completions, CheckpointStore};

/// Pseudo step ID under which lifecycle actions are recorded.
///
/// Not a valid template step identifier, so it never collides with a real step.
pub const LIFECYCLE_STEP_ID: &str = "$lifecycle";

// ---------------------------------------------------------------------------
// CheckpointManager
// ---------------------------------------------------------------------------

/// Records and reads checkpoints for workflow instances.
///
/// Generic over `S: CheckpointStore` so it works with SQLite or the in-memory
/// store. Every mutation is appended here before the instance view changes.
pub struct CheckpointManager<S: CheckpointStore> {
    store: Arc<S>,
}

impl<S: CheckpointStore> CheckpointManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Look up an earlier checkpoint recorded under the same idempotency key.
    pub async fn find_replay(
        &self,
        workflow_id: &str,
        step_id: &str,
        idempotency_key: Option<&str>,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        let Some(key) = idempotency_key else {
            return Ok(None);
        };
        self.store
            .find_by_idempotency_key(workflow_id, step_id, key)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Append a step checkpoint (or return the prior one for a repeated key).
    pub async fn record(&self, new: &NewCheckpoint) -> Result<RecordOutcome, CheckpointError> {
        if new.step_id.trim().is_empty() {
            return Err(CheckpointError::EmptyStepId);
        }

        let outcome = self
            .store
            .record(new)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))?;

        tracing::debug!(
            workflow_id = %new.workflow_id,
            step_id = %new.step_id,
            checkpoint_id = %outcome.checkpoint.id,
            sequence = outcome.checkpoint.sequence,
            complete_step = new.complete_step,
            replayed = outcome.replayed,
            "checkpoint recorded"
        );

        Ok(outcome)
    }

    /// Append an audit checkpoint for a lifecycle transition.
    pub async fn record_lifecycle(
        &self,
        workflow_id: &str,
        action: LifecycleAction,
        from: InstanceStatus,
        to: InstanceStatus,
        reason: Option<&str>,
    ) -> Result<Checkpoint, CheckpointError> {
        let new = NewCheckpoint {
            workflow_id: workflow_id.to_string(),
            step_id: LIFECYCLE_STEP_ID.to_string(),
            data: json!({
                "action": action,
                "from": from,
                "to": to,
            }),
            notes: reason.map(String::from),
            complete_step: false,
            source_request_id: None,
            idempotency_key: None,
        };
        Ok(self.record(&new).await?.checkpoint)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Most recent checkpoint for one step.
    pub async fn latest(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        self.store
            .latest(workflow_id, step_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Every checkpoint of an instance in arrival order, lifecycle records included.
    pub async fn history(&self, workflow_id: &str) -> Result<Vec<Checkpoint>, CheckpointError> {
        self.store
            .list(workflow_id)
            .await
            .map_err(|e| CheckpointError::Repository(e.to_string()))
    }

    /// Rebuild the completion map by replaying the full log.
    pub async fn replay_completions(
        &self,
        workflow_id: &str,
    ) -> Result<BTreeMap<String, StepCompletion>, CheckpointError> {
        let log = self.history(workflow_id).await?;
        Ok(fold_completions(
            log.iter().filter(|cp| cp.step_id != LIFECYCLE_STEP_ID),
        ))
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during checkpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Underlying store operation failed.
    #[error("checkpoint store error: {0}")]
    Repository(String),

    #[error("checkpoint step id must not be empty")]
    EmptyStepId,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
