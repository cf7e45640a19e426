//! Checkpoint store trait definition.

use std::collections::BTreeMap;

use waymark_types::checkpoint::{Checkpoint, NewCheckpoint, RecordOutcome};
use waymark_types::error::RepositoryError;
use waymark_types::instance::StepCompletion;

/// Durable, append-only checkpoint log.
///
/// Contract:
/// - `record` is idempotent per `(workflow_id, step_id, idempotency_key)`: a
///   repeat returns the stored checkpoint with `replayed = true` and persists
///   nothing new.
/// - Checkpoints are totally ordered by arrival (`sequence`).
/// - `latest` answers without scanning the whole log.
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint, or return the earlier one for a repeated key.
    fn record(
        &self,
        checkpoint: &NewCheckpoint,
    ) -> impl std::future::Future<Output = Result<RecordOutcome, RepositoryError>> + Send;

    /// Find the checkpoint recorded under an idempotency key.
    fn find_by_idempotency_key(
        &self,
        workflow_id: &str,
        step_id: &str,
        idempotency_key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, RepositoryError>> + Send;

    /// Most recent checkpoint for one step.
    fn latest(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<Checkpoint>, RepositoryError>> + Send;

    /// All checkpoints of an instance, in arrival order.
    fn list(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<Checkpoint>, RepositoryError>> + Send;

    /// Completion records: the first completing checkpoint per step.
    fn completions(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<BTreeMap<String, StepCompletion>, RepositoryError>> + Send;
}

/// Fold a checkpoint log into completion records.
///
/// Only the first `complete_step` checkpoint per step counts, so completions
/// are monotonic no matter how many later checkpoints arrive.
pub fn fold_completions<'a>(
    checkpoints: impl IntoIterator<Item = &'a Checkpoint>,
) -> BTreeMap<String, StepCompletion> {
    let mut completions = BTreeMap::new();
    for cp in checkpoints {
        if cp.complete_step && !completions.contains_key(&cp.step_id) {
            completions.insert(
                cp.step_id.clone(),
                StepCompletion {
                    outputs: cp.data.clone(),
                    completed_at: cp.created_at,
                    checkpoint_id: cp.id,
                },
            );
        }
    }
    completions
}
