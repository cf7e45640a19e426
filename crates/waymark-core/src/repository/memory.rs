//! In-memory workflow store backed by `DashMap`.
//!
//! Implements both `InstanceRepository` and `CheckpointStore`. Each instance's
//! checkpoint log lives behind one map entry, so the idempotency check and the
//! append happen under the same shard lock.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;
use waymark_types::checkpoint::{Checkpoint, NewCheckpoint, RecordOutcome};
use waymark_types::error::RepositoryError;
use waymark_types::instance::{InstanceStatus, StepCompletion, WorkflowInstance};

use super::checkpoint::{fold_completions, CheckpointStore};
use super::instance::InstanceRepository;

/// Ephemeral store for tests and single-process runs.
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    instances: DashMap<String, WorkflowInstance>,
    /// workflow_id -> checkpoints in arrival order
    checkpoints: DashMap<String, Vec<Checkpoint>>,
    /// (workflow_id, step_id) -> latest checkpoint
    latest: DashMap<(String, String), Checkpoint>,
    sequence: AtomicI64,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored checkpoints across all instances.
    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.iter().map(|entry| entry.value().len()).sum()
    }
}

impl InstanceRepository for InMemoryWorkflowStore {
    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        match self.instances.entry(instance.workflow_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "workflow '{}' already exists",
                instance.workflow_id
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let mut stored = instance.clone();
                stored.completed_steps.clear();
                slot.insert(stored);
                Ok(())
            }
        }
    }

    async fn get_instance(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowInstance>, RepositoryError> {
        let Some(base) = self.instances.get(workflow_id).map(|i| i.clone()) else {
            return Ok(None);
        };
        let mut instance = base;
        instance.completed_steps = self.completions(workflow_id).await?;
        Ok(Some(instance))
    }

    async fn update_status(
        &self,
        workflow_id: &str,
        status: InstanceStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let mut instance = self
            .instances
            .get_mut(workflow_id)
            .ok_or(RepositoryError::NotFound)?;
        instance.status = status;
        if let Some(reason) = failure_reason {
            instance.failure_reason = Some(reason.to_string());
        }
        instance.updated_at = Utc::now();
        Ok(())
    }

    async fn list_instances(
        &self,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let ids: Vec<String> = self
            .instances
            .iter()
            .filter(|entry| status.is_none_or(|s| entry.value().status == s))
            .map(|entry| entry.key().clone())
            .collect();

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(instance) = self.get_instance(&id).await? {
                out.push(instance);
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}

impl CheckpointStore for InMemoryWorkflowStore {
    async fn record(&self, new: &NewCheckpoint) -> Result<RecordOutcome, RepositoryError> {
        if !self.instances.contains_key(&new.workflow_id) {
            return Err(RepositoryError::NotFound);
        }

        let mut log = self.checkpoints.entry(new.workflow_id.clone()).or_default();

        if let Some(key) = new.idempotency_key.as_deref() {
            if let Some(prior) = log
                .iter()
                .find(|cp| cp.step_id == new.step_id && cp.idempotency_key.as_deref() == Some(key))
            {
                return Ok(RecordOutcome {
                    checkpoint: prior.clone(),
                    replayed: true,
                });
            }
        }

        let checkpoint = Checkpoint {
            id: Uuid::now_v7(),
            workflow_id: new.workflow_id.clone(),
            step_id: new.step_id.clone(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
            data: new.data.clone(),
            notes: new.notes.clone(),
            complete_step: new.complete_step,
            source_request_id: new.source_request_id.clone(),
            idempotency_key: new.idempotency_key.clone(),
            created_at: Utc::now(),
        };
        log.push(checkpoint.clone());
        drop(log);

        self.latest.insert(
            (checkpoint.workflow_id.clone(), checkpoint.step_id.clone()),
            checkpoint.clone(),
        );

        Ok(RecordOutcome {
            checkpoint,
            replayed: false,
        })
    }

    async fn find_by_idempotency_key(
        &self,
        workflow_id: &str,
        step_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        Ok(self.checkpoints.get(workflow_id).and_then(|log| {
            log.iter()
                .find(|cp| {
                    cp.step_id == step_id && cp.idempotency_key.as_deref() == Some(idempotency_key)
                })
                .cloned()
        }))
    }

    async fn latest(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        Ok(self
            .latest
            .get(&(workflow_id.to_string(), step_id.to_string()))
            .map(|cp| cp.clone()))
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<Checkpoint>, RepositoryError> {
        Ok(self
            .checkpoints
            .get(workflow_id)
            .map(|log| log.clone())
            .unwrap_or_default())
    }

    async fn completions(
        &self,
        workflow_id: &str,
    ) -> Result<BTreeMap<String, StepCompletion>, RepositoryError> {
        Ok(self
            .checkpoints
            .get(workflow_id)
            .map(|log| fold_completions(log.iter()))
            .unwrap_or_default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
