//! SQLite workflow store.
//!
//! Implements `InstanceRepository` and `CheckpointStore` from `waymark-core`.
//! Instance rows hold status and start data; completion records are folded
//! from the checkpoint log on read. Checkpoint idempotency is enforced by the
//! `UNIQUE(workflow_id, step_id, idempotency_key)` constraint.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;
use waymark_core::repository::checkpoint::{fold_completions, CheckpointStore};
use waymark_core::repository::instance::InstanceRepository;
use waymark_types::checkpoint::{Checkpoint, NewCheckpoint, RecordOutcome};
use waymark_types::error::RepositoryError;
use waymark_types::instance::{InstanceStatus, StepCompletion, WorkflowInstance};

use super::pool::DatabasePool;

/// SQLite-backed workflow store.
pub struct SqliteWorkflowStore {
    pool: DatabasePool,
}

impl SqliteWorkflowStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

const CHECKPOINT_COLUMNS: &str = "seq, id, workflow_id, step_id, data, notes, complete_step, \
     source_request_id, idempotency_key, created_at";

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct InstanceRow {
    workflow_id: String,
    template_id: String,
    template_version: String,
    status: String,
    created_by: String,
    initial_data: String,
    source_request_id: Option<String>,
    failure_reason: Option<String>,
    created_at: String,
    updated_at: String,
}

impl InstanceRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            workflow_id: row.try_get("workflow_id")?,
            template_id: row.try_get("template_id")?,
            template_version: row.try_get("template_version")?,
            status: row.try_get("status")?,
            created_by: row.try_get("created_by")?,
            initial_data: row.try_get("initial_data")?,
            source_request_id: row.try_get("source_request_id")?,
            failure_reason: row.try_get("failure_reason")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_instance(
        self,
        completed_steps: BTreeMap<String, StepCompletion>,
    ) -> Result<WorkflowInstance, RepositoryError> {
        let status: InstanceStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let initial_data = serde_json::from_str(&self.initial_data)
            .map_err(|e| RepositoryError::Query(format!("invalid initial_data JSON: {e}")))?;

        Ok(WorkflowInstance {
            workflow_id: self.workflow_id,
            template_id: self.template_id,
            template_version: self.template_version,
            status,
            created_by: self.created_by,
            initial_data,
            completed_steps,
            source_request_id: self.source_request_id,
            failure_reason: self.failure_reason,
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct CheckpointRow {
    seq: i64,
    id: String,
    workflow_id: String,
    step_id: String,
    data: String,
    notes: Option<String>,
    complete_step: bool,
    source_request_id: Option<String>,
    idempotency_key: Option<String>,
    created_at: String,
}

impl CheckpointRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            seq: row.try_get("seq")?,
            id: row.try_get("id")?,
            workflow_id: row.try_get("workflow_id")?,
            step_id: row.try_get("step_id")?,
            data: row.try_get("data")?,
            notes: row.try_get("notes")?,
            complete_step: row.try_get("complete_step")?,
            source_request_id: row.try_get("source_request_id")?,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn into_checkpoint(self) -> Result<Checkpoint, RepositoryError> {
        Ok(Checkpoint {
            id: parse_uuid(&self.id)?,
            workflow_id: self.workflow_id,
            step_id: self.step_id,
            sequence: self.seq,
            data: serde_json::from_str(&self.data)
                .map_err(|e| RepositoryError::Query(format!("invalid checkpoint data JSON: {e}")))?,
            notes: self.notes,
            complete_step: self.complete_step,
            source_request_id: self.source_request_id,
            idempotency_key: self.idempotency_key,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn rows_to_checkpoints(rows: &[sqlx::sqlite::SqliteRow]) -> Result<Vec<Checkpoint>, RepositoryError> {
    rows.iter()
        .map(|row| {
            CheckpointRow::from_row(row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_checkpoint()
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn map_write_error(err: sqlx::Error) -> RepositoryError {
    match err.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => RepositoryError::NotFound,
        Some(db) if db.is_unique_violation() => RepositoryError::Conflict(db.message().to_string()),
        _ => RepositoryError::Query(err.to_string()),
    }
}

impl SqliteWorkflowStore {
    async fn checkpoint_by_key(
        &self,
        workflow_id: &str,
        step_id: &str,
        idempotency_key: &str,
        from_writer: bool,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        let pool = if from_writer { &self.pool.writer } else { &self.pool.reader };
        let row = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints \
             WHERE workflow_id = ? AND step_id = ? AND idempotency_key = ?"
        ))
        .bind(workflow_id)
        .bind(step_id)
        .bind(idempotency_key)
        .fetch_optional(pool)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            CheckpointRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_checkpoint()
        })
        .transpose()
    }
}

// ---------------------------------------------------------------------------
// InstanceRepository impl
// ---------------------------------------------------------------------------

impl InstanceRepository for SqliteWorkflowStore {
    async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
        let initial_data = serde_json::to_string(&instance.initial_data)
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO workflow_instances
               (workflow_id, template_id, template_version, status, created_by,
                initial_data, source_request_id, failure_reason, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&instance.workflow_id)
        .bind(&instance.template_id)
        .bind(&instance.template_version)
        .bind(instance.status.as_str())
        .bind(&instance.created_by)
        .bind(&initial_data)
        .bind(&instance.source_request_id)
        .bind(&instance.failure_reason)
        .bind(format_datetime(&instance.created_at))
        .bind(format_datetime(&instance.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(map_write_error)?;

        tracing::debug!(workflow_id = %instance.workflow_id, "instance row inserted");
        Ok(())
    }

    async fn get_instance(
        &self,
        workflow_id: &str,
    ) -> Result<Option<WorkflowInstance>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM workflow_instances WHERE workflow_id = ?")
            .bind(workflow_id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let instance_row =
            InstanceRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
        let completions = self.completions(workflow_id).await?;
        Ok(Some(instance_row.into_instance(completions)?))
    }

    async fn update_status(
        &self,
        workflow_id: &str,
        status: InstanceStatus,
        failure_reason: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE workflow_instances
               SET status = ?, failure_reason = COALESCE(?, failure_reason), updated_at = ?
               WHERE workflow_id = ?"#,
        )
        .bind(status.as_str())
        .bind(failure_reason)
        .bind(format_datetime(&Utc::now()))
        .bind(workflow_id)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        tracing::debug!(workflow_id, status = %status, "instance status updated");
        Ok(())
    }

    async fn list_instances(
        &self,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<WorkflowInstance>, RepositoryError> {
        let rows = match status {
            Some(s) => {
                sqlx::query(
                    "SELECT * FROM workflow_instances WHERE status = ? ORDER BY created_at ASC",
                )
                .bind(s.as_str())
                .fetch_all(&self.pool.reader)
                .await
            }
            None => {
                sqlx::query("SELECT * FROM workflow_instances ORDER BY created_at ASC")
                    .fetch_all(&self.pool.reader)
                    .await
            }
        }
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut instances = Vec::with_capacity(rows.len());
        for row in &rows {
            let instance_row =
                InstanceRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            let completions = self.completions(&instance_row.workflow_id).await?;
            instances.push(instance_row.into_instance(completions)?);
        }
        Ok(instances)
    }
}

// ---------------------------------------------------------------------------
// CheckpointStore impl
// ---------------------------------------------------------------------------

impl CheckpointStore for SqliteWorkflowStore {
    async fn record(&self, new: &NewCheckpoint) -> Result<RecordOutcome, RepositoryError> {
        let id = Uuid::now_v7();
        let data =
            serde_json::to_string(&new.data).map_err(|e| RepositoryError::Query(e.to_string()))?;

        let inserted = sqlx::query(&format!(
            r#"INSERT INTO checkpoints
               (id, workflow_id, step_id, data, notes, complete_step,
                source_request_id, idempotency_key, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT (workflow_id, step_id, idempotency_key) DO NOTHING
               RETURNING {CHECKPOINT_COLUMNS}"#
        ))
        .bind(id.to_string())
        .bind(&new.workflow_id)
        .bind(&new.step_id)
        .bind(&data)
        .bind(&new.notes)
        .bind(new.complete_step)
        .bind(&new.source_request_id)
        .bind(&new.idempotency_key)
        .bind(format_datetime(&Utc::now()))
        .fetch_optional(&self.pool.writer)
        .await
        .map_err(map_write_error)?;

        if let Some(row) = inserted {
            let checkpoint = CheckpointRow::from_row(&row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_checkpoint()?;
            return Ok(RecordOutcome {
                checkpoint,
                replayed: false,
            });
        }

        // Conflict: only reachable with a non-null key.
        let key = new.idempotency_key.as_deref().ok_or_else(|| {
            RepositoryError::Query("checkpoint insert ignored without idempotency key".to_string())
        })?;
        let prior = self
            .checkpoint_by_key(&new.workflow_id, &new.step_id, key, true)
            .await?
            .ok_or(RepositoryError::NotFound)?;

        Ok(RecordOutcome {
            checkpoint: prior,
            replayed: true,
        })
    }

    async fn find_by_idempotency_key(
        &self,
        workflow_id: &str,
        step_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        self.checkpoint_by_key(workflow_id, step_id, idempotency_key, false)
            .await
    }

    async fn latest(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Checkpoint>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints \
             WHERE workflow_id = ? AND step_id = ? ORDER BY seq DESC LIMIT 1"
        ))
        .bind(workflow_id)
        .bind(step_id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|r| {
            CheckpointRow::from_row(&r)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_checkpoint()
        })
        .transpose()
    }

    async fn list(&self, workflow_id: &str) -> Result<Vec<Checkpoint>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE workflow_id = ? ORDER BY seq ASC"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows_to_checkpoints(&rows)
    }

    async fn completions(
        &self,
        workflow_id: &str,
    ) -> Result<BTreeMap<String, StepCompletion>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints \
             WHERE workflow_id = ? AND complete_step = 1 ORDER BY seq ASC"
        ))
        .bind(workflow_id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(fold_completions(&rows_to_checkpoints(&rows)?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store(dir: &tempfile::TempDir) -> SqliteWorkflowStore {
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        SqliteWorkflowStore::new(DatabasePool::new(&url).await.unwrap())
    }

    fn instance(workflow_id: &str) -> WorkflowInstance {
        let now = Utc::now();
        WorkflowInstance {
            workflow_id: workflow_id.to_string(),
            template_id: "release".to_string(),
            template_version: "2.0.0".to_string(),
            status: InstanceStatus::Active,
            created_by: "alice".to_string(),
            initial_data: json!({"flags": {"approved": true}}),
            completed_steps: BTreeMap::new(),
            source_request_id: Some("req-1".to_string()),
            failure_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn cp(step: &str, key: Option<&str>, complete: bool) -> NewCheckpoint {
        NewCheckpoint {
            workflow_id: "wf-1".to_string(),
            step_id: step.to_string(),
            data: json!({"step": step}),
            notes: Some("note".to_string()),
            complete_step: complete,
            source_request_id: None,
            idempotency_key: key.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_instance_roundtrip_and_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        store.create_instance(&instance("wf-1")).await.unwrap();
        let loaded = store.get_instance("wf-1").await.unwrap().unwrap();
        assert_eq!(loaded.template_version, "2.0.0");
        assert_eq!(loaded.initial_data["flags"]["approved"], json!(true));
        assert_eq!(loaded.status, InstanceStatus::Active);

        let err = store.create_instance(&instance("wf-1")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
        assert!(store.get_instance("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_same_key_persists_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.create_instance(&instance("wf-1")).await.unwrap();

        let first = store.record(&cp("a", Some("k"), true)).await.unwrap();
        let second = store.record(&cp("a", Some("k"), true)).await.unwrap();
        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(first.checkpoint.id, second.checkpoint.id);
        assert_eq!(store.list("wf-1").await.unwrap().len(), 1);

        let found = store.find_by_idempotency_key("wf-1", "a", "k").await.unwrap();
        assert_eq!(found.unwrap().id, first.checkpoint.id);
    }

    #[tokio::test]
    async fn test_unkeyed_checkpoints_append() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.create_instance(&instance("wf-1")).await.unwrap();

        let a1 = store.record(&cp("a", None, false)).await.unwrap();
        let a2 = store.record(&cp("a", None, true)).await.unwrap();
        let a3 = store.record(&cp("a", None, true)).await.unwrap();
        assert!(a1.checkpoint.sequence < a2.checkpoint.sequence);

        let latest = store.latest("wf-1", "a").await.unwrap().unwrap();
        assert_eq!(latest.id, a3.checkpoint.id);

        let view = store.get_instance("wf-1").await.unwrap().unwrap();
        assert_eq!(view.completed_steps["a"].checkpoint_id, a2.checkpoint.id);
    }

    #[tokio::test]
    async fn test_record_for_missing_instance() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let err = store.record(&cp("a", None, false)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn test_status_update_keeps_reason() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.create_instance(&instance("wf-1")).await.unwrap();
        store.create_instance(&instance("wf-2")).await.unwrap();

        store
            .update_status("wf-1", InstanceStatus::Failed, Some("broken build"))
            .await
            .unwrap();
        let failed = store.list_instances(Some(InstanceStatus::Failed)).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].failure_reason.as_deref(), Some("broken build"));
        assert_eq!(store.list_instances(None).await.unwrap().len(), 2);

        let err = store
            .update_status("nope", InstanceStatus::Paused, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }
}
