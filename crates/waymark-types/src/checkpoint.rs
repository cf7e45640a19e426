//! Checkpoint types.
//!
//! A checkpoint is a persisted progress record for one step of one instance.
//! Many checkpoints may exist per step; checkpoints for one step are totally
//! ordered by their arrival sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// UUIDv7 checkpoint ID.
    pub id: Uuid,
    pub workflow_id: String,
    pub step_id: String,
    /// Arrival order within the store (monotonic across the whole store).
    pub sequence: i64,
    /// Caller-supplied payload. Becomes the step outputs when completing.
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub complete_step: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a checkpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCheckpoint {
    pub workflow_id: String,
    pub step_id: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub complete_step: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// Result of recording a checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub checkpoint: Checkpoint,
    /// True when an earlier checkpoint with the same idempotency key was returned.
    pub replayed: bool,
}

/// Result of the `checkpoint` boundary operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointReceipt {
    pub checkpoint: Checkpoint,
    pub replayed: bool,
    /// True when this call (not an earlier one) completed the step.
    pub step_completed: bool,
    pub instance_status: crate::instance::InstanceStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_checkpoint_defaults_from_json() {
        let cp: NewCheckpoint = serde_json::from_value(json!({
            "workflowId": "wf-1",
            "stepId": "a"
        }))
        .unwrap();
        assert!(!cp.complete_step);
        assert!(cp.idempotency_key.is_none());
        assert!(cp.data.is_null());
    }

    #[test]
    fn test_checkpoint_skips_empty_optionals() {
        let cp = Checkpoint {
            id: Uuid::now_v7(),
            workflow_id: "wf-1".to_string(),
            step_id: "a".to_string(),
            sequence: 1,
            data: json!({"ok": true}),
            notes: None,
            complete_step: true,
            source_request_id: None,
            idempotency_key: None,
            created_at: Utc::now(),
        };
        let value = serde_json::to_value(&cp).unwrap();
        assert!(value.get("notes").is_none());
        assert!(value.get("idempotencyKey").is_none());
        assert_eq!(value["completeStep"], json!(true));
    }
}
