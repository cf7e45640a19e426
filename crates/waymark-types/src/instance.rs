//! Workflow instance types.
//!
//! A `WorkflowInstance` is one running execution of a template. It is created
//! by `start`, mutated only through checkpoints and lifecycle actions, and can
//! be rebuilt by replaying its checkpoints.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::template::{StepDefinition, TemplateKey};

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Status of a workflow instance.
///
/// `Active` is initial. `Failed` and `Completed` are terminal; `Completed` is
/// derived once every step has a completion record and is never set directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Active,
    Paused,
    Failed,
    Completed,
}

impl InstanceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, InstanceStatus::Failed | InstanceStatus::Completed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Paused => "paused",
            InstanceStatus::Failed => "failed",
            InstanceStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(InstanceStatus::Active),
            "paused" => Ok(InstanceStatus::Paused),
            "failed" => Ok(InstanceStatus::Failed),
            "completed" => Ok(InstanceStatus::Completed),
            other => Err(format!("invalid instance status: '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Lifecycle actions
// ---------------------------------------------------------------------------

/// Caller-driven lifecycle action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Pause,
    Resume,
    Fail,
}

impl LifecycleAction {
    /// The status this action moves an instance into.
    pub fn target_status(self) -> InstanceStatus {
        match self {
            LifecycleAction::Pause => InstanceStatus::Paused,
            LifecycleAction::Resume => InstanceStatus::Active,
            LifecycleAction::Fail => InstanceStatus::Failed,
        }
    }
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleAction::Pause => "pause",
            LifecycleAction::Resume => "resume",
            LifecycleAction::Fail => "fail",
        };
        f.write_str(s)
    }
}

impl FromStr for LifecycleAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pause" => Ok(LifecycleAction::Pause),
            "resume" => Ok(LifecycleAction::Resume),
            "fail" => Ok(LifecycleAction::Fail),
            other => Err(format!("unknown lifecycle action: '{other}'")),
        }
    }
}

/// Outcome of `apply_action`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub workflow_id: String,
    pub action: LifecycleAction,
    pub previous_status: InstanceStatus,
    pub status: InstanceStatus,
    /// True when the instance was already in the target status.
    pub idempotent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// Completion record for one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCompletion {
    pub outputs: serde_json::Value,
    pub completed_at: DateTime<Utc>,
    /// Checkpoint that completed the step.
    pub checkpoint_id: uuid::Uuid,
}

/// One running execution of a template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowInstance {
    pub workflow_id: String,
    pub template_id: String,
    pub template_version: String,
    pub status: InstanceStatus,
    pub created_by: String,
    /// Data supplied at start time.
    #[serde(default)]
    pub initial_data: serde_json::Value,
    /// Step ID -> completion record. Entries are never removed.
    #[serde(default)]
    pub completed_steps: BTreeMap<String, StepCompletion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request_id: Option<String>,
    /// Reason recorded by the `fail` action.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowInstance {
    pub fn template_key(&self) -> TemplateKey {
        TemplateKey::new(&self.template_id, &self.template_version)
    }

    pub fn is_step_complete(&self, step_id: &str) -> bool {
        self.completed_steps.contains_key(step_id)
    }
}

/// Input for `start`.
///
/// When `version` is absent the highest registered version is used. When
/// `workflow_id` is absent a UUIDv7 is generated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartWorkflow {
    pub template_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub initial_data: serde_json::Value,
    #[serde(default)]
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Next-step resolution
// ---------------------------------------------------------------------------

/// A step whose dependencies are met but whose required flags do not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedStep {
    pub step_id: String,
    pub missing_flags: Vec<String>,
}

/// Answer to `next_step`.
///
/// `step: None` with `is_complete: false` is a legitimate blocked state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStep {
    pub workflow_id: String,
    pub status: InstanceStatus,
    pub step: Option<StepDefinition>,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocked: Vec<BlockedStep>,
    pub completed_count: usize,
    pub total_steps: usize,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
