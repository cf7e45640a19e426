//! Ad-hoc orchestration plan types.
//!
//! An `OrchestrationPlan` is an ephemeral DAG of tool invocations synthesized
//! from a free-text intent. It is never stored as a template and lives for one
//! execution request.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// One tool invocation inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationStep {
    pub id: String,
    /// Registered tool name.
    pub tool: String,
    #[serde(default)]
    pub params: serde_json::Value,
    pub description: String,
    /// Other step IDs in the same plan whose output this step consumes.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

/// Complexity bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for ComplexityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ComplexityLevel::Low => "low",
            ComplexityLevel::Medium => "medium",
            ComplexityLevel::High => "high",
        };
        f.write_str(s)
    }
}

/// Scored complexity of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanComplexity {
    /// Sum of tool weights plus the maximum dependency depth.
    pub score: u32,
    pub tool_weight: u32,
    pub max_depth: u32,
    pub level: ComplexityLevel,
    /// Human-facing duration estimate (e.g. "under 1 minute").
    pub estimated_duration: String,
}

/// A synthesized, ephemeral DAG of tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationPlan {
    pub id: Uuid,
    pub intent: String,
    pub steps: Vec<OrchestrationStep>,
    pub complexity: PlanComplexity,
    /// Topic detectors that matched the intent.
    #[serde(default)]
    pub topics: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl OrchestrationPlan {
    pub fn step(&self, step_id: &str) -> Option<&OrchestrationStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

/// Final status of a plan execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

/// Output of one executed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
    pub step_id: String,
    pub tool: String,
    pub output: serde_json::Value,
    pub duration_ms: u64,
}

/// Why a step stopped the execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The tool returned an error.
    ToolError,
    /// A dependency had no result when the step was reached.
    UnsatisfiedDependency,
}

/// Where and why an execution stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailure {
    pub step_id: String,
    /// Zero-based position of the failing step in execution order.
    pub position: usize,
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of executing a plan.
///
/// On failure, `results` holds every step that finished before the failing
/// one; steps after it never ran and have no entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub plan_id: Uuid,
    pub status: ExecutionStatus,
    pub results: Vec<StepResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ExecutionFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn output_of(&self, step_id: &str) -> Option<&serde_json::Value> {
        self.results
            .iter()
            .find(|r| r.step_id == step_id)
            .map(|r| &r.output)
    }
}

// ---------------------------------------------------------------------------
// Tools and requests
// ---------------------------------------------------------------------------

/// Capability description of a registered tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Complexity weight; falls back to the built-in table when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
}

/// Input for the `orchestrate` boundary operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationRequest {
    pub intent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraints: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
}

/// Output of the `orchestrate` boundary operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrchestrationOutcome {
    pub plan: OrchestrationPlan,
    pub execution: ExecutionResult,
}
