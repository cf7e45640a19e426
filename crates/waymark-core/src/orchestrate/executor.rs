//! Sequential plan executor.
//!
//! Steps run one at a time in wave order (flattened DAG waves, declaration
//! order inside a wave). Each consumer receives its dependencies' outputs
//! under `params.inputs.<stepId>`. The first failure stops the run; results
//! gathered before it are returned untouched.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::Instrument;
use waymark_types::plan::{
    ExecutionFailure, ExecutionResult, ExecutionStatus, FailureKind, OrchestrationPlan,
    OrchestrationStep, StepResult,
};

use super::error::PlanError;
use super::tool::ToolRegistry;
use crate::template::dag;

/// Execute a plan against a tool registry.
///
/// Structural problems and unregistered tools are reported as `Err` before any
/// step runs. Runtime failures produce `Ok` with `status: failed`.
pub async fn execute(
    plan: &OrchestrationPlan,
    registry: &ToolRegistry,
) -> Result<ExecutionResult, PlanError> {
    dag::validate_dag(&plan.steps)?;
    registry.ensure_known(plan)?;
    let order = dag::execution_order(&plan.steps)?;
    Ok(run_in_order(plan, &order, registry).await)
}

/// Run steps in the given order, checking dependencies before each one.
pub(crate) async fn run_in_order(
    plan: &OrchestrationPlan,
    order: &[&OrchestrationStep],
    registry: &ToolRegistry,
) -> ExecutionResult {
    let started_at = Utc::now();
    let mut results: Vec<StepResult> = Vec::with_capacity(order.len());
    let mut outputs: HashMap<&str, Value> = HashMap::new();
    let mut failure = None;

    for (position, step) in order.iter().enumerate() {
        if let Some(missing) = step
            .depends_on
            .iter()
            .find(|dep| !outputs.contains_key(dep.as_str()))
        {
            let err = PlanError::UnsatisfiedDependency {
                step_id: step.id.clone(),
                missing_id: missing.clone(),
            };
            tracing::error!(plan_id = %plan.id, step_id = %step.id, error = %err, "plan step not runnable");
            failure = Some(ExecutionFailure {
                step_id: step.id.clone(),
                position,
                kind: FailureKind::UnsatisfiedDependency,
                message: err.to_string(),
            });
            break;
        }

        let Some(tool) = registry.get(&step.tool) else {
            failure = Some(ExecutionFailure {
                step_id: step.id.clone(),
                position,
                kind: FailureKind::ToolError,
                message: PlanError::UnknownTool(step.tool.clone()).to_string(),
            });
            break;
        };

        let params = with_inputs(&step.params, &step.depends_on, &outputs);
        let span = tracing::info_span!(
            "plan.step",
            plan_id = %plan.id,
            step_id = %step.id,
            tool = %step.tool,
            position
        );

        let clock = Instant::now();
        match tool.invoke(&params).instrument(span).await {
            Ok(output) => {
                let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
                tracing::debug!(step_id = %step.id, duration_ms, "plan step completed");
                outputs.insert(step.id.as_str(), output.clone());
                results.push(StepResult {
                    step_id: step.id.clone(),
                    tool: step.tool.clone(),
                    output,
                    duration_ms,
                });
            }
            Err(err) => {
                tracing::warn!(step_id = %step.id, error = %err, "plan step failed, stopping execution");
                failure = Some(ExecutionFailure {
                    step_id: step.id.clone(),
                    position,
                    kind: FailureKind::ToolError,
                    message: err.to_string(),
                });
                break;
            }
        }
    }

    let status = if failure.is_some() {
        ExecutionStatus::Failed
    } else {
        ExecutionStatus::Completed
    };

    tracing::info!(
        plan_id = %plan.id,
        status = ?status,
        completed = results.len(),
        total = plan.steps.len(),
        "plan execution finished"
    );

    ExecutionResult {
        plan_id: plan.id,
        status,
        results,
        failure,
        started_at,
        finished_at: Utc::now(),
    }
}

/// Merge dependency outputs into the step params under `inputs`.
fn with_inputs(params: &Value, depends_on: &[String], outputs: &HashMap<&str, Value>) -> Value {
    if depends_on.is_empty() {
        return params.clone();
    }

    let inputs: Map<String, Value> = depends_on
        .iter()
        .filter_map(|dep| outputs.get(dep.as_str()).map(|v| (dep.clone(), v.clone())))
        .collect();

    let mut merged = match params {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    merged.insert("inputs".to_string(), Value::Object(inputs));
    Value::Object(merged)
}
