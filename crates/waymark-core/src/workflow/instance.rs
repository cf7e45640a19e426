//! Instance state machine helpers.
//!
//! Pure functions over a template and an instance view. The async operations
//! that persist state live on `OrchestratorContext`.

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;
use waymark_types::instance::{InstanceStatus, StartWorkflow, StepCompletion, WorkflowInstance};
use waymark_types::template::{StepDefinition, TemplateDefinition};

use super::error::OrchestratorError;

/// Build a fresh `active` instance with an empty completion set.
pub fn new_instance(template: &TemplateDefinition, request: &StartWorkflow) -> WorkflowInstance {
    let now = Utc::now();
    WorkflowInstance {
        workflow_id: request
            .workflow_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string()),
        template_id: template.id.clone(),
        template_version: template.version.clone(),
        status: InstanceStatus::Active,
        created_by: request.created_by.clone(),
        initial_data: request.initial_data.clone(),
        completed_steps: BTreeMap::new(),
        source_request_id: request.source_request_id.clone(),
        failure_reason: None,
        created_at: now,
        updated_at: now,
    }
}

/// Find a step of the instance's template or fail with `UnknownStep`.
pub fn require_step<'t>(
    template: &'t TemplateDefinition,
    workflow_id: &str,
    step_id: &str,
) -> Result<&'t StepDefinition, OrchestratorError> {
    template
        .step(step_id)
        .ok_or_else(|| OrchestratorError::UnknownStep {
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
        })
}

/// True when every template step has a completion record.
pub fn all_steps_complete(
    template: &TemplateDefinition,
    completed: &BTreeMap<String, StepCompletion>,
) -> bool {
    template.steps.iter().all(|s| completed.contains_key(&s.id))
}

/// Status the instance should report given its completions.
///
/// `Completed` is only ever derived here; failed instances stay failed.
pub fn derive_status(template: &TemplateDefinition, instance: &WorkflowInstance) -> InstanceStatus {
    if instance.status == InstanceStatus::Failed {
        return InstanceStatus::Failed;
    }
    if all_steps_complete(template, &instance.completed_steps) {
        InstanceStatus::Completed
    } else {
        instance.status
    }
}
