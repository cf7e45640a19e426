//! Next-step resolution.
//!
//! A step is eligible when it is not complete, all of its dependencies are
//! complete, and every required flag holds. The first eligible step in
//! declaration order wins, so identical state always yields the same answer.

use waymark_types::instance::{BlockedStep, NextStep, WorkflowInstance};
use waymark_types::template::TemplateDefinition;

use crate::flags::FlagEvaluator;

/// Compute the next eligible step for an instance.
///
/// `step: None, is_complete: false` means nothing is eligible yet. Steps whose
/// dependencies are met but whose flags do not hold are listed in `blocked`.
pub fn resolve_next(
    template: &TemplateDefinition,
    instance: &WorkflowInstance,
    flags: &dyn FlagEvaluator,
) -> NextStep {
    let completed = &instance.completed_steps;
    let is_complete = template.steps.iter().all(|s| completed.contains_key(&s.id));

    let mut next = None;
    let mut blocked = Vec::new();

    for step in &template.steps {
        if completed.contains_key(&step.id) {
            continue;
        }
        if !step.depends_on.iter().all(|dep| completed.contains_key(dep)) {
            continue;
        }
        let missing = flags.missing(&step.validation.required_flags, instance);
        if missing.is_empty() {
            if next.is_none() {
                next = Some(step.clone());
            }
        } else {
            blocked.push(BlockedStep {
                step_id: step.id.clone(),
                missing_flags: missing,
            });
        }
    }

    NextStep {
        workflow_id: instance.workflow_id.clone(),
        status: instance.status,
        step: next,
        is_complete,
        blocked,
        completed_count: template
            .steps
            .iter()
            .filter(|s| completed.contains_key(&s.id))
            .count(),
        total_steps: template.steps.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;
    use waymark_types::instance::{InstanceStatus, StepCompletion};
    use waymark_types::template::{StepDefinition, StepValidation};

    use crate::flags::{NoFlags, StaticFlags};

    fn step(id: &str, deps: &[&str], flags: &[&str]) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            title: id.to_string(),
            description: None,
            actions: vec![],
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            validation: StepValidation {
                required_flags: flags.iter().map(|s| s.to_string()).collect(),
            },
            timeout_sec: None,
            outputs: None,
        }
    }

    fn template(steps: Vec<StepDefinition>) -> TemplateDefinition {
        TemplateDefinition {
            id: "t".to_string(),
            version: "1".to_string(),
            title: "T".to_string(),
            description: String::new(),
            category: None,
            tags: vec![],
            steps,
            metadata: Default::default(),
        }
    }

    fn instance() -> WorkflowInstance {
        WorkflowInstance {
            workflow_id: "wf".to_string(),
            template_id: "t".to_string(),
            template_version: "1".to_string(),
            status: InstanceStatus::Active,
            created_by: "tester".to_string(),
            initial_data: json!({}),
            completed_steps: BTreeMap::new(),
            source_request_id: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn complete(instance: &mut WorkflowInstance, step_id: &str) {
        instance.completed_steps.insert(
            step_id.to_string(),
            StepCompletion {
                outputs: json!({}),
                completed_at: Utc::now(),
                checkpoint_id: Uuid::now_v7(),
            },
        );
    }

    #[test]
    fn test_linear_chain_walks_in_order() {
        let t = template(vec![step("A", &[], &[]), step("B", &["A"], &[]), step("C", &["B"], &[])]);
        let mut inst = instance();

        let next = resolve_next(&t, &inst, &NoFlags);
        assert_eq!(next.step.unwrap().id, "A");
        assert!(!next.is_complete);

        complete(&mut inst, "A");
        let next = resolve_next(&t, &inst, &NoFlags);
        assert_eq!(next.step.unwrap().id, "B");

        complete(&mut inst, "B");
        complete(&mut inst, "C");
        let next = resolve_next(&t, &inst, &NoFlags);
        assert!(next.step.is_none());
        assert!(next.is_complete);
        assert_eq!(next.completed_count, 3);
    }

    #[test]
    fn test_ties_break_by_declaration_order() {
        let t = template(vec![step("z", &[], &[]), step("a", &[], &[])]);
        let first = resolve_next(&t, &instance(), &NoFlags);
        let second = resolve_next(&t, &instance(), &NoFlags);
        assert_eq!(first.step.as_ref().unwrap().id, "z");
        assert_eq!(first, second);
    }

    #[test]
    fn test_unmet_flags_block_without_error() {
        let t = template(vec![step("a", &[], &[]), step("b", &["a"], &["reviewed"])]);
        let mut inst = instance();
        complete(&mut inst, "a");

        let next = resolve_next(&t, &inst, &NoFlags);
        assert!(next.step.is_none());
        assert!(!next.is_complete);
        assert_eq!(next.blocked.len(), 1);
        assert_eq!(next.blocked[0].step_id, "b");
        assert_eq!(next.blocked[0].missing_flags, vec!["reviewed".to_string()]);

        let next = resolve_next(&t, &inst, &StaticFlags::new(["reviewed"]));
        assert_eq!(next.step.unwrap().id, "b");
        assert!(next.blocked.is_empty());
    }

    #[test]
    fn test_flagged_step_skipped_for_later_eligible_one() {
        let t = template(vec![step("gate", &[], &["approved"]), step("docs", &[], &[])]);
        let next = resolve_next(&t, &instance(), &NoFlags);
        assert_eq!(next.step.unwrap().id, "docs");
        assert_eq!(next.blocked[0].step_id, "gate");
    }

    #[test]
    fn test_steps_with_pending_deps_are_not_blocked() {
        let t = template(vec![step("a", &[], &[]), step("b", &["a"], &["x"])]);
        let next = resolve_next(&t, &instance(), &NoFlags);
        assert_eq!(next.step.unwrap().id, "a");
        assert!(next.blocked.is_empty());
    }
}
