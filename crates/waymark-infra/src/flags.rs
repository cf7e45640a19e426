//! Context-aware flag evaluator.
//!
//! A flag holds for an instance when any of these is true:
//! - it is listed in `flags` of `config.toml`
//! - `initialData.flags.<name>` is `true`
//! - some completed step's outputs contain `flags.<name> = true`

use std::collections::HashSet;

use serde_json::Value;
use waymark_core::flags::FlagEvaluator;
use waymark_types::instance::WorkflowInstance;

#[derive(Debug, Clone, Default)]
pub struct ContextFlagEvaluator {
    global: HashSet<String>,
}

impl ContextFlagEvaluator {
    pub fn new<I, T>(global: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            global: global.into_iter().map(Into::into).collect(),
        }
    }
}

fn flag_set(value: &Value, flag: &str) -> bool {
    value
        .get("flags")
        .and_then(|flags| flags.get(flag))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

impl FlagEvaluator for ContextFlagEvaluator {
    fn holds(&self, flag: &str, instance: &WorkflowInstance) -> bool {
        self.global.contains(flag)
            || flag_set(&instance.initial_data, flag)
            || instance
                .completed_steps
                .values()
                .any(|c| flag_set(&c.outputs, flag))
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

    fn instance(initial: Value) -> WorkflowInstance {
        WorkflowInstance {
            workflow_id: "wf".to_string(),
            template_id: "t".to_string(),
            template_version: "1".to_string(),
            status: InstanceStatus::Active,
            created_by: "tester".to_string(),
            initial_data: initial,
            completed_steps: BTreeMap::new(),
            source_request_id: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_global_flag() {
        let eval = ContextFlagEvaluator::new(["maintenance-window"]);
        assert!(eval.holds("maintenance-window", &instance(json!({}))));
        assert!(!eval.holds("other", &instance(json!({}))));
    }

    #[test]
    fn test_initial_data_flag_must_be_true() {
        let eval = ContextFlagEvaluator::default();
        let inst = instance(json!({"flags": {"approved": true, "reviewed": "yes"}}));
        assert!(eval.holds("approved", &inst));
        assert!(!eval.holds("reviewed", &inst));
    }

    #[test]
    fn test_step_output_flag() {
        let eval = ContextFlagEvaluator::default();
        let mut inst = instance(Value::Null);
        assert!(!eval.holds("tests-green", &inst));

        inst.completed_steps.insert(
            "test".to_string(),
            StepCompletion {
                outputs: json!({"flags": {"tests-green": true}}),
                completed_at: Utc::now(),
                checkpoint_id: Uuid::now_v7(),
            },
        );
        assert!(eval.holds("tests-green", &inst));
        assert_eq!(
            eval.missing(&["tests-green".to_string(), "signed".to_string()], &inst),
            vec!["signed".to_string()]
        );
    }
}
