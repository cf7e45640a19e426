//! Intent -> plan synthesis.
//!
//! The intent is lowercased and split into words; a detector matches when one
//! of its keywords is a prefix of some word, or when one of its phrases occurs
//! in the normalized text. Each matching topic contributes a fixed step. Steps
//! that consume other steps' output depend on them.

use chrono::Utc;
use serde_json::{Map, Value, json};
use uuid::Uuid;
use waymark_types::config::ComplexityThresholds;
use waymark_types::plan::{OrchestrationPlan, OrchestrationStep};

use super::complexity::{self, ToolWeights};
use super::error::PlanError;
use crate::template::dag;

/// Topic categories recognized in an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Architecture,
    Task,
    Approach,
    Policy,
}

impl Topic {
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Architecture => "architecture",
            Topic::Task => "task",
            Topic::Approach => "approach",
            Topic::Policy => "policy",
        }
    }
}

struct Detector {
    topic: Topic,
    keywords: &'static [&'static str],
    phrases: &'static [&'static str],
}

const DETECTORS: &[Detector] = &[
    Detector {
        topic: Topic::Architecture,
        keywords: &["architecture", "design", "structure", "component", "module"],
        phrases: &[],
    },
    Detector {
        topic: Topic::Task,
        keywords: &["task", "implement", "build", "feature", "fix", "bug"],
        phrases: &[],
    },
    Detector {
        topic: Topic::Approach,
        keywords: &["approach", "strategy"],
        phrases: &["how should", "best way"],
    },
    Detector {
        topic: Topic::Policy,
        keywords: &["policy", "permission", "allowed", "access", "authorize"],
        phrases: &[],
    },
];

/// Step IDs and tools contributed by the detectors.
pub mod steps {
    pub const ARCHITECTURE: (&str, &str) = ("architecture", "get_architecture");
    pub const INVARIANTS: (&str, &str) = ("invariants", "get_invariants");
    pub const TASK_CONTEXT: (&str, &str) = ("task_context", "get_task_context");
    pub const POLICY_CHECK: (&str, &str) = ("policy_check", "check_policy");
    pub const APPROACH: (&str, &str) = ("approach", "suggest_approach");
}

/// Topics matched by `intent`, in detector order.
pub fn detect_topics(intent: &str) -> Vec<Topic> {
    let lowered = intent.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let normalized = words.join(" ");

    DETECTORS
        .iter()
        .filter(|d| {
            d.keywords
                .iter()
                .any(|k| words.iter().any(|w| w.starts_with(k)))
                || d.phrases.iter().any(|p| normalized.contains(p))
        })
        .map(|d| d.topic)
        .collect()
}

/// Build a plan for a free-text intent.
///
/// With no matching topic the plan is a single task-context step. The
/// returned plan is checked as a DAG and scored before it is handed out.
pub fn synthesize(
    intent: &str,
    context: Option<&Value>,
    constraints: Option<&Value>,
    weights: &ToolWeights,
    thresholds: &ComplexityThresholds,
) -> Result<OrchestrationPlan, PlanError> {
    let intent = intent.trim();
    if intent.is_empty() {
        return Err(PlanError::EmptyIntent);
    }

    let topics = detect_topics(intent);
    let has = |t: Topic| topics.contains(&t);
    let wants_task = has(Topic::Task) || topics.is_empty();

    let params = base_params(intent, context, constraints);
    let mut plan_steps: Vec<OrchestrationStep> = Vec::new();
    let mut push = |(id, tool): (&str, &str), description: &str, depends_on: Vec<String>| {
        plan_steps.push(OrchestrationStep {
            id: id.to_string(),
            tool: tool.to_string(),
            params: params.clone(),
            description: description.to_string(),
            depends_on,
        });
    };

    if has(Topic::Architecture) {
        push(steps::ARCHITECTURE, "Retrieve the relevant architecture", vec![]);
    }
    if has(Topic::Approach) {
        push(steps::INVARIANTS, "Retrieve invariants that constrain the change", vec![]);
    }
    if wants_task {
        push(steps::TASK_CONTEXT, "Gather context for the task", vec![]);
    }
    if has(Topic::Policy) {
        let deps = if wants_task {
            vec![steps::TASK_CONTEXT.0.to_string()]
        } else {
            vec![]
        };
        push(steps::POLICY_CHECK, "Check the change against policy", deps);
    }
    if has(Topic::Approach) {
        let mut deps = Vec::new();
        if has(Topic::Architecture) {
            deps.push(steps::ARCHITECTURE.0.to_string());
        }
        deps.push(steps::INVARIANTS.0.to_string());
        push(steps::APPROACH, "Suggest an implementation approach", deps);
    }

    dag::validate_dag(&plan_steps)?;
    let complexity = complexity::score(&plan_steps, weights, thresholds)?;

    let plan = OrchestrationPlan {
        id: Uuid::now_v7(),
        intent: intent.to_string(),
        steps: plan_steps,
        complexity,
        topics: topics.iter().map(|t| t.as_str().to_string()).collect(),
        created_at: Utc::now(),
    };

    tracing::debug!(
        plan_id = %plan.id,
        steps = plan.steps.len(),
        score = plan.complexity.score,
        level = %plan.complexity.level,
        "synthesized plan"
    );

    Ok(plan)
}

fn base_params(intent: &str, context: Option<&Value>, constraints: Option<&Value>) -> Value {
    let mut params = Map::new();
    params.insert("intent".to_string(), json!(intent));
    if let Some(context) = context.filter(|v| !v.is_null()) {
        params.insert("context".to_string(), context.clone());
    }
    if let Some(constraints) = constraints.filter(|v| !v.is_null()) {
        params.insert("constraints".to_string(), constraints.clone());
    }
    Value::Object(params)
}
