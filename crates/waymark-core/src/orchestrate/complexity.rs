//! Plan complexity scoring.
//!
//! score = sum of tool weights + maximum dependency depth, bucketed by the
//! configured thresholds.

use std::collections::HashMap;

use waymark_types::config::ComplexityThresholds;
use waymark_types::plan::{ComplexityLevel, OrchestrationStep, PlanComplexity, ToolDescriptor};

use crate::template::dag::{self, DagError};

/// Built-in weights for the standard context tools.
const DEFAULT_WEIGHTS: &[(&str, u32)] = &[
    ("get_architecture", 2),
    ("get_invariants", 1),
    ("get_task_context", 1),
    ("check_policy", 1),
    ("suggest_approach", 2),
];

const UNKNOWN_TOOL_WEIGHT: u32 = 1;

/// Weight lookup: config overrides, then tool descriptors, then built-ins.
#[derive(Debug, Clone, Default)]
pub struct ToolWeights {
    overrides: HashMap<String, u32>,
    declared: HashMap<String, u32>,
}

impl ToolWeights {
    pub fn new(overrides: HashMap<String, u32>) -> Self {
        Self {
            overrides,
            declared: HashMap::new(),
        }
    }

    /// Pick up weights the registered tools declare for themselves.
    pub fn with_descriptors(mut self, descriptors: &[ToolDescriptor]) -> Self {
        self.declared = descriptors
            .iter()
            .filter_map(|d| d.weight.map(|w| (d.name.clone(), w)))
            .collect();
        self
    }

    pub fn weight(&self, tool: &str) -> u32 {
        if let Some(w) = self.overrides.get(tool).or_else(|| self.declared.get(tool)) {
            return *w;
        }
        DEFAULT_WEIGHTS
            .iter()
            .find(|(name, _)| *name == tool)
            .map(|(_, w)| *w)
            .unwrap_or(UNKNOWN_TOOL_WEIGHT)
    }
}

/// Bucket a score.
pub fn level_for(score: u32, thresholds: &ComplexityThresholds) -> ComplexityLevel {
    if score <= thresholds.low_max {
        ComplexityLevel::Low
    } else if score <= thresholds.medium_max {
        ComplexityLevel::Medium
    } else {
        ComplexityLevel::High
    }
}

pub fn estimated_duration(level: ComplexityLevel) -> &'static str {
    match level {
        ComplexityLevel::Low => "under 1 minute",
        ComplexityLevel::Medium => "1-3 minutes",
        ComplexityLevel::High => "3-10 minutes",
    }
}

/// Score a plan's steps. Fails if the steps do not form a valid DAG.
pub fn score(
    steps: &[OrchestrationStep],
    weights: &ToolWeights,
    thresholds: &ComplexityThresholds,
) -> Result<PlanComplexity, DagError> {
    let tool_weight = steps
        .iter()
        .map(|s| weights.weight(&s.tool))
        .fold(0u32, |acc, w| acc.saturating_add(w));
    let max_depth = u32::try_from(dag::max_dependency_depth(steps)?).unwrap_or(u32::MAX);
    let score = tool_weight.saturating_add(max_depth);
    let level = level_for(score, thresholds);

    Ok(PlanComplexity {
        score,
        tool_weight,
        max_depth,
        level,
        estimated_duration: estimated_duration(level).to_string(),
    })
}
