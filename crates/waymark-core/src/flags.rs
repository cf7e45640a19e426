//! Flag evaluation port.
//!
//! Steps may declare `validation.requiredFlags`. Whether a flag currently holds
//! is decided outside the core; the resolver only asks.

use std::collections::HashSet;

use waymark_types::instance::WorkflowInstance;

/// Decides whether a named precondition holds for an instance.
pub trait FlagEvaluator: Send + Sync {
    fn holds(&self, flag: &str, instance: &WorkflowInstance) -> bool;

    /// Flags from `required` that do not hold, in declaration order.
    fn missing(&self, required: &[String], instance: &WorkflowInstance) -> Vec<String> {
        required
            .iter()
            .filter(|flag| !self.holds(flag, instance))
            .cloned()
            .collect()
    }
}

/// No flag ever holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFlags;

impl FlagEvaluator for NoFlags {
    fn holds(&self, _flag: &str, _instance: &WorkflowInstance) -> bool {
        false
    }
}

/// A fixed set of flags that hold for every instance.
#[derive(Debug, Clone, Default)]
pub struct StaticFlags {
    flags: HashSet<String>,
}

impl StaticFlags {
    pub fn new<I, T>(flags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }
}

impl FlagEvaluator for StaticFlags {
    fn holds(&self, flag: &str, _instance: &WorkflowInstance) -> bool {
        self.flags.contains(flag)
    }
}
