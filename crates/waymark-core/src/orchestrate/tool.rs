//! Tool capability table.
//!
//! `Tool` uses RPITIT and so cannot be a trait object. Following the same
//! blanket-impl pattern as the store ports:
//! 1. `ToolDyn` is an object-safe mirror with boxed futures
//! 2. every `T: Tool` implements `ToolDyn`
//! 3. `BoxTool` wraps `Box<dyn ToolDyn>` and delegates
//!
//! `ToolRegistry` maps names to boxed tools and is consulted when a plan is
//! built, so unknown tools are rejected before anything runs.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use waymark_types::plan::{OrchestrationPlan, ToolDescriptor};

use super::error::{PlanError, ToolError};

/// A named capability the executor can invoke.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Complexity weight, if the tool wants to override the default table.
    fn weight(&self) -> Option<u32> {
        None
    }

    fn invoke(&self, params: &Value) -> impl Future<Output = Result<Value, ToolError>> + Send;
}

/// Object-safe version of [`Tool`] with boxed futures.
pub trait ToolDyn: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn weight(&self) -> Option<u32>;

    fn invoke_boxed<'a>(
        &'a self,
        params: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>>;
}

impl<T: Tool> ToolDyn for T {
    fn name(&self) -> &str {
        Tool::name(self)
    }

    fn description(&self) -> &str {
        Tool::description(self)
    }

    fn weight(&self) -> Option<u32> {
        Tool::weight(self)
    }

    fn invoke_boxed<'a>(
        &'a self,
        params: &'a Value,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + 'a>> {
        Box::pin(self.invoke(params))
    }
}

/// Type-erased tool.
pub struct BoxTool {
    inner: Box<dyn ToolDyn>,
}

impl BoxTool {
    pub fn new<T: Tool + 'static>(tool: T) -> Self {
        Self {
            inner: Box::new(tool),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn description(&self) -> &str {
        self.inner.description()
    }

    pub fn weight(&self) -> Option<u32> {
        self.inner.weight()
    }

    pub async fn invoke(&self, params: &Value) -> Result<Value, ToolError> {
        self.inner.invoke_boxed(params).await
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            weight: self.weight(),
        }
    }
}

impl std::fmt::Debug for BoxTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxTool").field("name", &self.name()).finish()
    }
}

// ---------------------------------------------------------------------------
// FnTool
// ---------------------------------------------------------------------------

/// A tool backed by a synchronous closure.
pub struct FnTool<F> {
    name: String,
    description: String,
    weight: Option<u32>,
    func: F,
}

impl<F> FnTool<F>
where
    F: Fn(&Value) -> Result<Value, ToolError> + Send + Sync,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            weight: None,
            func,
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = Some(weight);
        self
    }
}

impl<F> Tool for FnTool<F>
where
    F: Fn(&Value) -> Result<Value, ToolError> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn weight(&self) -> Option<u32> {
        self.weight
    }

    async fn invoke(&self, params: &Value) -> Result<Value, ToolError> {
        (self.func)(params)
    }
}

// ---------------------------------------------------------------------------
// ToolRegistry
// ---------------------------------------------------------------------------

/// Name -> tool table.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, BoxTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool of the same name.
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        self.register_boxed(BoxTool::new(tool));
    }

    pub fn register_boxed(&mut self, tool: BoxTool) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "replacing previously registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<&BoxTool> {
        self.tools.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Descriptors of every registered tool, sorted by name.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.values().map(BoxTool::descriptor).collect()
    }

    /// Fail with `UnknownTool` on the first plan step naming an unregistered tool.
    pub fn ensure_known(&self, plan: &OrchestrationPlan) -> Result<(), PlanError> {
        match plan.steps.iter().find(|s| !self.contains(&s.tool)) {
            Some(step) => Err(PlanError::UnknownTool(step.tool.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_registry_invokes_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::new("echo", "Echo params", |p: &Value| Ok(p.clone())));

        let tool = registry.get("echo").unwrap();
        let out = tool.invoke(&json!({"x": 1})).await.unwrap();
        assert_eq!(out, json!({"x": 1}));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_descriptors_sorted_with_weight() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::new("zeta", "z", |_: &Value| Ok(Value::Null)));
        registry.register(FnTool::new("alpha", "a", |_: &Value| Ok(Value::Null)).with_weight(4));

        let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
        assert_eq!(registry.descriptors()[0].weight, Some(4));
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = ToolRegistry::new();
        registry.register(FnTool::new("t", "first", |_: &Value| Ok(Value::Null)));
        registry.register(FnTool::new("t", "second", |_: &Value| Ok(Value::Null)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("t").unwrap().description(), "second");
    }
}
