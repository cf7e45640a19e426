//! Workflow template types.
//!
//! A template is an authored, versioned, immutable definition of a workflow as
//! a DAG of steps. Revising a template means publishing a new version; the
//! pair `(id, version)` identifies one immutable entity.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Template Definition
// ---------------------------------------------------------------------------

/// The canonical template definition.
///
/// YAML files, JSON payloads and programmatic callers all convert to this
/// struct. It only becomes startable after structural validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateDefinition {
    /// Template identifier (e.g. "add-endpoint").
    pub id: String,
    /// Version string; semver when possible (e.g. "1.2.0").
    pub version: String,
    /// Human-readable title.
    pub title: String,
    /// Longer description of what the workflow accomplishes.
    #[serde(default)]
    pub description: String,
    /// Optional grouping used by `list_templates`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Ordered list of steps; declaration order breaks resolver ties.
    pub steps: Vec<StepDefinition>,
    /// Extensible metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TemplateDefinition {
    /// The `(id, version)` key identifying this template.
    pub fn key(&self) -> TemplateKey {
        TemplateKey::new(&self.id, &self.version)
    }

    /// Look up a step by its ID.
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.id == step_id)
    }
}

/// Identity of one immutable template revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TemplateKey {
    pub id: String,
    pub version: String,
}

impl TemplateKey {
    pub fn new(id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.version)
    }
}

/// Order two template version strings.
///
/// Uses semver ordering when both sides parse, plain string ordering otherwise.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(va), Ok(vb)) => va.cmp(&vb),
        _ => a.cmp(b),
    }
}

// ---------------------------------------------------------------------------
// Step Definition
// ---------------------------------------------------------------------------

/// A single step in the template DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    /// Step ID, unique within its template.
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Ordered instructions for whoever performs the step. Opaque to the core.
    #[serde(default)]
    pub actions: Vec<String>,
    /// Step IDs this step depends on (DAG edges).
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub validation: StepValidation,
    /// Advisory timeout for the caller or tool layer; never enforced here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_sec: Option<u64>,
    /// Optional schema describing what the step is expected to output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<serde_json::Value>,
}

/// Preconditions that must hold before a step becomes eligible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepValidation {
    /// Named flags evaluated by an external collaborator.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_flags: Vec<String>,
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// Condensed template view returned by `list_templates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateSummary {
    pub id: String,
    pub version: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub step_count: usize,
}

impl From<&TemplateDefinition> for TemplateSummary {
    fn from(def: &TemplateDefinition) -> Self {
        Self {
            id: def.id.clone(),
            version: def.version.clone(),
            title: def.title.clone(),
            description: def.description.clone(),
            category: def.category.clone(),
            tags: def.tags.clone(),
            step_count: def.steps.len(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
