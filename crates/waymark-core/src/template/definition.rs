//! Template parsing, validation, and filesystem operations.
//!
//! Converts between YAML/JSON and the canonical `TemplateDefinition`,
//! validates field shapes and DAG structure, and discovers template files on
//! disk. Validation is pure: a template that fails it is never registered.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use thiserror::Error;
use waymark_types::template::TemplateDefinition;

use super::dag::{validate_dag, DagError};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Structural errors raised while loading or validating a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Field shape violation.
    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("duplicate step ID: '{0}'")]
    DuplicateStep(String),

    #[error("step '{step_id}' depends on unknown step '{missing_id}'")]
    UnknownDependency { step_id: String, missing_id: String },

    #[error("cycle detected involving step '{step_id}'")]
    CyclicDependency { step_id: String },

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<DagError> for TemplateError {
    fn from(err: DagError) -> Self {
        match err {
            DagError::DuplicateNode(id) => TemplateError::DuplicateStep(id),
            DagError::UnknownDependency {
                step_id,
                missing_id,
            } => TemplateError::UnknownDependency {
                step_id,
                missing_id,
            },
            DagError::CyclicDependency { step_id } => TemplateError::CyclicDependency { step_id },
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn is_valid_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Validate a template: field shapes first, then the two graph properties.
///
/// Checks:
/// - Template id is a non-empty identifier, version and title non-empty
/// - At least one step exists
/// - Step ids are identifiers, titles non-empty, flags non-empty
/// - `timeout_sec` > 0 if set
/// - Step ids are unique, every `depends_on` resolves, no cycle exists
pub fn validate_template(def: &TemplateDefinition) -> Result<(), TemplateError> {
    if !is_valid_identifier(&def.id) {
        return Err(TemplateError::ValidationError(format!(
            "template id '{}' must be non-empty and contain only alphanumerics, '-', '_' or '.'",
            def.id
        )));
    }
    if def.version.trim().is_empty() {
        return Err(TemplateError::ValidationError(
            "template version must not be empty".to_string(),
        ));
    }
    if def.title.trim().is_empty() {
        return Err(TemplateError::ValidationError(
            "template title must not be empty".to_string(),
        ));
    }
    if def.steps.is_empty() {
        return Err(TemplateError::ValidationError(
            "template must have at least one step".to_string(),
        ));
    }

    for step in &def.steps {
        if !is_valid_identifier(&step.id) {
            return Err(TemplateError::ValidationError(format!(
                "step id '{}' contains invalid characters",
                step.id
            )));
        }
        if step.title.trim().is_empty() {
            return Err(TemplateError::ValidationError(format!(
                "step '{}' must have a title",
                step.id
            )));
        }
        if step.timeout_sec == Some(0) {
            return Err(TemplateError::ValidationError(format!(
                "step '{}' timeout must be > 0",
                step.id
            )));
        }
        let mut flags = HashSet::new();
        for flag in &step.validation.required_flags {
            if flag.trim().is_empty() {
                return Err(TemplateError::ValidationError(format!(
                    "step '{}' has an empty required flag",
                    step.id
                )));
            }
            if !flags.insert(flag.as_str()) {
                return Err(TemplateError::ValidationError(format!(
                    "step '{}' lists flag '{}' twice",
                    step.id, flag
                )));
            }
        }
    }

    validate_dag(&def.steps)?;
    Ok(())
}

/// Deserialize and validate a raw JSON value.
pub fn validate_template_value(raw: serde_json::Value) -> Result<TemplateDefinition, TemplateError> {
    let def: TemplateDefinition =
        serde_json::from_value(raw).map_err(|e| TemplateError::ParseError(e.to_string()))?;
    validate_template(&def)?;
    Ok(def)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `TemplateDefinition`.
pub fn parse_template_yaml(yaml: &str) -> Result<TemplateDefinition, TemplateError> {
    let def: TemplateDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| TemplateError::ParseError(e.to_string()))?;
    validate_template(&def)?;
    Ok(def)
}

/// Parse a JSON string into a validated `TemplateDefinition`.
pub fn parse_template_json(json: &str) -> Result<TemplateDefinition, TemplateError> {
    let def: TemplateDefinition =
        serde_json::from_str(json).map_err(|e| TemplateError::ParseError(e.to_string()))?;
    validate_template(&def)?;
    Ok(def)
}

/// Serialize a `TemplateDefinition` to a YAML string.
pub fn serialize_template_yaml(def: &TemplateDefinition) -> Result<String, TemplateError> {
    serde_yaml_ng::to_string(def).map_err(|e| TemplateError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

fn is_template_file(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext == "yaml" || ext == "yml" || ext == "json")
}

/// Load a template from a `.yaml`, `.yml` or `.json` file.
pub fn load_template_file(path: &Path) -> Result<TemplateDefinition, TemplateError> {
    let content = std::fs::read_to_string(path)?;
    if path.extension().is_some_and(|ext| ext == "json") {
        parse_template_json(&content)
    } else {
        parse_template_yaml(&content)
    }
}

/// Save a template to a YAML file, creating parent directories.
pub fn save_template_file(path: &Path, def: &TemplateDefinition) -> Result<(), TemplateError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_template_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all valid template files under `base_dir`.
///
/// Files that fail to parse or validate are skipped with a warning.
pub fn discover_templates(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, TemplateDefinition)>, TemplateError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    results.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, TemplateDefinition)>,
) -> Result<(), TemplateError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if is_template_file(&path) {
            match load_template_file(&path) {
                Ok(def) => results.push((path, def)),
                Err(error) => {
                    tracing::warn!(?path, %error, "skipping invalid template file");
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use waymark_types::template::{StepDefinition, StepValidation};

    fn step(id: &str, depends_on: Vec<&str>) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            title: format!("Step {id}"),
            description: None,
            actions: vec![],
            depends_on: depends_on.into_iter().map(String::from).collect(),
            validation: StepValidation::default(),
            timeout_sec: None,
            outputs: None,
        }
    }

    fn template(steps: Vec<StepDefinition>) -> TemplateDefinition {
        TemplateDefinition {
            id: "feature".to_string(),
            version: "1.0.0".to_string(),
            title: "Ship a feature".to_string(),
            description: String::new(),
            category: None,
            tags: vec![],
            steps,
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn test_accepts_linear_template() {
        let def = template(vec![step("a", vec![]), step("b", vec!["a"]), step("c", vec!["b"])]);
        assert!(validate_template(&def).is_ok());
    }

    #[test]
    fn test_rejects_dangling_dependency() {
        let raw = json!({
            "id": "t",
            "version": "1",
            "title": "T",
            "steps": [
                {"id": "a", "title": "A", "dependsOn": []},
                {"id": "b", "title": "B", "dependsOn": ["a"]},
                {"id": "c", "title": "C", "dependsOn": ["x"]}
            ]
        });
        match validate_template_value(raw).unwrap_err() {
            TemplateError::UnknownDependency {
                step_id,
                missing_id,
            } => {
                assert_eq!(step_id, "c");
                assert_eq!(missing_id, "x");
            }
            other => panic!("expected UnknownDependency, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_cycle() {
        let def = template(vec![step("a", vec!["b"]), step("b", vec!["a"])]);
        assert!(matches!(
            validate_template(&def).unwrap_err(),
            TemplateError::CyclicDependency { .. }
        ));
    }

    #[test]
    fn test_rejects_duplicate_step_ids() {
        let def = template(vec![step("a", vec![]), step("a", vec![])]);
        let msg = validate_template(&def).unwrap_err().to_string();
        assert!(msg.contains("duplicate step ID"), "got: {msg}");
    }

    #[test]
    fn test_rejects_empty_template() {
        let msg = validate_template(&template(vec![])).unwrap_err().to_string();
        assert!(msg.contains("at least one step"), "got: {msg}");
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let mut def = template(vec![step("a", vec![])]);
        def.id = "has spaces".to_string();
        assert!(matches!(
            validate_template(&def).unwrap_err(),
            TemplateError::ValidationError(_)
        ));

        let mut def = template(vec![step("a", vec![])]);
        def.steps[0].timeout_sec = Some(0);
        let msg = validate_template(&def).unwrap_err().to_string();
        assert!(msg.contains("timeout must be > 0"), "got: {msg}");

        let mut def = template(vec![step("a", vec![])]);
        def.steps[0].validation.required_flags = vec!["ok".to_string(), "ok".to_string()];
        assert!(validate_template(&def).is_err());
    }

    #[test]
    fn test_shape_errors_reported_before_graph_errors() {
        let mut def = template(vec![step("a", vec!["missing"])]);
        def.version = String::new();
        assert!(matches!(
            validate_template(&def).unwrap_err(),
            TemplateError::ValidationError(_)
        ));
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
id: bugfix
version: "2.1.0"
title: Fix a bug
category: maintenance
steps:
  - id: reproduce
    title: Reproduce
    actions: ["Write a failing test"]
  - id: fix
    title: Fix
    dependsOn: [reproduce]
    validation:
      requiredFlags: [repro-confirmed]
    timeoutSec: 1800
"#;
        let def = parse_template_yaml(yaml).expect("should parse");
        assert_eq!(def.steps.len(), 2);
        assert_eq!(def.steps[1].validation.required_flags, vec!["repro-confirmed"]);

        let yaml2 = serialize_template_yaml(&def).unwrap();
        assert_eq!(parse_template_yaml(&yaml2).unwrap(), def);
    }

    #[test]
    fn test_parse_rejects_malformed_yaml() {
        assert!(matches!(
            parse_template_yaml("steps: [").unwrap_err(),
            TemplateError::ParseError(_)
        ));
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/feature.yaml");
        let def = template(vec![step("a", vec![])]);
        save_template_file(&path, &def).unwrap();
        assert_eq!(load_template_file(&path).unwrap(), def);
    }

    #[test]
    fn test_discover_templates_skips_invalid() {
        let dir = tempfile::tempdir().unwrap();
        save_template_file(&dir.path().join("one.yaml"), &template(vec![step("a", vec![])]))
            .unwrap();

        let mut second = template(vec![step("b", vec![])]);
        second.id = "second".to_string();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(
            dir.path().join("sub/two.json"),
            serde_json::to_string(&second).unwrap(),
        )
        .unwrap();

        std::fs::write(dir.path().join("cyclic.yml"), serialize_template_yaml(&template(vec![
            step("a", vec!["b"]),
            step("b", vec!["a"]),
        ])).unwrap())
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a template").unwrap();

        let found = discover_templates(dir.path()).unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_discover_nonexistent_dir() {
        let found = discover_templates(Path::new("/nonexistent/waymark/templates")).unwrap();
        assert!(found.is_empty());
    }
}
