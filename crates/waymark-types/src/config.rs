//! Configuration types for Waymark.
//!
//! `OrchestratorConfig` represents the top-level `config.toml` that controls
//! lifecycle bounds, complexity scoring, globally-held flags and the
//! command-backed tool catalogue.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestrator.
///
/// Loaded from `~/.waymark/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Maximum characters kept from a `fail` reason.
    #[serde(default = "default_max_reason_chars")]
    pub max_reason_chars: usize,

    #[serde(default)]
    pub complexity: ComplexityThresholds,

    /// Per-tool weight overrides used by complexity scoring.
    #[serde(default)]
    pub tool_weights: HashMap<String, u32>,

    /// Flags that hold for every instance.
    #[serde(default)]
    pub flags: Vec<String>,

    /// Directory scanned for template files (defaults to `{data_dir}/templates`).
    #[serde(default)]
    pub templates_dir: Option<PathBuf>,

    /// Command-backed tools available to the ad-hoc executor.
    #[serde(default)]
    pub tools: Vec<CommandToolConfig>,

    /// Actors allowed to mutate state. Empty allows everyone.
    #[serde(default)]
    pub allowed_actors: Vec<String>,
}

fn default_max_reason_chars() -> usize {
    500
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_reason_chars: default_max_reason_chars(),
            complexity: ComplexityThresholds::default(),
            tool_weights: HashMap::new(),
            flags: Vec::new(),
            templates_dir: None,
            tools: Vec::new(),
            allowed_actors: Vec::new(),
        }
    }
}

/// Upper bounds (inclusive) of the `low` and `medium` complexity buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityThresholds {
    #[serde(default = "default_low_max")]
    pub low_max: u32,
    #[serde(default = "default_medium_max")]
    pub medium_max: u32,
}

fn default_low_max() -> u32 {
    4
}

fn default_medium_max() -> u32 {
    8
}

impl Default for ComplexityThresholds {
    fn default() -> Self {
        Self {
            low_max: default_low_max(),
            medium_max: default_medium_max(),
        }
    }
}

/// A tool implemented by an external command.
///
/// The command receives the step params as JSON on stdin and must print a
/// JSON result on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandToolConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_reason_chars, 500);
        assert_eq!(config.complexity.low_max, 4);
        assert_eq!(config.complexity.medium_max, 8);
        assert!(config.tools.is_empty());
        assert!(config.allowed_actors.is_empty());
    }

    #[test]
    fn test_toml_partial_config() {
        let toml_str = r#"
max_reason_chars = 200
flags = ["tests-green"]

[complexity]
low_max = 3

[tool_weights]
get_architecture = 5

[[tools]]
name = "get_architecture"
command = "./tools/arch.sh"
"#;
        let config: OrchestratorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.max_reason_chars, 200);
        assert_eq!(config.complexity.low_max, 3);
        assert_eq!(config.complexity.medium_max, 8);
        assert_eq!(config.tool_weights.get("get_architecture"), Some(&5));
        assert_eq!(config.flags, vec!["tests-green".to_string()]);
        assert_eq!(config.tools[0].timeout_secs, 60);
        assert!(config.tools[0].args.is_empty());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(config, OrchestratorConfig::default());
    }
}
