//! Configuration loader for Waymark.
//!
//! Reads `config.toml` from the data directory (`~/.waymark/` by default) and
//! deserializes it into [`OrchestratorConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use waymark_types::config::OrchestratorConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "WAYMARK_DATA_DIR";

/// Resolve the data directory: `WAYMARK_DATA_DIR`, else `~/.waymark`.
pub fn resolve_data_dir() -> PathBuf {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir()
            .map(|home| home.join(".waymark"))
            .unwrap_or_else(|| PathBuf::from(".waymark")),
    }
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: defaults.
/// - Unreadable or unparseable file: warning, then defaults.
pub async fn load_config(data_dir: &Path) -> OrchestratorConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return OrchestratorConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return OrchestratorConfig::default();
        }
    };

    match toml::from_str::<OrchestratorConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            OrchestratorConfig::default()
        }
    }
}

/// Directory scanned for template files.
///
/// Relative `templates_dir` values are resolved against the data directory.
pub fn templates_dir(config: &OrchestratorConfig, data_dir: &Path) -> PathBuf {
    match &config.templates_dir {
        Some(dir) if dir.is_absolute() => dir.clone(),
        Some(dir) => data_dir.join(dir),
        None => data_dir.join("templates"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
max_reason_chars = 120
flags = ["ci-green"]
templates_dir = "flows"

[[tools]]
name = "get_architecture"
description = "Architecture summary"
command = "cat"
weight = 3
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config.max_reason_chars, 120);
        assert_eq!(config.flags, vec!["ci-green".to_string()]);
        assert_eq!(config.tools[0].weight, Some(3));
        assert_eq!(templates_dir(&config, tmp.path()), tmp.path().join("flows"));
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config, OrchestratorConfig::default());
    }

    #[test]
    fn resolve_data_dir_defaults_to_home() {
        if std::env::var_os(DATA_DIR_ENV).is_some() {
            return;
        }
        let expected = dirs::home_dir()
            .map(|home| home.join(".waymark"))
            .unwrap_or_else(|| PathBuf::from(".waymark"));
        assert_eq!(resolve_data_dir(), expected);
        assert!(resolve_data_dir().ends_with(".waymark"));
    }

    #[test]
    fn templates_dir_defaults_under_data_dir() {
        let config = OrchestratorConfig::default();
        assert_eq!(
            templates_dir(&config, Path::new("/data")),
            PathBuf::from("/data/templates")
        );

        let config = OrchestratorConfig {
            templates_dir: Some(PathBuf::from("/abs/flows")),
            ..Default::default()
        };
        assert_eq!(templates_dir(&config, Path::new("/data")), PathBuf::from("/abs/flows"));
    }
}
