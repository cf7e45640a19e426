//! Command-backed tools.
//!
//! A tool declared in `config.toml` runs an external command. Step params are
//! written to stdin as JSON; stdout must hold one JSON value, which becomes the
//! step output. Non-zero exit, invalid output or a timeout fail the step.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, bail};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use waymark_core::orchestrate::error::ToolError;
use waymark_core::orchestrate::tool::{Tool, ToolRegistry};
use waymark_types::config::CommandToolConfig;

#[derive(Debug, Clone)]
pub struct CommandTool {
    config: CommandToolConfig,
}

impl CommandTool {
    pub fn new(config: CommandToolConfig) -> Self {
        Self { config }
    }

    /// Run the command and return its stdout.
    async fn run(&self, params: &Value) -> anyhow::Result<String> {
        let input = serde_json::to_vec(params).context("failed to encode params")?;

        let mut child = tokio::process::Command::new(&self.config.command)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn '{}'", self.config.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(error) = stdin.write_all(&input).await {
                tracing::debug!(tool = %self.config.name, %error, "failed to write params to tool stdin");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .context("failed to wait for tool process")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "'{}' exited with status {}: {}",
                self.config.command,
                output.status,
                stderr.trim()
            );
        }

        String::from_utf8(output.stdout).context("tool output is not valid UTF-8")
    }
}

impl Tool for CommandTool {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn description(&self) -> &str {
        &self.config.description
    }

    fn weight(&self) -> Option<u32> {
        self.config.weight
    }

    async fn invoke(&self, params: &Value) -> Result<Value, ToolError> {
        let secs = self.config.timeout_secs;
        match tokio::time::timeout(Duration::from_secs(secs), self.run(params)).await {
            Err(_) => Err(ToolError::Timeout(secs)),
            Ok(Err(err)) => Err(ToolError::Execution(format!("{err:#}"))),
            Ok(Ok(stdout)) if stdout.trim().is_empty() => Ok(Value::Null),
            Ok(Ok(stdout)) => serde_json::from_str(stdout.trim())
                .map_err(|e| ToolError::InvalidOutput(format!("{}: {e}", self.config.name))),
        }
    }
}

/// Build a registry holding one `CommandTool` per declaration.
pub fn registry_from_config(tools: &[CommandToolConfig]) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for tool in tools {
        tracing::debug!(tool = %tool.name, command = %tool.command, "registering command tool");
        registry.register(CommandTool::new(tool.clone()));
    }
    registry
}
