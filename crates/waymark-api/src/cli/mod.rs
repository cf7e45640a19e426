//! CLI command definitions for the `waymark` binary.
//!
//! Uses clap derive macros. Every boundary operation has a subcommand; `serve`
//! exposes the same operations over HTTP.

pub mod orchestrate;
pub mod template;
pub mod workflow;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use serde::Serialize;

use crate::state::AppState;

/// Walk actors through validated workflow templates.
#[derive(Parser)]
#[command(name = "waymark", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Export spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Actor recorded as `createdBy` and passed to the authorizer.
    #[arg(long, global = true, env = "WAYMARK_ACTOR", default_value = "cli")]
    pub actor: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect and validate workflow templates.
    #[command(alias = "tpl")]
    Templates {
        #[command(subcommand)]
        action: template::TemplateCommand,
    },

    /// Start a new workflow instance.
    #[command(disable_version_flag = true)]
    Start {
        /// Template ID.
        template: String,

        /// Template version (highest registered when omitted).
        #[arg(long)]
        version: Option<String>,

        /// Initial data as a JSON object.
        #[arg(long)]
        data: Option<String>,

        /// Request ID of the caller that triggered this start.
        #[arg(long)]
        source_request_id: Option<String>,

        /// Workflow ID to use instead of a generated one.
        #[arg(long)]
        id: Option<String>,
    },

    /// Show the next eligible step of a workflow.
    Next {
        workflow_id: String,
    },

    /// Record progress on a step.
    Checkpoint {
        workflow_id: String,
        step_id: String,

        /// Checkpoint data as JSON.
        #[arg(long)]
        data: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Mark the step complete.
        #[arg(long)]
        complete: bool,

        #[arg(long)]
        source_request_id: Option<String>,

        /// Repeating a key returns the earlier checkpoint.
        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Complete a step with outputs.
    Complete {
        workflow_id: String,
        step_id: String,

        /// Step outputs as JSON.
        #[arg(long)]
        outputs: Option<String>,

        #[arg(long)]
        source_request_id: Option<String>,

        #[arg(long)]
        idempotency_key: Option<String>,
    },

    /// Pause, resume or fail a workflow.
    Action {
        workflow_id: String,

        /// pause | resume | fail
        action: String,

        /// Reason recorded with `fail`.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Show one workflow, or list workflows when no ID is given.
    Status {
        workflow_id: Option<String>,

        /// Filter the listing by status.
        #[arg(long)]
        status: Option<String>,

        /// Rebuild the view from the checkpoint log.
        #[arg(long)]
        replay: bool,
    },

    /// Show the checkpoint history of a workflow.
    History {
        workflow_id: String,

        /// Only the latest checkpoint of this step.
        #[arg(long)]
        step: Option<String>,
    },

    /// Synthesize a tool plan from free text and run it.
    Orchestrate {
        /// Free-text goal.
        intent: String,

        /// Context as JSON.
        #[arg(long)]
        context: Option<String>,

        /// Constraints as JSON.
        #[arg(long)]
        constraints: Option<String>,

        /// Print the plan without running it.
        #[arg(long)]
        dry_run: bool,
    },

    /// List registered tools.
    Tools,

    /// Start the REST API server.
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Generate shell completions.
    Completions {
        shell: Shell,
    },
}

/// Parse an optional JSON argument, defaulting to `null`.
pub fn parse_json_arg(raw: Option<&str>, name: &str) -> Result<serde_json::Value> {
    match raw {
        Some(raw) => serde_json::from_str(raw).with_context(|| format!("--{name} is not valid JSON")),
        None => Ok(serde_json::Value::Null),
    }
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Consult the authorizer and refuse the command on denial.
pub fn authorize(state: &AppState, actor: &str, paths: &[String]) -> Result<()> {
    let decision = state.authorize(actor, paths);
    if !decision.allow {
        bail!("Actor '{actor}' is not authorized: {}", decision.reasons.join("; "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_checkpoint_args() {
        let cli = Cli::try_parse_from([
            "waymark",
            "checkpoint",
            "wf-1",
            "build",
            "--complete",
            "--idempotency-key",
            "k1",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Checkpoint {
                workflow_id,
                step_id,
                complete,
                idempotency_key,
                ..
            } => {
                assert_eq!(workflow_id, "wf-1");
                assert_eq!(step_id, "build");
                assert!(complete);
                assert_eq!(idempotency_key.as_deref(), Some("k1"));
            }
            _ => panic!("expected checkpoint"),
        }
    }

    #[test]
    fn test_parse_json_arg() {
        assert_eq!(parse_json_arg(None, "data").unwrap(), serde_json::Value::Null);
        assert_eq!(
            parse_json_arg(Some(r#"{"a":1}"#), "data").unwrap(),
            serde_json::json!({"a": 1})
        );
        let err = parse_json_arg(Some("{nope"), "data").unwrap_err();
        assert!(err.to_string().contains("--data"));
    }
}
