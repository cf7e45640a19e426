//! Workflow instance subcommands: start, next, checkpoint, complete, action,
//! status and history.

use anyhow::{Result, anyhow};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tracing::Instrument;

use waymark_core::auth::paths;
use waymark_observe::attributes::{
    OP_ACTION, OP_CHECKPOINT, OP_COMPLETE_STEP, OP_HISTORY, OP_START, SPAN_OPERATION,
};
use waymark_types::checkpoint::{CheckpointReceipt, NewCheckpoint};
use waymark_types::instance::{
    InstanceStatus, LifecycleAction, NextStep, StartWorkflow, WorkflowInstance,
};

use crate::cli::{authorize, parse_json_arg, print_json};
use crate::state::AppState;

fn status_cell(status: InstanceStatus) -> Cell {
    let color = match status {
        InstanceStatus::Active => Color::Green,
        InstanceStatus::Paused => Color::Yellow,
        InstanceStatus::Failed => Color::Red,
        InstanceStatus::Completed => Color::Blue,
    };
    Cell::new(status).fg(color)
}

fn styled_status(status: InstanceStatus) -> String {
    let s = style(status.as_str());
    match status {
        InstanceStatus::Active => s.green(),
        InstanceStatus::Paused => s.yellow(),
        InstanceStatus::Failed => s.red(),
        InstanceStatus::Completed => s.blue(),
    }
    .to_string()
}

// ---------------------------------------------------------------------------
// Start
// ---------------------------------------------------------------------------

pub struct StartArgs {
    pub template: String,
    pub version: Option<String>,
    pub data: Option<String>,
    pub source_request_id: Option<String>,
    pub id: Option<String>,
}

pub async fn handle_start(state: &AppState, actor: &str, args: StartArgs, json: bool) -> Result<()> {
    authorize(state, actor, &paths::template(&args.template))?;
    let initial_data = parse_json_arg(args.data.as_deref(), "data")?;

    let inst = state
        .context
        .start(StartWorkflow {
            template_id: args.template,
            version: args.version,
            initial_data,
            created_by: actor.to_string(),
            source_request_id: args.source_request_id,
            workflow_id: args.id,
        })
        .instrument(tracing::info_span!(SPAN_OPERATION, op = OP_START, actor))
        .await?;

    if json {
        return print_json(&inst);
    }

    println!();
    println!(
        "  {} Started {}@{}",
        style("*").green().bold(),
        style(&inst.template_id).cyan(),
        inst.template_version
    );
    println!("  Workflow: {}", style(&inst.workflow_id).bold());
    println!(
        "  Next:     {}",
        style(format!("waymark next {}", inst.workflow_id)).dim()
    );
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Next
// ---------------------------------------------------------------------------

pub async fn handle_next(state: &AppState, workflow_id: &str, json: bool) -> Result<()> {
    let next = state.context.next_step(workflow_id).await?;

    if json {
        return print_json(&next);
    }

    print_next(&next);
    Ok(())
}

fn print_next(next: &NextStep) {
    println!();
    println!(
        "  Workflow {} [{}] {}/{} steps complete",
        style(&next.workflow_id).bold(),
        styled_status(next.status),
        next.completed_count,
        next.total_steps
    );

    if next.is_complete {
        println!("  {} All steps complete.", style("✓").green());
        println!();
        return;
    }

    match &next.step {
        Some(step) => {
            println!();
            println!("  {} {}", style(&step.id).cyan().bold(), step.title);
            if let Some(desc) = &step.description {
                println!("  {}", style(desc).dim());
            }
            for (i, action) in step.actions.iter().enumerate() {
                println!("    {}. {action}", i + 1);
            }
        }
        None => {
            println!("  {} No step is eligible right now.", style("-").yellow());
        }
    }

    for blocked in &next.blocked {
        println!(
            "  {} {} waits on flags: {}",
            style("!").yellow(),
            style(&blocked.step_id).cyan(),
            blocked.missing_flags.join(", ")
        );
    }
    println!();
}

// ---------------------------------------------------------------------------
// Checkpoint / complete
// ---------------------------------------------------------------------------

pub async fn handle_checkpoint(
    state: &AppState,
    actor: &str,
    new: NewCheckpoint,
    json: bool,
) -> Result<()> {
    authorize(state, actor, &paths::step(&new.workflow_id, &new.step_id))?;
    let op = if new.complete_step { OP_COMPLETE_STEP } else { OP_CHECKPOINT };
    let span = tracing::info_span!(
        SPAN_OPERATION,
        op,
        actor,
        workflow_id = %new.workflow_id,
        step_id = %new.step_id
    );

    let receipt = state.context.checkpoint(new).instrument(span).await?;

    if json {
        return print_json(&receipt);
    }
    print_receipt(&receipt);
    Ok(())
}

fn print_receipt(receipt: &CheckpointReceipt) {
    let cp = &receipt.checkpoint;
    println!();
    if receipt.replayed {
        println!(
            "  {} Replayed checkpoint {} for step '{}'",
            style("=").yellow(),
            cp.id,
            style(&cp.step_id).cyan()
        );
    } else {
        println!(
            "  {} Recorded checkpoint {} for step '{}'",
            style("*").green().bold(),
            cp.id,
            style(&cp.step_id).cyan()
        );
    }
    if receipt.step_completed {
        println!("  Step completed.");
    }
    println!("  Workflow status: {}", styled_status(receipt.instance_status));
    println!();
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

pub async fn handle_action(
    state: &AppState,
    actor: &str,
    workflow_id: &str,
    action: &str,
    reason: Option<&str>,
    json: bool,
) -> Result<()> {
    let action: LifecycleAction = action.parse().map_err(|e: String| anyhow!(e))?;
    authorize(state, actor, &paths::workflow(workflow_id))?;

    let result = state
        .context
        .apply_action(workflow_id, action, reason)
        .instrument(tracing::info_span!(SPAN_OPERATION, op = OP_ACTION, actor, workflow_id))
        .await?;

    if json {
        return print_json(&result);
    }

    println!();
    if result.idempotent {
        println!(
            "  {} Workflow {} is already {}",
            style("=").yellow(),
            style(&result.workflow_id).bold(),
            styled_status(result.status)
        );
    } else {
        println!(
            "  {} Workflow {}: {} -> {}",
            style("*").green().bold(),
            style(&result.workflow_id).bold(),
            styled_status(result.previous_status),
            styled_status(result.status)
        );
    }
    if let Some(reason) = &result.reason {
        println!("  Reason: {reason}");
    }
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

pub async fn handle_status(
    state: &AppState,
    workflow_id: Option<&str>,
    status: Option<&str>,
    replay: bool,
    json: bool,
) -> Result<()> {
    let Some(workflow_id) = workflow_id else {
        let status = status
            .map(|s| s.parse::<InstanceStatus>().map_err(|e| anyhow!(e)))
            .transpose()?;
        let instances = state.context.list_instances(status).await?;
        return print_instances(state, &instances, json);
    };

    let inst = if replay {
        state.context.replay_state(workflow_id).await?
    } else {
        state.context.get_state(workflow_id).await?
    };

    if json {
        return print_json(&inst);
    }

    let template = state
        .context
        .get_template(&inst.template_id, Some(&inst.template_version))
        .ok();

    println!();
    println!(
        "  Workflow {} [{}]",
        style(&inst.workflow_id).bold(),
        styled_status(inst.status)
    );
    println!("  Template:   {}@{}", inst.template_id, inst.template_version);
    println!("  Created by: {}", inst.created_by);
    println!("  Created:    {}", inst.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(reason) = &inst.failure_reason {
        println!("  Failure:    {}", style(reason).red());
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Complete"),
            Cell::new("Completed at"),
        ]);

    let step_ids: Vec<String> = match &template {
        Some(t) => t.steps.iter().map(|s| s.id.clone()).collect(),
        None => inst.completed_steps.keys().cloned().collect(),
    };
    for step_id in &step_ids {
        let completion = inst.completed_steps.get(step_id);
        table.add_row(vec![
            Cell::new(step_id),
            match completion {
                Some(_) => Cell::new("yes").fg(Color::Green),
                None => Cell::new("no"),
            },
            Cell::new(
                completion
                    .map(|c| c.completed_at.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

fn print_instances(state: &AppState, instances: &[WorkflowInstance], json: bool) -> Result<()> {
    if json {
        return print_json(&instances);
    }

    if instances.is_empty() {
        println!();
        println!("  No workflows.");
        println!("  Start one with: {}", style("waymark start <template>").dim());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Workflow").fg(Color::Cyan),
            Cell::new("Template"),
            Cell::new("Status"),
            Cell::new("Progress"),
            Cell::new("Created by"),
            Cell::new("Updated"),
        ]);

    for inst in instances {
        let total = state
            .context
            .get_template(&inst.template_id, Some(&inst.template_version))
            .map(|t| t.steps.len().to_string())
            .unwrap_or_else(|_| "?".to_string());
        table.add_row(vec![
            Cell::new(&inst.workflow_id),
            Cell::new(format!("{}@{}", inst.template_id, inst.template_version)),
            status_cell(inst.status),
            Cell::new(format!("{}/{total}", inst.completed_steps.len())),
            Cell::new(&inst.created_by),
            Cell::new(inst.updated_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// History
// ---------------------------------------------------------------------------

pub async fn handle_history(
    state: &AppState,
    workflow_id: &str,
    step: Option<&str>,
    json: bool,
) -> Result<()> {
    let span = tracing::debug_span!(SPAN_OPERATION, op = OP_HISTORY, workflow_id);
    let checkpoints = async {
        match step {
            Some(step_id) => {
                let latest = state.context.latest_checkpoint(workflow_id, step_id).await?;
                Ok::<_, anyhow::Error>(latest.into_iter().collect::<Vec<_>>())
            }
            None => Ok(state.context.list_checkpoints(workflow_id).await?),
        }
    }
    .instrument(span)
    .await?;

    if json {
        return print_json(&checkpoints);
    }

    if checkpoints.is_empty() {
        println!();
        println!("  No checkpoints for workflow '{workflow_id}'.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Seq"),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Complete"),
            Cell::new("Key"),
            Cell::new("Notes"),
            Cell::new("Recorded"),
        ]);

    for cp in &checkpoints {
        table.add_row(vec![
            Cell::new(cp.sequence),
            Cell::new(&cp.step_id),
            Cell::new(if cp.complete_step { "yes" } else { "" }),
            Cell::new(cp.idempotency_key.as_deref().unwrap_or("")),
            Cell::new(cp.notes.as_deref().unwrap_or("")),
            Cell::new(cp.created_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
