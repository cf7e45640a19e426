//! `waymark orchestrate` and `waymark tools`.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tracing::Instrument;

use waymark_core::auth::paths;
use waymark_observe::attributes::{OP_ORCHESTRATE, OP_SYNTHESIZE, SPAN_OPERATION};
use waymark_types::plan::{
    ExecutionResult, ExecutionStatus, OrchestrationPlan, OrchestrationRequest,
};

use crate::cli::{authorize, parse_json_arg, print_json};
use crate::state::AppState;

pub struct OrchestrateArgs {
    pub intent: String,
    pub context: Option<String>,
    pub constraints: Option<String>,
    pub dry_run: bool,
}

fn optional_json(raw: Option<&str>, name: &str) -> Result<Option<serde_json::Value>> {
    Ok(match parse_json_arg(raw, name)? {
        serde_json::Value::Null => None,
        value => Some(value),
    })
}

pub async fn handle_orchestrate(
    state: &AppState,
    actor: &str,
    args: OrchestrateArgs,
    json: bool,
) -> Result<()> {
    authorize(state, actor, &paths::orchestrate())?;

    let request = OrchestrationRequest {
        intent: args.intent,
        context: optional_json(args.context.as_deref(), "context")?,
        constraints: optional_json(args.constraints.as_deref(), "constraints")?,
        actor: Some(actor.to_string()),
    };

    if args.dry_run {
        let _span = tracing::info_span!(SPAN_OPERATION, op = OP_SYNTHESIZE, actor).entered();
        let plan = state.context.synthesize(&request)?;
        if json {
            return print_json(&serde_json::json!({ "plan": plan }));
        }
        print_plan(&plan);
        return Ok(());
    }

    let outcome = state
        .context
        .orchestrate(&request)
        .instrument(tracing::info_span!(SPAN_OPERATION, op = OP_ORCHESTRATE, actor))
        .await?;

    if json {
        print_json(&outcome)?;
    } else {
        print_plan(&outcome.plan);
        print_execution(&outcome.execution);
    }

    if outcome.execution.status == ExecutionStatus::Failed {
        anyhow::bail!("plan execution failed");
    }
    Ok(())
}

fn print_plan(plan: &OrchestrationPlan) {
    println!();
    println!("  {} {}", style("Plan").bold(), style(plan.id).dim());
    println!("  Intent: {}", plan.intent);
    println!(
        "  Complexity: {} (score {}, {})",
        style(plan.complexity.level).cyan(),
        plan.complexity.score,
        plan.complexity.estimated_duration
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Tool"),
            Cell::new("Depends on"),
            Cell::new("Description"),
        ]);
    for step in &plan.steps {
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(&step.tool),
            Cell::new(step.depends_on.join(", ")),
            Cell::new(&step.description),
        ]);
    }
    println!("{table}");
}

fn print_execution(execution: &ExecutionResult) {
    println!();
    for result in &execution.results {
        println!(
            "  {} {} {}",
            style("✓").green(),
            style(&result.step_id).cyan(),
            style(format!("({} ms)", result.duration_ms)).dim()
        );
    }
    if let Some(failure) = &execution.failure {
        println!(
            "  {} {} failed at position {}: {}",
            style("✗").red(),
            style(&failure.step_id).cyan(),
            failure.position,
            failure.message
        );
    }
    println!();
}

pub fn handle_tools(state: &AppState, json: bool) -> Result<()> {
    let tools = state.context.tool_descriptors();

    if json {
        return print_json(&tools);
    }

    if tools.is_empty() {
        println!();
        println!("  No tools registered.");
        println!(
            "  Declare command tools under [[tools]] in {}",
            style(state.data_dir.join("config.toml").display()).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Tool").fg(Color::Cyan),
            Cell::new("Weight"),
            Cell::new("Description"),
        ]);
    for tool in &tools {
        table.add_row(vec![
            Cell::new(&tool.name),
            Cell::new(tool.weight.map(|w| w.to_string()).unwrap_or_else(|| "-".to_string())),
            Cell::new(&tool.description),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
