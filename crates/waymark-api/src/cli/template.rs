//! `waymark templates` subcommands.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use waymark_core::template::dag::{DagNode, execution_waves};
use waymark_core::template::definition::{TemplateError, load_template_file};

use crate::cli::print_json;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum TemplateCommand {
    /// List registered templates.
    #[command(alias = "ls")]
    List {
        #[arg(long)]
        category: Option<String>,
    },

    /// Show a template's steps.
    #[command(disable_version_flag = true)]
    Show {
        id: String,

        #[arg(long)]
        version: Option<String>,
    },

    /// Validate a template file without registering it.
    Validate {
        file: PathBuf,
    },
}

pub fn handle_template_command(cmd: TemplateCommand, state: &AppState, json: bool) -> Result<()> {
    match cmd {
        TemplateCommand::List { category } => handle_list(state, category.as_deref(), json),
        TemplateCommand::Show { id, version } => handle_show(state, &id, version.as_deref(), json),
        TemplateCommand::Validate { file } => handle_validate(&file, json),
    }
}

fn handle_list(state: &AppState, category: Option<&str>, json: bool) -> Result<()> {
    let templates = state.context.list_templates(category);

    if json {
        return print_json(&templates);
    }

    if templates.is_empty() {
        println!();
        println!("  No templates registered.");
        println!(
            "  Add YAML or JSON files under {}",
            style(state.data_dir.join("templates").display()).dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Version"),
            Cell::new("Title"),
            Cell::new("Category"),
            Cell::new("Steps"),
        ]);

    for t in &templates {
        table.add_row(vec![
            Cell::new(&t.id),
            Cell::new(&t.version),
            Cell::new(&t.title),
            Cell::new(t.category.as_deref().unwrap_or("-")),
            Cell::new(t.step_count),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn handle_show(state: &AppState, id: &str, version: Option<&str>, json: bool) -> Result<()> {
    let def = state.context.get_template(id, version)?;

    if json {
        return print_json(def.as_ref());
    }

    println!();
    println!(
        "  {} {}",
        style(&def.title).bold(),
        style(format!("({}@{})", def.id, def.version)).dim()
    );
    if !def.description.is_empty() {
        println!("  {}", def.description);
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Title"),
            Cell::new("Depends on"),
            Cell::new("Required flags"),
        ]);

    for (i, step) in def.steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&step.id),
            Cell::new(&step.title),
            Cell::new(step.depends_on.join(", ")),
            Cell::new(step.validation.required_flags.join(", ")),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}

fn handle_validate(file: &Path, json: bool) -> Result<()> {
    let result = load_template_file(file);

    if json {
        let out = match &result {
            Ok(def) => serde_json::json!({
                "valid": true,
                "id": def.id,
                "version": def.version,
                "steps": def.steps.len(),
            }),
            Err(e) => serde_json::json!({ "valid": false, "error": e.to_string() }),
        };
        print_json(&out)?;
    }

    let def = match result {
        Ok(def) => def,
        Err(e @ TemplateError::IoError(_)) => return Err(e.into()),
        Err(e) => {
            if !json {
                println!();
                println!("  {} {}", style("✗").red(), e);
                println!();
            }
            anyhow::bail!("template is invalid");
        }
    };

    if !json {
        let waves = execution_waves(&def.steps).map_err(TemplateError::from)?;
        println!();
        println!(
            "  {} {}@{} is valid ({} steps, {} waves)",
            style("✓").green(),
            style(&def.id).cyan(),
            def.version,
            def.steps.len(),
            waves.len()
        );
        for (i, wave) in waves.iter().enumerate() {
            let ids: Vec<&str> = wave.iter().map(|step| step.node_id()).collect();
            println!("    {} {}", style(format!("wave {}:", i + 1)).dim(), ids.join(", "));
        }
        println!();
    }
    Ok(())
}
