//! Waymark CLI and REST API entry point.
//!
//! Binary name: `waymark`
//!
//! Parses CLI arguments, initializes the store, config, tools and templates,
//! then dispatches to a command handler or starts the REST API server.

mod cli;
mod http;
mod state;

use clap::Parser;
use clap_complete::generate;

use waymark_observe::tracing_setup::{LogFormat, init_tracing, shutdown_tracing};
use waymark_types::checkpoint::NewCheckpoint;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,waymark=debug",
        _ => "trace",
    };
    let format = if cli.log_json { LogFormat::Json } else { LogFormat::Pretty };
    init_tracing(format, filter, cli.otel).map_err(|e| anyhow::anyhow!("{e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "waymark", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init().await?;
    let actor = cli.actor.as_str();

    match cli.command {
        Commands::Templates { action } => {
            cli::template::handle_template_command(action, &state, cli.json)?;
        }

        Commands::Start {
            template,
            version,
            data,
            source_request_id,
            id,
        } => {
            let args = cli::workflow::StartArgs {
                template,
                version,
                data,
                source_request_id,
                id,
            };
            cli::workflow::handle_start(&state, actor, args, cli.json).await?;
        }

        Commands::Next { workflow_id } => {
            cli::workflow::handle_next(&state, &workflow_id, cli.json).await?;
        }

        Commands::Checkpoint {
            workflow_id,
            step_id,
            data,
            notes,
            complete,
            source_request_id,
            idempotency_key,
        } => {
            let new = NewCheckpoint {
                workflow_id,
                step_id,
                data: cli::parse_json_arg(data.as_deref(), "data")?,
                notes,
                complete_step: complete,
                source_request_id,
                idempotency_key,
            };
            cli::workflow::handle_checkpoint(&state, actor, new, cli.json).await?;
        }

        Commands::Complete {
            workflow_id,
            step_id,
            outputs,
            source_request_id,
            idempotency_key,
        } => {
            let new = NewCheckpoint {
                workflow_id,
                step_id,
                data: cli::parse_json_arg(outputs.as_deref(), "outputs")?,
                notes: None,
                complete_step: true,
                source_request_id,
                idempotency_key,
            };
            cli::workflow::handle_checkpoint(&state, actor, new, cli.json).await?;
        }

        Commands::Action {
            workflow_id,
            action,
            reason,
        } => {
            cli::workflow::handle_action(
                &state,
                actor,
                &workflow_id,
                &action,
                reason.as_deref(),
                cli.json,
            )
            .await?;
        }

        Commands::Status {
            workflow_id,
            status,
            replay,
        } => {
            cli::workflow::handle_status(
                &state,
                workflow_id.as_deref(),
                status.as_deref(),
                replay,
                cli.json,
            )
            .await?;
        }

        Commands::History { workflow_id, step } => {
            cli::workflow::handle_history(&state, &workflow_id, step.as_deref(), cli.json).await?;
        }

        Commands::Orchestrate {
            intent,
            context,
            constraints,
            dry_run,
        } => {
            let args = cli::orchestrate::OrchestrateArgs {
                intent,
                context,
                constraints,
                dry_run,
            };
            cli::orchestrate::handle_orchestrate(&state, actor, args, cli.json).await?;
        }

        Commands::Tools => {
            cli::orchestrate::handle_tools(&state, cli.json)?;
        }

        Commands::Serve { port, host } => {
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Waymark API listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}/api/v1")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            println!("\n  Server stopped.");
        }

        Commands::Completions { .. } => {}
    }

    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
