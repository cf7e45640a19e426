//! Application state wiring the orchestrator to its infra adapters.
//!
//! `OrchestratorContext` is generic over its store; `AppState` pins it to the
//! SQLite implementation and is shared by the CLI and the REST API.

use std::path::PathBuf;
use std::sync::Arc;

use waymark_core::auth::{ActorAllowList, AllowAll, AuthDecision, Authorizer};
use waymark_core::context::OrchestratorContext;
use waymark_core::template::definition::discover_templates;
use waymark_infra::config::{load_config, resolve_data_dir, templates_dir};
use waymark_infra::flags::ContextFlagEvaluator;
use waymark_infra::sqlite::pool::{DatabasePool, database_url};
use waymark_infra::sqlite::store::SqliteWorkflowStore;
use waymark_infra::tools::command::registry_from_config;

pub type ConcreteContext = OrchestratorContext<SqliteWorkflowStore>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<ConcreteContext>,
    pub authorizer: Arc<dyn Authorizer>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize against the resolved data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::init_at(resolve_data_dir()).await
    }

    /// Open the database, load config and tools, and register every template
    /// found in the templates directory.
    pub async fn init_at(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_config(&data_dir).await;
        let pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let store = SqliteWorkflowStore::new(pool);

        let tools = registry_from_config(&config.tools);
        let flags = ContextFlagEvaluator::new(config.flags.clone());
        let authorizer: Arc<dyn Authorizer> = if config.allowed_actors.is_empty() {
            Arc::new(AllowAll)
        } else {
            Arc::new(ActorAllowList::new(config.allowed_actors.clone()))
        };
        let template_dir = templates_dir(&config, &data_dir);

        let context = OrchestratorContext::new(Arc::new(store), config)
            .with_flags(Arc::new(flags))
            .with_tools(tools);

        for (path, def) in discover_templates(&template_dir)? {
            let key = def.key();
            match context.register_template(def) {
                Ok(_) => tracing::debug!(template = %key, path = %path.display(), "template registered"),
                Err(e) => tracing::warn!(path = %path.display(), "skipping template: {e}"),
            }
        }

        let active = context.load_active_count().await?;
        tracing::debug!(active, templates = context.list_templates(None).len(), "state initialized");

        Ok(Self {
            context: Arc::new(context),
            authorizer,
            data_dir,
        })
    }

    #[cfg(test)]
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Ask the authorizer; denials are logged.
    pub fn authorize(&self, actor: &str, affected_paths: &[String]) -> AuthDecision {
        let decision = self.authorizer.allow(actor, affected_paths);
        if !decision.allow {
            tracing::warn!(actor, paths = ?affected_paths, reasons = ?decision.reasons, "authorization denied");
        }
        decision
    }
}
