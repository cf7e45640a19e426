//! `OrchestratorContext` -- the single handle every boundary operation uses.
//!
//! Holds the template registry, the workflow store, the flag evaluator and the
//! tool registry. Constructed once at startup and shared behind an `Arc`.
//! Writes to one workflow are serialized with a per-instance async mutex.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::Mutex;
use waymark_types::checkpoint::{Checkpoint, CheckpointReceipt, NewCheckpoint};
use waymark_types::config::OrchestratorConfig;
use waymark_types::instance::{
    ActionResult, InstanceStatus, LifecycleAction, NextStep, StartWorkflow, WorkflowInstance,
};
use waymark_types::plan::{
    ExecutionResult, OrchestrationOutcome, OrchestrationPlan, OrchestrationRequest, ToolDescriptor,
};
use waymark_types::template::{compare_versions, TemplateDefinition, TemplateKey, TemplateSummary};

use crate::flags::{FlagEvaluator, NoFlags};
use crate::orchestrate::complexity::ToolWeights;
use crate::orchestrate::tool::ToolRegistry;
use crate::orchestrate::{executor, synthesizer};
use crate::repository::WorkflowStore;
use crate::template::definition::validate_template;
use crate::workflow::checkpoint::CheckpointManager;
use crate::workflow::error::OrchestratorError;
use crate::workflow::{instance, lifecycle, resolver};

pub struct OrchestratorContext<S: WorkflowStore> {
    store: Arc<S>,
    checkpoints: CheckpointManager<S>,
    templates: DashMap<TemplateKey, Arc<TemplateDefinition>>,
    flags: Arc<dyn FlagEvaluator>,
    tools: ToolRegistry,
    weights: ToolWeights,
    config: OrchestratorConfig,
    active: AtomicI64,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: WorkflowStore> OrchestratorContext<S> {
    pub fn new(store: Arc<S>, config: OrchestratorConfig) -> Self {
        Self {
            checkpoints: CheckpointManager::new(store.clone()),
            store,
            templates: DashMap::new(),
            flags: Arc::new(NoFlags),
            tools: ToolRegistry::new(),
            weights: ToolWeights::new(config.tool_weights.clone()),
            config,
            active: AtomicI64::new(0),
            locks: DashMap::new(),
        }
    }

    pub fn with_flags(mut self, flags: Arc<dyn FlagEvaluator>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.weights = ToolWeights::new(self.config.tool_weights.clone())
            .with_descriptors(&tools.descriptors());
        self.tools = tools;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Seed the active-instance gauge from the store.
    pub async fn load_active_count(&self) -> Result<i64, OrchestratorError> {
        let active = self.list_instances(Some(InstanceStatus::Active)).await?.len();
        let active = i64::try_from(active).unwrap_or(i64::MAX);
        self.active.store(active, Ordering::SeqCst);
        Ok(active)
    }

    /// Number of instances currently `active`.
    pub fn active_count(&self) -> i64 {
        self.active.load(Ordering::SeqCst)
    }

    fn adjust_active(&self, from: InstanceStatus, to: InstanceStatus) {
        let delta = lifecycle::active_delta(from, to);
        if delta != 0 {
            self.active.fetch_add(delta, Ordering::SeqCst);
        }
    }

    fn instance_lock(&self, workflow_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(workflow_id.to_string())
            .or_default()
            .clone()
    }

    // -----------------------------------------------------------------------
    // Templates
    // -----------------------------------------------------------------------

    /// Validate and register a template. An existing `id@version` is rejected.
    pub fn register_template(&self, def: TemplateDefinition) -> Result<TemplateKey, OrchestratorError> {
        validate_template(&def)?;
        let key = def.key();
        match self.templates.entry(key.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(OrchestratorError::TemplateExists(key.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(def));
                tracing::debug!(template = %key, "template registered");
                Ok(key)
            }
        }
    }

    /// Registered templates, optionally filtered by category, sorted by id then version.
    pub fn list_templates(&self, category: Option<&str>) -> Vec<TemplateSummary> {
        let mut summaries: Vec<TemplateSummary> = self
            .templates
            .iter()
            .filter(|entry| category.is_none_or(|c| entry.value().category.as_deref() == Some(c)))
            .map(|entry| TemplateSummary::from(entry.value().as_ref()))
            .collect();
        summaries.sort_by(|a, b| a.id.cmp(&b.id).then_with(|| compare_versions(&a.version, &b.version)));
        summaries
    }

    /// Look up a template; without a version the highest one wins.
    pub fn get_template(
        &self,
        template_id: &str,
        version: Option<&str>,
    ) -> Result<Arc<TemplateDefinition>, OrchestratorError> {
        let found = match version {
            Some(v) => self
                .templates
                .get(&TemplateKey::new(template_id, v))
                .map(|entry| entry.value().clone()),
            None => self
                .templates
                .iter()
                .filter(|entry| entry.key().id == template_id)
                .max_by(|a, b| compare_versions(&a.key().version, &b.key().version))
                .map(|entry| entry.value().clone()),
        };
        found.ok_or_else(|| {
            OrchestratorError::TemplateNotFound(match version {
                Some(v) => format!("{template_id}@{v}"),
                None => template_id.to_string(),
            })
        })
    }

    fn template_for(&self, inst: &WorkflowInstance) -> Result<Arc<TemplateDefinition>, OrchestratorError> {
        self.get_template(&inst.template_id, Some(&inst.template_version))
    }

    // -----------------------------------------------------------------------
    // Instances
    // -----------------------------------------------------------------------

    /// Start a new `active` instance of a registered template.
    pub async fn start(&self, request: StartWorkflow) -> Result<WorkflowInstance, OrchestratorError> {
        let template = self.get_template(&request.template_id, request.version.as_deref())?;
        let inst = instance::new_instance(&template, &request);

        self.store.create_instance(&inst).await?;
        self.active.fetch_add(1, Ordering::SeqCst);

        tracing::info!(
            workflow_id = %inst.workflow_id,
            template = %template.key(),
            created_by = %inst.created_by,
            "workflow started"
        );
        Ok(inst)
    }

    async fn load_instance(&self, workflow_id: &str) -> Result<WorkflowInstance, OrchestratorError> {
        self.store
            .get_instance(workflow_id)
            .await?
            .ok_or_else(|| OrchestratorError::InstanceNotFound(workflow_id.to_string()))
    }

    /// True when every step has a completion record but the stored status
    /// has not caught up.
    fn completion_pending(&self, inst: &WorkflowInstance) -> bool {
        inst.status != InstanceStatus::Completed
            && self
                .template_for(inst)
                .is_ok_and(|t| instance::derive_status(&t, inst) == InstanceStatus::Completed)
    }

    /// Persist `completed`. Caller holds the instance lock.
    async fn mark_completed(&self, inst: &mut WorkflowInstance) -> Result<(), OrchestratorError> {
        self.store
            .update_status(&inst.workflow_id, InstanceStatus::Completed, None)
            .await?;
        self.adjust_active(inst.status, InstanceStatus::Completed);
        tracing::info!(workflow_id = %inst.workflow_id, from = %inst.status, "workflow completed");
        inst.status = InstanceStatus::Completed;
        Ok(())
    }

    /// Load an instance with its status derived from the completion records.
    /// Caller holds the instance lock.
    async fn load_locked(&self, workflow_id: &str) -> Result<WorkflowInstance, OrchestratorError> {
        let mut inst = self.load_instance(workflow_id).await?;
        if self.completion_pending(&inst) {
            self.mark_completed(&mut inst).await?;
        }
        Ok(inst)
    }

    /// Current view of an instance, completions included.
    ///
    /// An instance whose every step is complete reads as `completed`, and the
    /// stored status is brought in line if an earlier write was lost.
    pub async fn get_state(&self, workflow_id: &str) -> Result<WorkflowInstance, OrchestratorError> {
        let inst = self.load_instance(workflow_id).await?;
        if !self.completion_pending(&inst) {
            return Ok(inst);
        }
        let lock = self.instance_lock(workflow_id);
        let _guard = lock.lock().await;
        self.load_locked(workflow_id).await
    }

    pub async fn list_instances(
        &self,
        status: Option<InstanceStatus>,
    ) -> Result<Vec<WorkflowInstance>, OrchestratorError> {
        let mut instances = Vec::new();
        for inst in self.store.list_instances(status).await? {
            let inst = if self.completion_pending(&inst) {
                self.get_state(&inst.workflow_id).await?
            } else {
                inst
            };
            if status.is_none_or(|s| inst.status == s) {
                instances.push(inst);
            }
        }
        Ok(instances)
    }

    /// Next eligible step for an instance.
    pub async fn next_step(&self, workflow_id: &str) -> Result<NextStep, OrchestratorError> {
        let inst = self.get_state(workflow_id).await?;
        let template = self.template_for(&inst)?;
        Ok(resolver::resolve_next(&template, &inst, self.flags.as_ref()))
    }

    /// Record progress for one step, optionally completing it.
    ///
    /// A repeated idempotency key returns the earlier checkpoint whatever the
    /// instance status. Otherwise the instance must be `active`. When the last
    /// step completes the instance becomes `completed`.
    pub async fn checkpoint(&self, new: NewCheckpoint) -> Result<CheckpointReceipt, OrchestratorError> {
        let lock = self.instance_lock(&new.workflow_id);
        let _guard = lock.lock().await;

        let mut inst = self.load_locked(&new.workflow_id).await?;
        let template = self.template_for(&inst)?;
        instance::require_step(&template, &inst.workflow_id, &new.step_id)?;

        if let Some(prior) = self
            .checkpoints
            .find_replay(&new.workflow_id, &new.step_id, new.idempotency_key.as_deref())
            .await?
        {
            tracing::debug!(
                workflow_id = %new.workflow_id,
                step_id = %new.step_id,
                checkpoint_id = %prior.id,
                "idempotent checkpoint replay"
            );
            return Ok(CheckpointReceipt {
                checkpoint: prior,
                replayed: true,
                step_completed: false,
                instance_status: inst.status,
            });
        }

        if inst.status != InstanceStatus::Active {
            return Err(OrchestratorError::InstanceNotActive {
                workflow_id: inst.workflow_id,
                status: inst.status,
            });
        }

        let outcome = self.checkpoints.record(&new).await?;
        if outcome.replayed {
            return Ok(CheckpointReceipt {
                checkpoint: outcome.checkpoint,
                replayed: true,
                step_completed: false,
                instance_status: inst.status,
            });
        }

        let step_completed = new.complete_step && !inst.is_step_complete(&new.step_id);

        if new.complete_step {
            inst.completed_steps = self.store.completions(&inst.workflow_id).await?;
            if step_completed {
                tracing::debug!(
                    workflow_id = %inst.workflow_id,
                    step_id = %new.step_id,
                    completed = inst.completed_steps.len(),
                    total = template.steps.len(),
                    "step completed"
                );
            }
            if self.completion_pending(&inst) {
                self.mark_completed(&mut inst).await?;
            }
        }

        Ok(CheckpointReceipt {
            checkpoint: outcome.checkpoint,
            replayed: false,
            step_completed,
            instance_status: inst.status,
        })
    }

    /// Complete a step with the given outputs.
    pub async fn complete_step(
        &self,
        workflow_id: &str,
        step_id: &str,
        outputs: serde_json::Value,
        source_request_id: Option<String>,
        idempotency_key: Option<String>,
    ) -> Result<CheckpointReceipt, OrchestratorError> {
        self.checkpoint(NewCheckpoint {
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            data: outputs,
            notes: None,
            complete_step: true,
            source_request_id,
            idempotency_key,
        })
        .await
    }

    /// Apply pause / resume / fail.
    pub async fn apply_action(
        &self,
        workflow_id: &str,
        action: LifecycleAction,
        reason: Option<&str>,
    ) -> Result<ActionResult, OrchestratorError> {
        let lock = self.instance_lock(workflow_id);
        let _guard = lock.lock().await;

        let inst = self.load_locked(workflow_id).await?;
        let transition = lifecycle::plan_transition(inst.status, action)?;

        if transition.idempotent {
            tracing::debug!(workflow_id, %action, status = %inst.status, "lifecycle no-op");
            return Ok(ActionResult {
                workflow_id: inst.workflow_id,
                action,
                previous_status: inst.status,
                status: inst.status,
                idempotent: true,
                reason: inst.failure_reason,
            });
        }

        let reason = match action {
            LifecycleAction::Fail => reason.map(|r| lifecycle::bound_reason(r, self.config.max_reason_chars)),
            _ => None,
        };

        self.checkpoints
            .record_lifecycle(workflow_id, action, transition.from, transition.to, reason.as_deref())
            .await?;
        self.store
            .update_status(workflow_id, transition.to, reason.as_deref())
            .await?;
        self.adjust_active(transition.from, transition.to);

        tracing::info!(
            workflow_id,
            %action,
            from = %transition.from,
            to = %transition.to,
            "lifecycle transition applied"
        );

        Ok(ActionResult {
            workflow_id: workflow_id.to_string(),
            action,
            previous_status: transition.from,
            status: transition.to,
            idempotent: false,
            reason,
        })
    }

    // -----------------------------------------------------------------------
    // Checkpoint history
    // -----------------------------------------------------------------------

    pub async fn list_checkpoints(&self, workflow_id: &str) -> Result<Vec<Checkpoint>, OrchestratorError> {
        self.get_state(workflow_id).await?;
        Ok(self.checkpoints.history(workflow_id).await?)
    }

    pub async fn latest_checkpoint(
        &self,
        workflow_id: &str,
        step_id: &str,
    ) -> Result<Option<Checkpoint>, OrchestratorError> {
        self.get_state(workflow_id).await?;
        Ok(self.checkpoints.latest(workflow_id, step_id).await?)
    }

    /// Rebuild an instance view purely from its checkpoint log.
    pub async fn replay_state(&self, workflow_id: &str) -> Result<WorkflowInstance, OrchestratorError> {
        let mut inst = self.get_state(workflow_id).await?;
        inst.completed_steps = self.checkpoints.replay_completions(workflow_id).await?;
        Ok(inst)
    }

    // -----------------------------------------------------------------------
    // Ad-hoc orchestration
    // -----------------------------------------------------------------------

    pub fn tool_descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools.descriptors()
    }

    /// Build a plan without running it.
    pub fn synthesize(&self, request: &OrchestrationRequest) -> Result<OrchestrationPlan, OrchestratorError> {
        Ok(synthesizer::synthesize(
            &request.intent,
            request.context.as_ref(),
            request.constraints.as_ref(),
            &self.weights,
            &self.config.complexity,
        )?)
    }

    /// Run a plan against the registered tools.
    pub async fn execute(&self, plan: &OrchestrationPlan) -> Result<ExecutionResult, OrchestratorError> {
        Ok(executor::execute(plan, &self.tools).await?)
    }

    /// Synthesize then execute.
    pub async fn orchestrate(
        &self,
        request: &OrchestrationRequest,
    ) -> Result<OrchestrationOutcome, OrchestratorError> {
        let plan = self.synthesize(request)?;
        tracing::info!(
            plan_id = %plan.id,
            actor = request.actor.as_deref().unwrap_or("anonymous"),
            steps = plan.steps.len(),
            level = %plan.complexity.level,
            "orchestrating intent"
        );
        let execution = self.execute(&plan).await?;
        Ok(OrchestrationOutcome { plan, execution })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use waymark_types::plan::ExecutionStatus;
    use waymark_types::template::{StepDefinition, StepValidation};

    use crate::flags::StaticFlags;
    use crate::orchestrate::error::ToolError;
    use crate::orchestrate::tool::FnTool;
    use std::collections::BTreeMap;

    use waymark_types::checkpoint::RecordOutcome;
    use waymark_types::error::RepositoryError;
    use waymark_types::instance::StepCompletion;

    use crate::repository::checkpoint::CheckpointStore;
    use crate::repository::instance::InstanceRepository;
    use crate::repository::memory::InMemoryWorkflowStore;

    fn step(id: &str, deps: &[&str]) -> StepDefinition {
        StepDefinition {
            id: id.to_string(),
            title: id.to_uppercase(),
            description: None,
            actions: vec![format!("do {id}")],
            depends_on: deps.iter().map(|s| s.to_string()).collect(),
            validation: StepValidation::default(),
            timeout_sec: None,
            outputs: None,
        }
    }

    fn template(id: &str, version: &str, steps: Vec<StepDefinition>) -> TemplateDefinition {
        TemplateDefinition {
            id: id.to_string(),
            version: version.to_string(),
            title: format!("Template {id}"),
            description: String::new(),
            category: Some("dev".to_string()),
            tags: vec![],
            steps,
            metadata: Default::default(),
        }
    }

    fn ctx() -> OrchestratorContext<InMemoryWorkflowStore> {
        let ctx = OrchestratorContext::new(
            Arc::new(InMemoryWorkflowStore::new()),
            OrchestratorConfig::default(),
        );
        ctx.register_template(template(
            "linear",
            "1.0.0",
            vec![step("A", &[]), step("B", &["A"]), step("C", &["B"])],
        ))
        .unwrap();
        ctx
    }

    async fn start(ctx: &OrchestratorContext<InMemoryWorkflowStore>) -> WorkflowInstance {
        ctx.start(StartWorkflow {
            template_id: "linear".to_string(),
            created_by: "tester".to_string(),
            ..Default::default()
        })
        .await
        .unwrap()
    }

    fn cp(workflow_id: &str, step_id: &str, key: Option<&str>, complete: bool) -> NewCheckpoint {
        NewCheckpoint {
            workflow_id: workflow_id.to_string(),
            step_id: step_id.to_string(),
            data: json!({"by": step_id}),
            complete_step: complete,
            idempotency_key: key.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_register_rejects_invalid_and_duplicate() {
        let ctx = ctx();
        let bad = template("bad", "1", vec![step("a", &[]), step("b", &["a"]), step("c", &["x"])]);
        assert!(matches!(ctx.register_template(bad), Err(OrchestratorError::Template(_))));
        assert!(ctx.get_template("bad", None).is_err());

        let dup = template("linear", "1.0.0", vec![step("A", &[])]);
        assert!(matches!(ctx.register_template(dup), Err(OrchestratorError::TemplateExists(_))));
    }

    #[test]
    fn test_latest_version_selected() {
        let ctx = ctx();
        ctx.register_template(template("linear", "1.10.0", vec![step("A", &[])])).unwrap();
        ctx.register_template(template("linear", "1.2.0", vec![step("A", &[])])).unwrap();
        assert_eq!(ctx.get_template("linear", None).unwrap().version, "1.10.0");
        assert_eq!(ctx.list_templates(Some("dev")).len(), 3);
        assert!(ctx.list_templates(Some("ops")).is_empty());
    }

    #[tokio::test]
    async fn test_start_unknown_template() {
        let ctx = ctx();
        let err = ctx
            .start(StartWorkflow {
                template_id: "nope".to_string(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::TemplateNotFound(_)));
        assert_eq!(ctx.active_count(), 0);
    }

    #[tokio::test]
    async fn test_walk_to_completion() {
        let ctx = ctx();
        let inst = start(&ctx).await;
        let id = inst.workflow_id.as_str();
        assert_eq!(ctx.active_count(), 1);

        assert_eq!(ctx.next_step(id).await.unwrap().step.unwrap().id, "A");
        ctx.complete_step(id, "A", json!({"ok": 1}), None, None).await.unwrap();
        assert_eq!(ctx.next_step(id).await.unwrap().step.unwrap().id, "B");
        ctx.complete_step(id, "B", json!({}), None, None).await.unwrap();
        let receipt = ctx.complete_step(id, "C", json!({}), None, None).await.unwrap();

        assert!(receipt.step_completed);
        assert_eq!(receipt.instance_status, InstanceStatus::Completed);
        let next = ctx.next_step(id).await.unwrap();
        assert!(next.is_complete);
        assert!(next.step.is_none());
        assert_eq!(ctx.get_state(id).await.unwrap().status, InstanceStatus::Completed);
        assert_eq!(ctx.active_count(), 0);
    }

    #[tokio::test]
    async fn test_idempotent_checkpoint_persists_once() {
        let ctx = ctx();
        let id = start(&ctx).await.workflow_id;

        let first = ctx.checkpoint(cp(&id, "A", Some("k1"), true)).await.unwrap();
        let second = ctx.checkpoint(cp(&id, "A", Some("k1"), true)).await.unwrap();

        assert!(!first.replayed);
        assert!(first.step_completed);
        assert!(second.replayed);
        assert!(!second.step_completed);
        assert_eq!(first.checkpoint.id, second.checkpoint.id);
        assert_eq!(ctx.store().checkpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_replay_of_completed_step_succeeds_after_completion() {
        let ctx = ctx();
        let id = start(&ctx).await.workflow_id;
        ctx.complete_step(&id, "A", json!({}), None, Some("a".into())).await.unwrap();
        ctx.complete_step(&id, "B", json!({}), None, None).await.unwrap();
        ctx.complete_step(&id, "C", json!({}), None, None).await.unwrap();

        let replay = ctx
            .complete_step(&id, "A", json!({}), None, Some("a".into()))
            .await
            .unwrap();
        assert!(replay.replayed);
        assert_eq!(replay.instance_status, InstanceStatus::Completed);
    }

    #[tokio::test]
    async fn test_completions_are_monotonic() {
        let ctx = ctx();
        let id = start(&ctx).await.workflow_id;
        ctx.complete_step(&id, "A", json!({"v": 1}), None, None).await.unwrap();

        let again = ctx.checkpoint(cp(&id, "A", None, true)).await.unwrap();
        assert!(!again.step_completed);
        ctx.checkpoint(cp(&id, "A", None, false)).await.unwrap();

        let state = ctx.get_state(&id).await.unwrap();
        assert_eq!(state.completed_steps["A"].outputs, json!({"v": 1}));
        assert_eq!(ctx.replay_state(&id).await.unwrap().completed_steps, state.completed_steps);
    }

    #[tokio::test]
    async fn test_unknown_step_and_instance() {
        let ctx = ctx();
        let id = start(&ctx).await.workflow_id;
        let err = ctx.checkpoint(cp(&id, "Z", None, true)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::UnknownStep { .. }));

        let err = ctx.checkpoint(cp("ghost", "A", None, true)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_pause_twice_and_resume_on_active() {
        let ctx = ctx();
        let id = start(&ctx).await.workflow_id;

        let err = ctx.apply_action(&id, LifecycleAction::Resume, None).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));

        let first = ctx.apply_action(&id, LifecycleAction::Pause, None).await.unwrap();
        assert!(!first.idempotent);
        assert_eq!(first.status, InstanceStatus::Paused);
        assert_eq!(ctx.active_count(), 0);

        let second = ctx.apply_action(&id, LifecycleAction::Pause, None).await.unwrap();
        assert!(second.idempotent);
        assert_eq!(second.status, InstanceStatus::Paused);
        assert_eq!(ctx.active_count(), 0);

        let err = ctx.checkpoint(cp(&id, "A", None, true)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InstanceNotActive { .. }));

        ctx.apply_action(&id, LifecycleAction::Resume, None).await.unwrap();
        assert_eq!(ctx.active_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_bounds_reason_and_is_terminal() {
        let ctx = ctx();
        let id = start(&ctx).await.workflow_id;
        let reason = "r".repeat(2000);

        let result = ctx.apply_action(&id, LifecycleAction::Fail, Some(&reason)).await.unwrap();
        assert_eq!(result.reason.unwrap().len(), 500);
        assert_eq!(ctx.active_count(), 0);

        let again = ctx.apply_action(&id, LifecycleAction::Fail, Some("other")).await.unwrap();
        assert!(again.idempotent);
        assert_eq!(again.reason.unwrap().len(), 500);

        assert!(ctx.apply_action(&id, LifecycleAction::Resume, None).await.is_err());
        assert_eq!(ctx.active_count(), 0);

        let history = ctx.list_checkpoints(&id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_flags_gate_next_step() {
        let store = Arc::new(InMemoryWorkflowStore::new());
        let mut gated = step("deploy", &[]);
        gated.validation.required_flags = vec!["approved".to_string()];

        for (flags, expect_step) in [
            (Arc::new(NoFlags) as Arc<dyn FlagEvaluator>, false),
            (Arc::new(StaticFlags::new(["approved"])) as Arc<dyn FlagEvaluator>, true),
        ] {
            let ctx = OrchestratorContext::new(store.clone(), OrchestratorConfig::default())
                .with_flags(flags);
            ctx.register_template(template("gated", "1", vec![gated.clone()])).unwrap();
            let inst = ctx
                .start(StartWorkflow {
                    template_id: "gated".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
            let next = ctx.next_step(&inst.workflow_id).await.unwrap();
            assert_eq!(next.step.is_some(), expect_step);
            assert!(!next.is_complete);
        }
    }

    #[tokio::test]
    async fn test_concurrent_same_key_checkpoints_collapse() {
        let ctx = Arc::new(ctx());
        let id = start(&ctx).await.workflow_id;

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ctx = ctx.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                ctx.checkpoint(cp(&id, "A", Some("same"), true)).await.unwrap()
            }));
        }
        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap().checkpoint.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(ctx.store().checkpoint_count(), 1);
    }

    #[tokio::test]
    async fn test_orchestrate_runs_registered_tools() {
        let mut tools = ToolRegistry::new();
        for name in ["get_architecture", "get_task_context"] {
            tools.register(FnTool::new(name, name, move |_: &Value| Ok(json!({"tool": name}))));
        }
        let ctx = OrchestratorContext::new(
            Arc::new(InMemoryWorkflowStore::new()),
            OrchestratorConfig::default(),
        )
        .with_tools(tools);

        let request = OrchestrationRequest {
            intent: "design the task scheduler".to_string(),
            ..Default::default()
        };
        let outcome = ctx.orchestrate(&request).await.unwrap();
        assert_eq!(outcome.plan.complexity.score, 3);
        assert_eq!(outcome.execution.status, ExecutionStatus::Completed);
        assert_eq!(outcome.execution.results.len(), 2);
    }

    #[tokio::test]
    async fn test_orchestrate_unknown_tool_fails_early() {
        let mut tools = ToolRegistry::new();
        tools.register(FnTool::new("get_task_context", "ctx", |_: &Value| {
            Err(ToolError::Execution("unused".to_string()))
        }));
        let ctx = OrchestratorContext::new(
            Arc::new(InMemoryWorkflowStore::new()),
            OrchestratorConfig::default(),
        )
        .with_tools(tools);

        let request = OrchestrationRequest {
            intent: "design the task scheduler".to_string(),
            ..Default::default()
        };
        let err = ctx.orchestrate(&request).await.unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_TOOL");
    }

    /// Store whose next `update_status` fails, as if the process died
    /// between the checkpoint write and the status write.
    #[derive(Default)]
    struct LostStatusWriteStore {
        inner: InMemoryWorkflowStore,
        fail_next_update: std::sync::atomic::AtomicBool,
    }

    impl InstanceRepository for LostStatusWriteStore {
        async fn create_instance(&self, instance: &WorkflowInstance) -> Result<(), RepositoryError> {
            self.inner.create_instance(instance).await
        }

        async fn get_instance(&self, workflow_id: &str) -> Result<Option<WorkflowInstance>, RepositoryError> {
            self.inner.get_instance(workflow_id).await
        }

        async fn update_status(
            &self,
            workflow_id: &str,
            status: InstanceStatus,
            failure_reason: Option<&str>,
        ) -> Result<(), RepositoryError> {
            if self.fail_next_update.swap(false, Ordering::SeqCst) {
                return Err(RepositoryError::Query("connection lost".to_string()));
            }
            self.inner.update_status(workflow_id, status, failure_reason).await
        }

        async fn list_instances(
            &self,
            status: Option<InstanceStatus>,
        ) -> Result<Vec<WorkflowInstance>, RepositoryError> {
            self.inner.list_instances(status).await
        }
    }

    impl CheckpointStore for LostStatusWriteStore {
        async fn record(&self, checkpoint: &NewCheckpoint) -> Result<RecordOutcome, RepositoryError> {
            self.inner.record(checkpoint).await
        }

        async fn find_by_idempotency_key(
            &self,
            workflow_id: &str,
            step_id: &str,
            idempotency_key: &str,
        ) -> Result<Option<Checkpoint>, RepositoryError> {
            self.inner
                .find_by_idempotency_key(workflow_id, step_id, idempotency_key)
                .await
        }

        async fn latest(&self, workflow_id: &str, step_id: &str) -> Result<Option<Checkpoint>, RepositoryError> {
            self.inner.latest(workflow_id, step_id).await
        }

        async fn list(&self, workflow_id: &str) -> Result<Vec<Checkpoint>, RepositoryError> {
            self.inner.list(workflow_id).await
        }

        async fn completions(
            &self,
            workflow_id: &str,
        ) -> Result<BTreeMap<String, StepCompletion>, RepositoryError> {
            self.inner.completions(workflow_id).await
        }
    }

    async fn single_step_after_lost_write() -> (Arc<LostStatusWriteStore>, OrchestratorContext<LostStatusWriteStore>, String) {
        let store = Arc::new(LostStatusWriteStore::default());
        let ctx = OrchestratorContext::new(store.clone(), OrchestratorConfig::default());
        ctx.register_template(template("single", "1.0.0", vec![step("a", &[])])).unwrap();
        let id = ctx
            .start(StartWorkflow {
                template_id: "single".to_string(),
                created_by: "tester".to_string(),
                ..Default::default()
            })
            .await
            .unwrap()
            .workflow_id;

        store.fail_next_update.store(true, Ordering::SeqCst);
        let err = ctx.checkpoint(cp(&id, "a", Some("k"), true)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Storage(_)));
        assert_eq!(ctx.active_count(), 1);
        (store, ctx, id)
    }

    #[tokio::test]
    async fn test_retry_after_lost_status_write_completes_instance() {
        let (store, ctx, id) = single_step_after_lost_write().await;

        let retry = ctx.checkpoint(cp(&id, "a", Some("k"), true)).await.unwrap();
        assert!(retry.replayed);
        assert_eq!(retry.instance_status, InstanceStatus::Completed);
        assert_eq!(ctx.active_count(), 0);

        let stored = store.inner.get_instance(&id).await.unwrap().unwrap();
        assert_eq!(stored.status, InstanceStatus::Completed);

        // A second replay does not move the gauge again.
        ctx.checkpoint(cp(&id, "a", Some("k"), true)).await.unwrap();
        assert_eq!(ctx.active_count(), 0);
    }

    #[tokio::test]
    async fn test_reads_derive_completed_after_lost_status_write() {
        let (store, ctx, id) = single_step_after_lost_write().await;

        assert_eq!(ctx.get_state(&id).await.unwrap().status, InstanceStatus::Completed);
        assert!(ctx.next_step(&id).await.unwrap().is_complete);
        assert_eq!(ctx.active_count(), 0);
        assert!(ctx.list_instances(Some(InstanceStatus::Active)).await.unwrap().is_empty());
        assert_eq!(
            store.inner.get_instance(&id).await.unwrap().unwrap().status,
            InstanceStatus::Completed
        );

        let err = ctx.checkpoint(cp(&id, "a", None, false)).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InstanceNotActive { .. }));
    }

    #[tokio::test]
    async fn test_latest_checkpoint_requires_instance() {
        let ctx = ctx();
        let err = ctx.latest_checkpoint("missing", "A").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InstanceNotFound(_)));

        let id = start(&ctx).await.workflow_id;
        assert!(ctx.latest_checkpoint(&id, "A").await.unwrap().is_none());
        ctx.checkpoint(cp(&id, "A", None, false)).await.unwrap();
        assert_eq!(ctx.latest_checkpoint(&id, "A").await.unwrap().unwrap().step_id, "A");
    }
}
