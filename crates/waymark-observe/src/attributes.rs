//! Span names and attribute values shared by the CLI and the HTTP layer.
//!
//! Field keys follow a dotted `waymark.*` namespace so exported spans group
//! cleanly next to HTTP spans from `tower-http`.

/// Service name reported to the OpenTelemetry tracer.
pub const SERVICE_NAME: &str = "waymark";

// --- Span names ---

/// One boundary operation (CLI command or HTTP handler).
pub const SPAN_OPERATION: &str = "waymark.operation";

// --- Operation values ---

pub const OP_LIST_TEMPLATES: &str = "list_templates";
pub const OP_GET_TEMPLATE: &str = "get_template";
pub const OP_REGISTER_TEMPLATE: &str = "register_template";
pub const OP_START: &str = "start_workflow";
pub const OP_STATE: &str = "get_state";
pub const OP_LIST_INSTANCES: &str = "list_instances";
pub const OP_NEXT_STEP: &str = "next_step";
pub const OP_CHECKPOINT: &str = "checkpoint";
pub const OP_COMPLETE_STEP: &str = "complete_step";
pub const OP_ACTION: &str = "lifecycle_action";
pub const OP_HISTORY: &str = "checkpoint_history";
pub const OP_REPLAY: &str = "replay_state";
pub const OP_ORCHESTRATE: &str = "orchestrate";
pub const OP_SYNTHESIZE: &str = "synthesize";
pub const OP_LIST_TOOLS: &str = "list_tools";
