//! Authorization port consulted by transports before mutating calls.
//!
//! The orchestrator itself never checks permissions; the CLI and HTTP layers
//! ask an `Authorizer` and refuse the call when it denies.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Verdict of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDecision {
    pub allow: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
}

impl AuthDecision {
    pub fn allowed() -> Self {
        Self {
            allow: true,
            reasons: Vec::new(),
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self {
            allow: false,
            reasons: vec![reason.into()],
        }
    }
}

/// Decides whether an actor may touch a set of resource paths.
pub trait Authorizer: Send + Sync {
    fn allow(&self, actor: &str, affected_paths: &[String]) -> AuthDecision;
}

/// Allows everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn allow(&self, _actor: &str, _affected_paths: &[String]) -> AuthDecision {
        AuthDecision::allowed()
    }
}

/// Allows only the listed actors.
#[derive(Debug, Clone, Default)]
pub struct ActorAllowList {
    actors: HashSet<String>,
}

impl ActorAllowList {
    pub fn new<I, T>(actors: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            actors: actors.into_iter().map(Into::into).collect(),
        }
    }
}

impl Authorizer for ActorAllowList {
    fn allow(&self, actor: &str, _affected_paths: &[String]) -> AuthDecision {
        if self.actors.contains(actor) {
            AuthDecision::allowed()
        } else {
            AuthDecision::denied(format!("actor '{actor}' is not on the allow list"))
        }
    }
}

/// Resource paths touched by each boundary operation.
pub mod paths {
    pub fn template(template_id: &str) -> Vec<String> {
        vec![format!("templates/{template_id}")]
    }

    pub fn workflow(workflow_id: &str) -> Vec<String> {
        vec![format!("workflows/{workflow_id}")]
    }

    pub fn step(workflow_id: &str, step_id: &str) -> Vec<String> {
        vec![format!("workflows/{workflow_id}/steps/{step_id}")]
    }

    pub fn orchestrate() -> Vec<String> {
        vec!["orchestrate".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        assert!(AllowAll.allow("anyone", &paths::orchestrate()).allow);
    }

    #[test]
    fn test_allow_list_denies_with_reason() {
        let auth = ActorAllowList::new(["ci-bot"]);
        assert!(auth.allow("ci-bot", &paths::workflow("wf-1")).allow);

        let decision = auth.allow("mallory", &paths::step("wf-1", "a"));
        assert!(!decision.allow);
        assert!(decision.reasons[0].contains("mallory"));
    }
}
