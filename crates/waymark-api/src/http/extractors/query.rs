//! Query parameter extractors for list endpoints.

use serde::Deserialize;

#[derive(Debug, Deserialize, Default)]
pub struct TemplateListQuery {
    pub category: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TemplateQuery {
    /// Highest registered version when omitted.
    pub version: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct InstanceListQuery {
    /// Filter by status (active, paused, failed, completed).
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CheckpointQuery {
    /// Only the latest checkpoint of this step.
    pub step: Option<String>,
}
