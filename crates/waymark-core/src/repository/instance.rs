//! Workflow instance repository trait definition.

use waymark_types::error::RepositoryError;
use waymark_types::instance::{InstanceStatus, WorkflowInstance};

/// Repository trait for workflow instance records.
///
/// The completion map of a returned instance is derived from the checkpoint
/// log (first completing checkpoint per step), never stored separately.
///
/// Uses native async fn in traits (Rust 2024 edition, no async_trait macro).
pub trait InstanceRepository: Send + Sync {
    /// Insert a new instance. Fails with `Conflict` if the ID is taken.
    fn create_instance(
        &self,
        instance: &WorkflowInstance,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get an instance by workflow ID.
    fn get_instance(
        &self,
        workflow_id: &str,
    ) -> impl std::future::Future<Output = Result<Option<WorkflowInstance>, RepositoryError>> + Send;

    /// Update status (and optionally the failure reason). `NotFound` if absent.
    fn update_status(
        &self,
        workflow_id: &str,
        status: InstanceStatus,
        failure_reason: Option<&str>,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// List instances, optionally filtered by status, oldest first.
    fn list_instances(
        &self,
        status: Option<InstanceStatus>,
    ) -> impl std::future::Future<Output = Result<Vec<WorkflowInstance>, RepositoryError>> + Send;
}
