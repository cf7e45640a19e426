//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (waymark-infra) implements. The core crate never depends on any specific
//! storage technology. `memory` provides a DashMap-backed implementation for
//! tests and ephemeral runs.

pub mod checkpoint;
pub mod instance;
pub mod memory;

use checkpoint::CheckpointStore;
use instance::InstanceRepository;

/// A backend that stores both instances and their checkpoints.
pub trait WorkflowStore: InstanceRepository + CheckpointStore {}

impl<T: InstanceRepository + CheckpointStore> WorkflowStore for T {}
