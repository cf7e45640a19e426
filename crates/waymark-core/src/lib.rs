//! Core business logic for Waymark.
//!
//! This crate contains the orchestration logic and the storage ports (traits)
//! that waymark-infra implements. It never depends on a concrete database.
//!
//! - `template` -- template validation, DAG primitives, template files
//! - `repository` -- `InstanceRepository` / `CheckpointStore` ports and an in-memory store
//! - `workflow` -- instance state machine, resolver, lifecycle, checkpoint manager
//! - `orchestrate` -- ad-hoc plan synthesis, scoring and execution
//! - `context` -- `OrchestratorContext`, the handle every boundary operation goes through
//! - `flags`, `auth` -- external collaborator ports

pub mod auth;
pub mod context;
pub mod flags;
pub mod orchestrate;
pub mod repository;
pub mod template;
pub mod workflow;
