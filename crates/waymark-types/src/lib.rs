//! Shared domain types for Waymark.
//!
//! This crate contains the core domain types used across the orchestrator:
//! workflow templates, running instances, checkpoints, ad-hoc orchestration
//! plans, configuration, and the storage error type.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, semver, thiserror.

pub mod checkpoint;
pub mod config;
pub mod error;
pub mod instance;
pub mod plan;
pub mod template;
