//! Template-driven workflow engine.
//!
//! - `instance` -- instance construction and derived completion status
//! - `checkpoint` -- checkpoint manager over the `CheckpointStore` port
//! - `resolver` -- next-step eligibility
//! - `lifecycle` -- pause/resume/fail transition table
//! - `error` -- `OrchestratorError`

pub mod checkpoint;
pub mod error;
pub mod instance;
pub mod lifecycle;
pub mod resolver;
