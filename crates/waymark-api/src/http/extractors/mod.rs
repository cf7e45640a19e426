//! Request extractors.

pub mod actor;
pub mod query;
