//! HTTP request handlers for the REST API.

pub mod orchestrate;
pub mod template;
pub mod workflow;
