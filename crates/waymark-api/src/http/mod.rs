//! HTTP/REST API layer for Waymark.
//!
//! Axum routes under `/api/v1/`, one per boundary operation, answering in an
//! envelope format.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
