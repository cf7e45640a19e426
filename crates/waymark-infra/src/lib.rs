//! Infrastructure layer for Waymark.
//!
//! Implements the ports defined in `waymark-core`: the SQLite workflow store,
//! the `config.toml` loader, the context-aware flag evaluator and
//! command-backed tools.

pub mod config;
pub mod flags;
pub mod sqlite;
pub mod tools;
