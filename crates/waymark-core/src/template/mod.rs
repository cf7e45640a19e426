//! Template model and validator.
//!
//! - `definition` -- YAML/JSON parsing, shape validation, filesystem load/save/discovery
//! - `dag` -- DAG validation (three-color cycle detection) and wave computation

pub mod dag;
pub mod definition;
