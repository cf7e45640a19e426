//! Tool adapters for the ad-hoc executor.

pub mod command;
