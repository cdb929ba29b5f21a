//! CLI command implementations.

pub mod discover;
pub mod run;
pub mod trust;
