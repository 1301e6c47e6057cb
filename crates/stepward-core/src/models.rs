//! Domain models for stepward.
//!
//! These are the core types shared across all crates.

pub mod audit;
pub mod certificate;
