//! stepward core: domain models, error taxonomy, and repository traits
//! shared by the persistence, PKI, and server crates.

pub mod error;
pub mod models;
pub mod repository;
