//! stepward database: SurrealDB connection management and repository
//! implementations.
//!
//! This crate provides:
//! - Opening a migrated certificate store ([`DbManager`], [`DbConfig`])
//! - The schema and its migration runner ([`run_migrations`])
//! - Error types ([`DbError`])
//! - Implementations of the `stepward-core` repository traits
//!   ([`repository`])

mod connection;
mod error;
pub mod repository;
mod schema;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use schema::run_migrations;
