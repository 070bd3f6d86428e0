//! Exto Database — SurrealDB connection management, schema migrations,
//! tenant table provisioning and repository implementations.
//!
//! This crate provides:
//! - Connection management ([`DbManager`], [`DbConfig`])
//! - Schema initialization and migrations ([`run_migrations`])
//! - Per-organization table lifecycle ([`SurrealTenantRepository`])
//! - Error types ([`DbError`])
//! - Implementations of every `exto-core` repository trait ([`repository`])

mod connection;
mod error;
mod query;
mod schema;
mod tenant;

pub mod repository;

pub use connection::{DbConfig, DbManager};
pub use error::DbError;
pub use query::DEFAULT_QUERY_TIMEOUT;
pub use schema::{run_migrations, schema_v1};
pub use tenant::SurrealTenantRepository;
