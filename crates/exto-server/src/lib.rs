//! Exto Server — configuration and service wiring for the binary.

pub mod config;
pub mod state;

pub use config::{ConfigError, ServerConfig};
pub use state::AppState;
