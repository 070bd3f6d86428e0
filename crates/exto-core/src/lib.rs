//! Exto Core — domain models, repository traits and tenant routing shared
//! by every other crate in the workspace.

pub mod context;
pub mod error;
pub mod models;
pub mod repository;
pub mod tenant;
