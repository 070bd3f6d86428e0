//! Domain models for Exto.
//!
//! Shared entities live in the core namespace; category data, scan
//! histories and batches live in per-organization namespaces.

pub mod batch;
pub mod category;
pub mod category_data;
pub mod format;
pub mod identity;
pub mod meter_event;
pub mod organization;
pub mod scan_history;
pub mod subscription;
pub mod user;
