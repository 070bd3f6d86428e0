//! Tenant namespace routing.
//!
//! Shared entities (identities, users, organizations, categories, formats,
//! subscriptions, meter events) live in the core namespace. Every
//! organization gets its own namespace, `sc_<slug>`, holding its batches,
//! scan histories and one `<category-slug>_data` collection per category.
//! Derivation is pure; nothing is cached.

use std::fmt;

use crate::error::{ExtoError, ExtoResult};

/// Name of the shared cross-tenant namespace.
pub const CORE_NAMESPACE: &str = "core";

/// Prefix of every per-organization namespace.
pub const TENANT_PREFIX: &str = "sc_";

/// Collection holding batches inside a tenant namespace.
pub const BATCH_COLLECTION: &str = "batch";

/// Collection holding scan histories inside a tenant namespace.
pub const SCAN_HISTORY_COLLECTION: &str = "scan_history";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantNamespace {
    Core,
    Organization(String),
}

/// Handle for the shared namespace.
pub fn core_handle() -> TenantNamespace {
    TenantNamespace::Core
}

/// Handle for an organization's namespace.
///
/// Rejects empty slugs and slugs outside `[a-z0-9_-]`: collection names
/// are derived from them.
pub fn org_handle(slug: &str) -> ExtoResult<TenantNamespace> {
    validate_slug(slug)?;
    Ok(TenantNamespace::Organization(slug.to_string()))
}

pub fn validate_slug(slug: &str) -> ExtoResult<()> {
    if slug.is_empty() {
        return Err(ExtoError::TenantContext);
    }
    if !slug
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
    {
        return Err(ExtoError::TenantContext);
    }
    Ok(())
}

/// Collection name for a category's extracted records.
pub fn category_data_collection(category_slug: &str) -> String {
    format!("{category_slug}_data")
}

impl TenantNamespace {
    pub fn name(&self) -> String {
        match self {
            TenantNamespace::Core => CORE_NAMESPACE.to_string(),
            TenantNamespace::Organization(slug) => format!("{TENANT_PREFIX}{slug}"),
        }
    }

    pub fn is_core(&self) -> bool {
        matches!(self, TenantNamespace::Core)
    }

    pub fn batches(&self) -> String {
        self.collection(BATCH_COLLECTION)
    }

    pub fn scan_histories(&self) -> String {
        self.collection(SCAN_HISTORY_COLLECTION)
    }

    pub fn category_data(&self, category_slug: &str) -> String {
        self.collection(&category_data_collection(category_slug))
    }

    /// Physical table name of `collection` inside this namespace.
    ///
    /// Core tables keep their bare names; tenant tables are prefixed with
    /// the namespace and a double underscore.
    pub fn collection(&self, collection: &str) -> String {
        match self {
            TenantNamespace::Core => collection.to_string(),
            TenantNamespace::Organization(_) => format!("{}__{collection}", self.name()),
        }
    }

    /// Prefix shared by every physical table of this namespace.
    pub fn table_prefix(&self) -> Option<String> {
        match self {
            TenantNamespace::Core => None,
            TenantNamespace::Organization(_) => Some(format!("{}__", self.name())),
        }
    }
}

impl fmt::Display for TenantNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
