//! Schema definitions and migration runner for SurrealDB.
//!
//! Only the shared core tables are migrated here. Per-organization tables
//! are defined on demand by [`crate::tenant`]. UUIDs are stored as strings
//! and enums as strings with ASSERT constraints. Categories and formats
//! carry recursive, free-form JSON (`fields`, `extraction_fields`), so
//! those two tables are SCHEMALESS with their scalar columns still typed.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "core_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — core namespace
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Organizations (tenant roots)
-- =======================================================================
DEFINE TABLE organization SCHEMAFULL;
DEFINE FIELD name ON TABLE organization TYPE string;
DEFINE FIELD slug ON TABLE organization TYPE string;
DEFINE FIELD owner_id ON TABLE organization TYPE option<string>;
DEFINE FIELD is_active ON TABLE organization TYPE bool DEFAULT true;
DEFINE FIELD scan_counter ON TABLE organization TYPE int DEFAULT 0 \
    ASSERT $value >= 0;
DEFINE FIELD last_active_at ON TABLE organization TYPE option<datetime>;
DEFINE FIELD billing ON TABLE organization TYPE object FLEXIBLE \
    DEFAULT {};
DEFINE FIELD payment_customer_id ON TABLE organization \
    TYPE option<string>;
DEFINE FIELD created_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE organization TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD deleted_at ON TABLE organization TYPE option<datetime>;
DEFINE FIELD deleted_by ON TABLE organization TYPE option<string>;
DEFINE INDEX idx_organization_slug ON TABLE organization \
    COLUMNS slug UNIQUE;
DEFINE INDEX idx_organization_owner ON TABLE organization \
    COLUMNS owner_id;

-- =======================================================================
-- Identities (one per login email)
-- =======================================================================
DEFINE TABLE identity SCHEMAFULL;
DEFINE FIELD email ON TABLE identity TYPE string;
DEFINE FIELD first_name ON TABLE identity TYPE string;
DEFINE FIELD last_name ON TABLE identity TYPE string;
DEFINE FIELD is_active ON TABLE identity TYPE bool DEFAULT true;
DEFINE FIELD current_org_id ON TABLE identity TYPE option<string>;
DEFINE FIELD created_at ON TABLE identity TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE identity TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_identity_email ON TABLE identity COLUMNS email UNIQUE;

-- =======================================================================
-- Users (identity membership in an organization)
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD identity_id ON TABLE user TYPE string;
DEFINE FIELD organization_id ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD first_name ON TABLE user TYPE string;
DEFINE FIELD last_name ON TABLE user TYPE string;
DEFINE FIELD role ON TABLE user TYPE string \
    ASSERT $value IN ['super_admin', 'billing_admin', \
    'organization_admin', 'member', 'guest'];
DEFINE FIELD is_active ON TABLE user TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE user TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_user_org_email ON TABLE user \
    COLUMNS organization_id, email UNIQUE;
DEFINE INDEX idx_user_identity ON TABLE user COLUMNS identity_id;

-- =======================================================================
-- Categories (dynamic schemas; `fields` is free-form)
-- =======================================================================
DEFINE TABLE category SCHEMALESS;
DEFINE FIELD name ON TABLE category TYPE string;
DEFINE FIELD slug ON TABLE category TYPE string;
DEFINE FIELD version ON TABLE category TYPE string;
DEFINE FIELD primary_field ON TABLE category TYPE option<string>;
DEFINE FIELD is_active ON TABLE category TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE category TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE category TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_category_slug ON TABLE category COLUMNS slug UNIQUE;
DEFINE INDEX idx_category_created ON TABLE category COLUMNS created_at;

-- =======================================================================
-- Formats (extraction templates; `extraction_fields` is free-form)
-- =======================================================================
DEFINE TABLE format SCHEMALESS;
DEFINE FIELD name ON TABLE format TYPE string;
DEFINE FIELD category_id ON TABLE format TYPE string;
DEFINE FIELD is_active ON TABLE format TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE format TYPE datetime DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE format TYPE datetime DEFAULT time::now();
DEFINE INDEX idx_format_category ON TABLE format COLUMNS category_id;

-- =======================================================================
-- Billing mirrors
-- =======================================================================
DEFINE TABLE meter_event SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE meter_event TYPE string;
DEFINE FIELD event_name ON TABLE meter_event TYPE string;
DEFINE FIELD event_value ON TABLE meter_event TYPE int;
DEFINE FIELD payment_customer_id ON TABLE meter_event TYPE string;
DEFINE FIELD created_at ON TABLE meter_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_meter_event_org ON TABLE meter_event \
    COLUMNS organization_id;

DEFINE TABLE subscription SCHEMAFULL;
DEFINE FIELD organization_id ON TABLE subscription TYPE string;
DEFINE FIELD external_id ON TABLE subscription TYPE string;
DEFINE FIELD started_at ON TABLE subscription TYPE datetime;
DEFINE FIELD ended_at ON TABLE subscription TYPE option<datetime>;
DEFINE FIELD trial_period_days ON TABLE subscription TYPE int DEFAULT 0;
DEFINE FIELD billing_cycle ON TABLE subscription TYPE string \
    ASSERT $value IN ['monthly', 'yearly'];
DEFINE FIELD status ON TABLE subscription TYPE string \
    ASSERT $value IN ['active', 'trialing', 'canceled', 'past_due', \
    'unpaid', 'incomplete'];
DEFINE FIELD is_current ON TABLE subscription TYPE bool DEFAULT true;
DEFINE FIELD created_at ON TABLE subscription TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_subscription_org ON TABLE subscription \
    COLUMNS organization_id;
";

/// Run all pending migrations against the database.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_defines_every_core_table() {
        for table in [
            "organization",
            "identity",
            "user",
            "category",
            "format",
            "meter_event",
            "subscription",
        ] {
            assert!(
                SCHEMA_V1.contains(&format!("DEFINE TABLE {table} ")),
                "missing table {table}"
            );
        }
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
