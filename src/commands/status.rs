// ABOUTME: Status command implementation - report server and database readiness
// ABOUTME: Shows server version, role privileges, and leftover scratch databases

use crate::harness::TestHarness;
use anyhow::{Context, Result};

/// Report whether the server is usable for test stores
///
/// Prints the server version, whether the configured role may create
/// databases, whether `name` exists (when given), and any scratch databases
/// left behind by earlier runs.
pub async fn status(harness: &TestHarness, name: Option<&str>) -> Result<()> {
    tracing::info!("Checking test store server...");
    tracing::info!("Admin connection: {}", harness.admin_connection_string().redacted());
    tracing::info!("");

    let version = harness
        .admin()
        .server_version()
        .await
        .context("Failed to query server version")?;
    tracing::info!("✓ Connected to PostgreSQL {}", version);

    let privileges = harness.admin().privileges().await?;
    if privileges.can_create_databases() {
        tracing::info!("✓ Role can create databases");
    } else {
        tracing::warn!("⚠ Role lacks CREATEDB; test stores cannot be created");
        tracing::warn!("  Grant it with: ALTER ROLE <role> CREATEDB;");
    }

    if let Some(name) = name {
        if harness.database_exists(name).await? {
            tracing::info!("✓ Database '{}' exists", name);
        } else {
            tracing::info!("Database '{}' does not exist", name);
        }
    }

    let scratch = harness.list_scratch_databases().await?;
    if scratch.is_empty() {
        tracing::info!("✓ No leftover scratch databases");
    } else {
        tracing::warn!("⚠ {} leftover scratch database(s):", scratch.len());
        for db in &scratch {
            tracing::warn!("  - {}", db);
        }
        tracing::warn!("  Remove them with the purge command");
    }

    Ok(())
}
