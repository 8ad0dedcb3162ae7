// ABOUTME: Create command implementation - provision a named test database
// ABOUTME: Optionally recreates it and runs a GO-separated initialization script

use crate::harness::TestHarness;
use anyhow::{Context, Result};
use std::path::Path;

/// Create database `name` on the harness's server
///
/// With a script the database is always recreated before the script runs.
pub async fn create(
    harness: &TestHarness,
    name: &str,
    script: Option<&Path>,
    recreate: bool,
) -> Result<()> {
    let existed = harness.database_exists(name).await?;
    if existed && script.is_none() && !recreate {
        tracing::info!("✓ Database '{}' already exists", name);
        return Ok(());
    }

    harness
        .create_database(name, script, recreate)
        .await
        .with_context(|| format!("Failed to create database '{}'", name))?;

    match script {
        Some(script) => tracing::info!(
            "✓ Database '{}' created from {}",
            name,
            script.display()
        ),
        None if existed => tracing::info!("✓ Database '{}' recreated", name),
        None => tracing::info!("✓ Database '{}' created", name),
    }
    Ok(())
}
