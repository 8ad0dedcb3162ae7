// ABOUTME: Drop command implementation - force-delete a test database
// ABOUTME: Terminates attached sessions before dropping; missing databases are fine

use crate::harness::TestHarness;
use anyhow::Result;

pub async fn drop_database(harness: &TestHarness, name: &str) -> Result<()> {
    if !harness.database_exists(name).await? {
        tracing::info!("Database '{}' does not exist; nothing to drop", name);
        return Ok(());
    }

    harness.delete_database(name).await?;
    tracing::info!("✓ Database '{}' dropped", name);
    Ok(())
}
