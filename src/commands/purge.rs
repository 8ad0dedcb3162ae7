// ABOUTME: Purge command implementation - remove leftover scratch databases
// ABOUTME: Lists databases under the scratch prefix and deletes them after confirmation

use crate::harness::TestHarness;
use anyhow::{Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};

/// Delete every scratch database left by killed test runs
///
/// Prompts before deleting unless `yes` is set. Do not run while tests using
/// the same scratch prefix are active.
pub async fn purge(harness: &TestHarness, yes: bool) -> Result<()> {
    let scratch = harness.list_scratch_databases().await?;
    if scratch.is_empty() {
        tracing::info!("✓ No scratch databases to purge");
        return Ok(());
    }

    tracing::info!("Found {} scratch database(s):", scratch.len());
    for db in &scratch {
        tracing::info!("  - {}", db);
    }

    if !yes {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete {} scratch database(s)?", scratch.len()))
            .default(false)
            .interact()
            .context("Failed to get confirmation")?;

        if !confirmed {
            tracing::warn!("⚠ Purge cancelled");
            return Ok(());
        }
    }

    let purged = harness.purge_scratch_databases().await?;
    tracing::info!("✓ Purged {} scratch database(s)", purged.len());
    Ok(())
}
