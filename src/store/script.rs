// ABOUTME: Initialization script loading and batch execution
// ABOUTME: Splits scripts on GO separator lines and runs each batch with a timeout

use crate::error::ScriptError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tokio_postgres::Client;

/// Lines consisting solely of `GO` (any case, surrounding blanks allowed)
static BATCH_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^[ \t]*go[ \t]*\r?$").expect("batch separator pattern is valid")
});

/// Split a script into the batches between `GO` lines
///
/// Blank batches (for example after a trailing `GO`) are dropped.
///
/// # Examples
///
/// ```
/// # use postgres_test_store::store::split_batches;
/// let batches = split_batches("CREATE TABLE a (id int);\nGO\nINSERT INTO a VALUES (1);\ngo\n");
/// assert_eq!(batches, vec!["CREATE TABLE a (id int);", "INSERT INTO a VALUES (1);"]);
/// ```
pub fn split_batches(script: &str) -> Vec<&str> {
    BATCH_SEPARATOR
        .split(script)
        .map(str::trim)
        .filter(|batch| !batch.is_empty())
        .collect()
}

/// Resolve a script path against an optional root directory
///
/// Relative paths are looked up under `root` first and used as given when
/// nothing exists there, so scripts resolve the same way whether tests run from
/// the package directory or elsewhere.
pub fn resolve_script_path(path: &Path, root: Option<&Path>) -> PathBuf {
    if path.is_relative() {
        if let Some(candidate) = root.map(|root| root.join(path)) {
            if candidate.exists() {
                return candidate;
            }
        }
    }
    path.to_path_buf()
}

pub async fn read_script(path: &Path) -> Result<String, ScriptError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })
}

/// Execute batches in order, stopping at the first failure
///
/// Each batch is sent with the simple query protocol, so a batch may hold
/// several statements. Batches already executed are never re-run.
///
/// Returns the number of batches executed.
pub async fn execute_batches(
    client: &Client,
    batches: &[&str],
    batch_timeout: Duration,
) -> Result<usize, ScriptError> {
    for (idx, batch) in batches.iter().enumerate() {
        let number = idx + 1;
        tracing::debug!("Executing script batch {}/{}", number, batches.len());

        match tokio::time::timeout(batch_timeout, client.batch_execute(batch)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(ScriptError::from_driver(number, e)),
            Err(_) => {
                return Err(ScriptError::Timeout {
                    batch: number,
                    timeout: batch_timeout,
                })
            }
        }
    }

    Ok(batches.len())
}
