// ABOUTME: Utility functions for validation and bounded execution
// ABOUTME: Provides database name checks, identifier quoting, and command timeouts

use anyhow::{bail, Result};
use std::future::Future;
use std::time::Duration;

/// Longest database name PostgreSQL keeps without truncation (NAMEDATALEN - 1)
pub const MAX_DATABASE_NAME_LEN: usize = 63;

/// Validate a database name before it is interpolated into DDL
///
/// Database names end up inside double-quoted identifiers and inside connection
/// strings, so they must not contain anything that would need escaping in either:
/// - No quote characters (`"`, `'`) or backslashes
/// - No control characters or whitespace
/// - No URL delimiters (`/`, `?`, `#`, `%`, `@`, `:`)
/// - Between 1 and 63 bytes
///
/// # Examples
///
/// ```
/// # use postgres_test_store::utils::validate_database_name;
/// assert!(validate_database_name("TestStore.Scratch_1").is_ok());
/// assert!(validate_database_name("bad\"name").is_err());
/// assert!(validate_database_name("").is_err());
/// ```
pub fn validate_database_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("Database name cannot be empty");
    }

    if name.len() > MAX_DATABASE_NAME_LEN {
        bail!(
            "Database name '{}' is {} bytes long; PostgreSQL keeps at most {} bytes",
            sanitize_identifier(name),
            name.len(),
            MAX_DATABASE_NAME_LEN
        );
    }

    if let Some(bad) = name.chars().find(|c| {
        c.is_control()
            || c.is_whitespace()
            || matches!(c, '"' | '\'' | '\\' | '/' | '?' | '#' | '%' | '@' | ':')
    }) {
        bail!(
            "Database name '{}' contains unsupported character {:?}.\n\
             Names are interpolated into DDL and connection strings and must not need escaping.",
            sanitize_identifier(name),
            bad
        );
    }

    Ok(())
}

/// Quote a validated database name as a PostgreSQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Sanitize an identifier (database name, script path, etc.) for display
///
/// Removes control characters and limits length to prevent log injection attacks
/// and ensure readable error messages.
///
/// **Note**: This is for display purposes only.
///
/// # Examples
///
/// ```
/// # use postgres_test_store::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("normal_db"), "normal_db");
/// assert_eq!(sanitize_identifier("db\x00name"), "dbname");
///
/// let long_name = "a".repeat(200);
/// assert_eq!(sanitize_identifier(&long_name).len(), 100);
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Run a database operation with an upper bound on its duration
///
/// Mirrors a driver command timeout: the future is dropped when the limit
/// passes and an error naming `what` is returned.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => bail!("{} timed out after {:?}", what, limit),
    }
}
