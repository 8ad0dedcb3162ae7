// ABOUTME: SQL issued by the lifecycle manager against the admin database
// ABOUTME: Builds existence checks, create/drop DDL, and backend termination queries

use crate::utils::quote_identifier;

/// Count of databases named `$1` (0 or 1)
pub const DATABASE_EXISTS: &str = "SELECT COUNT(*) FROM pg_database WHERE datname = $1";

/// Names of every non-template database
pub const LIST_DATABASES: &str =
    "SELECT datname FROM pg_database WHERE datistemplate = false ORDER BY datname";

/// Role flags needed to manage test databases
pub const ROLE_PRIVILEGES: &str =
    "SELECT rolcreatedb, rolsuper FROM pg_roles WHERE rolname = current_user";

pub fn create_database(name: &str) -> String {
    format!("CREATE DATABASE {}", quote_identifier(name))
}

pub fn drop_database(name: &str) -> String {
    format!("DROP DATABASE {}", quote_identifier(name))
}

pub fn drop_database_if_exists(name: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_identifier(name))
}

/// Terminate every other backend attached to database `$1`
///
/// `pid_column` is `pid` on 9.2 and later, `procpid` before that.
pub fn terminate_backends(pid_column: &str) -> String {
    format!(
        "SELECT pg_terminate_backend(pg_stat_activity.{col}) \
         FROM pg_stat_activity \
         WHERE pg_stat_activity.datname = $1 \
           AND pg_stat_activity.{col} <> pg_backend_pid()",
        col = pid_column
    )
}
