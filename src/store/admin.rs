// ABOUTME: Server-level database management over short-lived admin connections
// ABOUTME: Checks, creates, drops, and force-deletes databases by name

use super::ddl;
use crate::postgres::{server_version, PgRelationalConnection, RelationalConnection, ServerVersion};
use crate::utils::{validate_database_name, with_timeout};
use anyhow::{Context, Result};
use std::time::Duration;
use tokio_postgres::Client;

/// Role flags relevant to managing test databases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RolePrivileges {
    pub has_create_db: bool,
    pub is_superuser: bool,
}

impl RolePrivileges {
    pub fn can_create_databases(&self) -> bool {
        self.has_create_db || self.is_superuser
    }
}

/// Runs DDL against the administrative database
///
/// Every operation opens its own unpooled connection and closes it before
/// returning, so no idle admin session lingers against a database that is
/// about to be dropped.
#[derive(Clone)]
pub struct DatabaseAdmin {
    master: PgRelationalConnection,
    command_timeout: Duration,
}

impl DatabaseAdmin {
    /// `master` should come from [`PgRelationalConnection::create_master_connection`]
    pub fn new(master: PgRelationalConnection, command_timeout: Duration) -> Self {
        Self {
            master,
            command_timeout,
        }
    }

    pub fn master(&self) -> &PgRelationalConnection {
        &self.master
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    async fn open(&self) -> Result<crate::postgres::DbConnection> {
        self.master
            .open()
            .await
            .context("Failed to open admin connection")
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        validate_database_name(name)?;
        let client = self.open().await?;
        with_timeout(self.command_timeout, "Database existence check", async {
            exists_on(&client, name).await
        })
        .await
    }

    pub async fn create_database(&self, name: &str) -> Result<()> {
        validate_database_name(name)?;
        let client = self.open().await?;
        with_timeout(self.command_timeout, "CREATE DATABASE", async {
            client
                .batch_execute(&ddl::create_database(name))
                .await
                .with_context(|| format!("Failed to create database '{}'", name))
        })
        .await?;

        tracing::info!("Created database '{}'", name);
        Ok(())
    }

    /// Make sure `name` exists, optionally recreating it
    ///
    /// Returns `true` when the database was (re)created by this call.
    pub async fn ensure_database(&self, name: &str, recreate: bool) -> Result<bool> {
        validate_database_name(name)?;
        let client = self.open().await?;

        with_timeout(self.command_timeout, "Database setup", async {
            let exists = exists_on(&client, name).await?;

            if exists && recreate {
                tracing::debug!("Dropping existing database '{}' for recreation", name);
                client
                    .batch_execute(&ddl::drop_database(name))
                    .await
                    .with_context(|| format!("Failed to drop database '{}'", name))?;
            }

            if !exists || recreate {
                client
                    .batch_execute(&ddl::create_database(name))
                    .await
                    .with_context(|| format!("Failed to create database '{}'", name))?;
                tracing::info!("Created database '{}'", name);
                Ok(true)
            } else {
                tracing::debug!("Database '{}' already exists", name);
                Ok(false)
            }
        })
        .await
    }

    /// Force-delete a database: terminate its sessions, then drop it if present
    ///
    /// PostgreSQL refuses to drop a database with attached sessions, so every
    /// other backend bound to `name` is terminated first. Deleting a database
    /// that does not exist succeeds.
    pub async fn delete_database(&self, name: &str) -> Result<()> {
        validate_database_name(name)?;
        let client = self.open().await?;

        with_timeout(self.command_timeout, "Database deletion", async {
            let version = server_version(&client).await?;
            let terminated = client
                .query(&ddl::terminate_backends(version.backend_pid_column()), &[&name])
                .await
                .with_context(|| format!("Failed to terminate sessions on database '{}'", name))?;
            if !terminated.is_empty() {
                tracing::debug!(
                    "Terminated {} session(s) on database '{}'",
                    terminated.len(),
                    name
                );
            }

            client
                .batch_execute(&ddl::drop_database_if_exists(name))
                .await
                .with_context(|| format!("Failed to drop database '{}'", name))
        })
        .await
        .with_context(|| format!("Failed to delete database '{}'", name))?;

        tracing::debug!("Deleted database '{}'", name);
        Ok(())
    }

    /// Names of all non-template databases on the server
    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let client = self.open().await?;
        let rows = with_timeout(self.command_timeout, "Database listing", async {
            client
                .query(ddl::LIST_DATABASES, &[])
                .await
                .context("Failed to list databases")
        })
        .await?;

        Ok(rows.iter().map(|row| row.get(0)).collect())
    }

    pub async fn server_version(&self) -> Result<ServerVersion> {
        let client = self.open().await?;
        server_version(&client).await
    }

    pub async fn privileges(&self) -> Result<RolePrivileges> {
        let client = self.open().await?;
        let row = client
            .query_one(ddl::ROLE_PRIVILEGES, &[])
            .await
            .context("Failed to query user privileges")?;

        Ok(RolePrivileges {
            has_create_db: row.get(0),
            is_superuser: row.get(1),
        })
    }
}

async fn exists_on(client: &Client, name: &str) -> Result<bool> {
    let row = client
        .query_one(ddl::DATABASE_EXISTS, &[&name])
        .await
        .with_context(|| format!("Failed to check whether database '{}' exists", name))?;
    let count: i64 = row.get(0);
    Ok(count > 0)
}
