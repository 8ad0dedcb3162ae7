// ABOUTME: Provider connection adapter binding a connection string to tokio-postgres
// ABOUTME: Hands out pooled or direct connections and derives the master (admin) connection

use super::{connect, explain_connect_error, tls_connector, ConnectionString};
use anyhow::{Context, Result};
use deadpool_postgres::{Manager, Object, Pool};
use std::future::Future;
use std::ops::Deref;
use tokio_postgres::Client;

/// Administrative database every PostgreSQL server ships with
pub const DEFAULT_ADMIN_DATABASE: &str = "postgres";

/// Upper bound on pooled connections per connection string
const DEFAULT_POOL_SIZE: usize = 16;

/// A source of connections to one database
pub trait RelationalConnection {
    type Connection;

    /// The connection string connections are opened from
    fn connection_string(&self) -> &ConnectionString;

    /// Open (or check out) a connection
    fn open(&self) -> impl Future<Output = Result<Self::Connection>> + Send;
}

/// A live connection handed out by [`PgRelationalConnection`]
///
/// Pooled connections go back to their pool when dropped; direct connections
/// close their session.
pub enum DbConnection {
    Direct(Client),
    Pooled(Object),
}

impl DbConnection {
    pub fn is_pooled(&self) -> bool {
        matches!(self, DbConnection::Pooled(_))
    }
}

impl Deref for DbConnection {
    type Target = Client;

    fn deref(&self) -> &Client {
        match self {
            DbConnection::Direct(client) => client,
            DbConnection::Pooled(object) => object,
        }
    }
}

/// PostgreSQL implementation of [`RelationalConnection`]
///
/// When the connection string has pooling enabled, connections come from a
/// `deadpool-postgres` pool built once per adapter; otherwise every `open`
/// creates a fresh session that ends when the returned connection is dropped.
#[derive(Clone)]
pub struct PgRelationalConnection {
    connection_string: ConnectionString,
    admin_database: String,
    pool: Option<Pool>,
}

impl PgRelationalConnection {
    pub fn new(connection_string: ConnectionString) -> Result<Self> {
        Self::with_admin_database(connection_string, DEFAULT_ADMIN_DATABASE)
    }

    /// Adapter whose master connection targets `admin_database` instead of `postgres`
    pub fn with_admin_database(
        connection_string: ConnectionString,
        admin_database: &str,
    ) -> Result<Self> {
        crate::utils::validate_database_name(admin_database)?;

        let pool = if connection_string.pooling() {
            Some(build_pool(&connection_string)?)
        } else {
            None
        };

        Ok(Self {
            connection_string,
            admin_database: admin_database.to_string(),
            pool,
        })
    }

    /// Connection to the administrative database on the same server
    ///
    /// Used for server-level DDL (`CREATE DATABASE`, `DROP DATABASE`, backend
    /// termination) that cannot run inside the target database or inside an
    /// application transaction. Pooling is always disabled so no idle session
    /// outlives the operation that opened it.
    pub fn create_master_connection(&self) -> Result<Self> {
        let master = self
            .connection_string
            .with_database(&self.admin_database)?
            .with_pooling(false);
        Self::with_admin_database(master, &self.admin_database)
    }

    pub fn database(&self) -> Option<&str> {
        self.connection_string.database()
    }

    pub fn admin_database(&self) -> &str {
        &self.admin_database
    }

    pub fn is_pooled(&self) -> bool {
        self.pool.is_some()
    }
}

impl RelationalConnection for PgRelationalConnection {
    type Connection = DbConnection;

    fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    async fn open(&self) -> Result<DbConnection> {
        match &self.pool {
            Some(pool) => {
                let object = pool
                    .get()
                    .await
                    .map_err(|e| explain_connect_error(&e.to_string()))?;
                Ok(DbConnection::Pooled(object))
            }
            None => Ok(DbConnection::Direct(connect(&self.connection_string).await?)),
        }
    }
}

fn build_pool(connection_string: &ConnectionString) -> Result<Pool> {
    let manager = Manager::new(connection_string.driver_config()?, tls_connector()?);
    Pool::builder(manager)
        .max_size(DEFAULT_POOL_SIZE)
        .build()
        .context("Failed to create connection pool")
}
