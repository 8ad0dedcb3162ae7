// ABOUTME: Database handle returned to tests by the lifecycle manager
// ABOUTME: Owns the test session and tears the database down (or rolls back) on dispose

use super::DatabaseAdmin;
use crate::postgres::{connect, ConnectionString};
use crate::utils::with_timeout;
use anyhow::{bail, Context, Result};
use std::time::Duration;
use tokio_postgres::types::{FromSql, ToSql};
use tokio_postgres::Client;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Long-lived database reused across tests; each handle works inside a
    /// transaction that is rolled back on dispose
    Shared,
    /// Uniquely named database dropped on dispose
    Scratch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    Unopened,
    Open,
    TransactionActive,
    RolledBack,
    Dropped,
}

impl StoreState {
    /// Whether a handle in `mode` may move from `self` to `next`
    ///
    /// ```text
    /// Unopened -> Open -> TransactionActive -> RolledBack   (shared)
    /// Unopened -> Open -> Dropped                           (scratch)
    /// Unopened -> Dropped                                   (scratch, never opened)
    /// ```
    pub fn can_transition_to(self, next: StoreState, mode: StoreMode) -> bool {
        use StoreState::*;

        match (mode, self, next) {
            (_, Unopened, Open) => true,
            (StoreMode::Shared, Open, TransactionActive) => true,
            (StoreMode::Shared, TransactionActive, RolledBack) => true,
            (StoreMode::Scratch, Unopened | Open, Dropped) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StoreState::RolledBack | StoreState::Dropped)
    }
}

/// A database handed to a single test
///
/// Single-owner: not `Clone`, and [`TestStore::dispose`] consumes it. A scratch
/// store dropped without `dispose` (for example while a test panics) still
/// deletes its database from `Drop`, blocking until the deletion finishes.
pub struct TestStore {
    name: String,
    connection_string: ConnectionString,
    mode: StoreMode,
    state: StoreState,
    client: Option<Client>,
    admin: DatabaseAdmin,
    disposed: bool,
}

impl TestStore {
    fn new(
        name: String,
        connection_string: ConnectionString,
        mode: StoreMode,
        admin: DatabaseAdmin,
    ) -> Self {
        Self {
            name,
            connection_string,
            mode,
            state: StoreState::Unopened,
            client: None,
            admin,
            disposed: false,
        }
    }

    /// Open a shared database inside a transaction that is never committed
    pub(crate) async fn open_shared(
        name: String,
        connection_string: ConnectionString,
        admin: DatabaseAdmin,
    ) -> Result<Self> {
        let mut store = Self::new(name, connection_string, StoreMode::Shared, admin);
        store.open().await?;
        store.begin().await?;
        Ok(store)
    }

    /// Prepare a scratch database, creating and opening it when asked
    ///
    /// Any stale database with the same name is deleted first. If creation
    /// succeeds but opening fails, the new database is deleted before the error
    /// is returned.
    pub(crate) async fn create_scratch(
        name: String,
        connection_string: ConnectionString,
        admin: DatabaseAdmin,
        create_database: bool,
    ) -> Result<Self> {
        admin
            .delete_database(&name)
            .await
            .with_context(|| format!("Failed to clear stale scratch database '{}'", name))?;

        let mut store = Self::new(name, connection_string, StoreMode::Scratch, admin);
        if !create_database {
            return Ok(store);
        }

        let setup = async {
            store.admin.create_database(&store.name).await?;
            store.open().await
        }
        .await;

        if let Err(err) = setup {
            let name = store.name.clone();
            if let Err(cleanup) = store.dispose().await {
                tracing::error!(
                    "Failed to clean up scratch database '{}' after setup error: {:#}",
                    name,
                    cleanup
                );
            }
            return Err(err.context(format!("Failed to create scratch database '{}'", name)));
        }

        Ok(store)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    pub fn mode(&self) -> StoreMode {
        self.mode
    }

    pub fn state(&self) -> StoreState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.client.is_some()
    }

    pub fn command_timeout(&self) -> Duration {
        self.admin.command_timeout()
    }

    /// Open the store's session
    ///
    /// Only needed for scratch stores created without their database, once the
    /// caller has created it by other means.
    pub async fn open(&mut self) -> Result<()> {
        self.check_transition(StoreState::Open)?;
        let client = with_timeout(self.command_timeout(), "Opening test store", async {
            connect(&self.connection_string).await
        })
        .await
        .with_context(|| format!("Failed to open test store '{}'", self.name))?;

        self.client = Some(client);
        self.state = StoreState::Open;
        tracing::debug!("Opened test store '{}'", self.name);
        Ok(())
    }

    async fn begin(&mut self) -> Result<()> {
        self.check_transition(StoreState::TransactionActive)?;
        self.batch_execute("BEGIN").await?;
        self.state = StoreState::TransactionActive;
        Ok(())
    }

    /// The store's session; inside the test transaction for shared stores
    pub fn client(&self) -> Result<&Client> {
        match &self.client {
            Some(client) => Ok(client),
            None => bail!(
                "Test store '{}' is not open (state: {:?})",
                self.name,
                self.state
            ),
        }
    }

    /// Execute one statement and return the number of rows it affected
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        let client = self.client()?;
        with_timeout(self.command_timeout(), "Statement", async {
            client
                .execute(sql, params)
                .await
                .with_context(|| format!("Failed to execute statement on '{}'", self.name))
        })
        .await
    }

    /// First column of the single row returned by `sql`
    pub async fn query_scalar<T>(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<T>
    where
        T: for<'a> FromSql<'a>,
    {
        let client = self.client()?;
        with_timeout(self.command_timeout(), "Scalar query", async {
            let row = client
                .query_one(sql, params)
                .await
                .with_context(|| format!("Failed to run scalar query on '{}'", self.name))?;
            row.try_get(0).context("Failed to read scalar value")
        })
        .await
    }

    /// First column of every row returned by `sql`
    pub async fn query_column<T>(
        &self,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        let client = self.client()?;
        with_timeout(self.command_timeout(), "Query", async {
            let rows = client
                .query(sql, params)
                .await
                .with_context(|| format!("Failed to run query on '{}'", self.name))?;
            rows.iter()
                .map(|row| row.try_get(0).context("Failed to read column value"))
                .collect::<Result<Vec<T>>>()
        })
        .await
    }

    /// Run one or more statements with the simple query protocol
    pub async fn batch_execute(&self, sql: &str) -> Result<()> {
        let client = self.client()?;
        with_timeout(self.command_timeout(), "Batch", async {
            client
                .batch_execute(sql)
                .await
                .with_context(|| format!("Failed to execute batch on '{}'", self.name))
        })
        .await
    }

    /// Tear the store down
    ///
    /// Shared: roll back the test transaction and close the session; the
    /// database is kept. Scratch: close the session, then terminate remaining
    /// sessions and drop the database. Errors are returned, not swallowed, so
    /// leaked databases are visible.
    pub async fn dispose(mut self) -> Result<()> {
        self.disposed = true;

        match self.mode {
            StoreMode::Shared => {
                let rolled_back = if self.state == StoreState::TransactionActive {
                    self.batch_execute("ROLLBACK")
                        .await
                        .with_context(|| {
                            format!("Failed to roll back shared store '{}'", self.name)
                        })
                        .map(|()| true)
                } else {
                    Ok(false)
                };
                self.client = None;

                if rolled_back? {
                    self.state = StoreState::RolledBack;
                }
                tracing::debug!("Released shared store '{}'", self.name);
            }
            StoreMode::Scratch => {
                self.client = None;
                self.check_transition(StoreState::Dropped)?;
                self.admin
                    .delete_database(&self.name)
                    .await
                    .with_context(|| format!("Failed to delete scratch database '{}'", self.name))?;
                self.state = StoreState::Dropped;
                tracing::debug!("Dropped scratch store '{}'", self.name);
            }
        }

        Ok(())
    }

    fn check_transition(&self, next: StoreState) -> Result<()> {
        if !self.state.can_transition_to(next, self.mode) {
            bail!(
                "Test store '{}' cannot move from {:?} to {:?}",
                self.name,
                self.state,
                next
            );
        }
        Ok(())
    }
}

impl Drop for TestStore {
    fn drop(&mut self) {
        if self.disposed {
            return;
        }

        // Closing the session discards any open transaction
        self.client = None;
        if self.mode == StoreMode::Shared {
            return;
        }

        tracing::warn!(
            "Scratch store '{}' dropped without dispose; deleting its database",
            self.name
        );

        // Run the async teardown on its own runtime so this works both inside
        // and outside an async context
        let admin = self.admin.clone();
        let name = self.name.clone();
        let outcome = std::thread::spawn(move || -> Result<()> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to build teardown runtime")?;
            runtime.block_on(admin.delete_database(&name))
        })
        .join();

        match outcome {
            Ok(Ok(())) => tracing::debug!("Dropped scratch store '{}'", self.name),
            Ok(Err(e)) => tracing::error!(
                "Failed to delete scratch database '{}': {:#}",
                self.name,
                e
            ),
            Err(_) => tracing::error!(
                "Teardown of scratch database '{}' panicked",
                self.name
            ),
        }
    }
}
