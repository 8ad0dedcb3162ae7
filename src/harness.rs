// ABOUTME: Test harness context owning configuration, admin access, and shared state
// ABOUTME: Entry point for creating shared and scratch test stores and running scripts

use crate::config::StoreConfig;
use crate::error::ScriptError;
use crate::postgres::{ConnectionString, PgRelationalConnection, RelationalConnection};
use crate::store::{self, DatabaseAdmin, ScratchNamer, SharedRegistry, TestStore};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything a test needs to obtain databases
///
/// Create one per test binary (for example in a `OnceLock` or a fixture) and
/// share it by reference. The shared-database registry lives as long as the
/// harness.
pub struct TestHarness {
    base: ConnectionString,
    admin: DatabaseAdmin,
    registry: SharedRegistry,
    namer: ScratchNamer,
    script_timeout: Duration,
    script_root: Option<PathBuf>,
}

/// Handed to a shared-database initializer on first use of a name
pub struct SharedInit {
    name: String,
    connection_string: ConnectionString,
    admin: DatabaseAdmin,
    script_timeout: Duration,
    script_root: Option<PathBuf>,
}

impl TestHarness {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let base: ConnectionString = config
            .connection_string
            .parse()
            .context("Invalid base connection string for test stores")?;
        let master = PgRelationalConnection::with_admin_database(
            base.with_pooling(false),
            &config.admin_database,
        )?
        .create_master_connection()?;

        Ok(Self {
            base,
            admin: DatabaseAdmin::new(master, config.command_timeout()),
            registry: SharedRegistry::new(),
            namer: ScratchNamer::new(config.scratch_prefix.clone()),
            script_timeout: config.script_timeout(),
            script_root: config.script_root.clone(),
        })
    }

    /// Harness configured from defaults and `TEST_DATABASE_URL`
    pub fn from_env() -> Result<Self> {
        Self::new(&StoreConfig::from_env()?)
    }

    pub fn admin(&self) -> &DatabaseAdmin {
        &self.admin
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Base connection string pointed at database `name`
    pub fn connection_string_for(&self, name: &str) -> Result<ConnectionString> {
        self.base.with_database(name)
    }

    /// Connection string of the administrative database (pooling disabled)
    pub fn admin_connection_string(&self) -> &ConnectionString {
        self.admin.master().connection_string()
    }

    /// Reserve a scratch name without creating anything
    pub fn next_scratch_name(&self) -> String {
        self.namer.next_name()
    }

    pub fn next_scratch_connection_string(&self) -> Result<ConnectionString> {
        self.connection_string_for(&self.next_scratch_name())
    }

    /// Open a shared database, initializing it on first use
    ///
    /// The first call for `name` creates the database if it does not exist and
    /// runs `initialize`; later calls (and concurrent ones, which wait) skip
    /// both. The returned store works inside a transaction that is rolled back
    /// on dispose, so tests see the initialized data but never change it.
    pub async fn get_or_create_shared<F, Fut>(&self, name: &str, initialize: F) -> Result<TestStore>
    where
        F: FnOnce(SharedInit) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let connection_string = self.connection_string_for(name)?;

        let initialized = self
            .registry
            .initialize_once(name, || async {
                self.admin.ensure_database(name, false).await?;
                initialize(SharedInit {
                    name: name.to_string(),
                    connection_string: connection_string.clone(),
                    admin: self.admin.clone(),
                    script_timeout: self.script_timeout,
                    script_root: self.script_root.clone(),
                })
                .await
            })
            .await
            .with_context(|| format!("Failed to initialize shared database '{}'", name))?;
        if initialized {
            tracing::info!("Initialized shared database '{}'", name);
        }

        TestStore::open_shared(name.to_string(), connection_string, self.admin.clone())
            .await
            .with_context(|| format!("Failed to open shared database '{}'", name))
    }

    /// Create a uniquely named scratch database
    ///
    /// With `create_database = false` only the name and connection string are
    /// prepared; nothing exists on the server until the caller creates it.
    /// Either way the database is deleted when the store is disposed.
    pub async fn create_scratch(&self, create_database: bool) -> Result<TestStore> {
        let name = self.next_scratch_name();
        let connection_string = self.connection_string_for(&name)?;
        tracing::debug!("Creating scratch store '{}'", name);

        TestStore::create_scratch(name, connection_string, self.admin.clone(), create_database).await
    }

    /// Run `body` against a fresh scratch database and always tear it down
    ///
    /// The database is deleted whether `body` succeeds, fails, or panics; a
    /// panic is resumed after teardown. A body error takes precedence over a
    /// teardown error, which is then logged.
    ///
    /// ```no_run
    /// # use postgres_test_store::harness::TestHarness;
    /// # use futures::FutureExt;
    /// # async fn example(harness: &TestHarness) -> anyhow::Result<()> {
    /// let count: i64 = harness
    ///     .with_scratch(|store| {
    ///         async move {
    ///             store.batch_execute("CREATE TABLE t (id int); INSERT INTO t VALUES (1)").await?;
    ///             store.query_scalar("SELECT COUNT(*) FROM t", &[]).await
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// assert_eq!(count, 1);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_scratch<T, F>(&self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a TestStore) -> BoxFuture<'a, Result<T>>,
    {
        let store = self.create_scratch(true).await?;
        let outcome = AssertUnwindSafe(body(&store)).catch_unwind().await;
        let name = store.name().to_string();
        let teardown = store.dispose().await;

        match outcome {
            Err(panic) => {
                if let Err(e) = teardown {
                    tracing::error!("Teardown after panic failed for '{}': {:#}", name, e);
                }
                std::panic::resume_unwind(panic)
            }
            Ok(Err(body_err)) => {
                if let Err(e) = teardown {
                    tracing::error!("Teardown after failure failed for '{}': {:#}", name, e);
                }
                Err(body_err)
            }
            Ok(Ok(value)) => teardown.map(|()| value),
        }
    }

    /// Create a database, optionally from a script
    ///
    /// When `script` is given the database is always recreated, so every run
    /// starts from exactly what the script builds. Without a script it is
    /// created only when missing, or recreated when `recreate` is set.
    pub async fn create_database(
        &self,
        name: &str,
        script: Option<&Path>,
        recreate: bool,
    ) -> Result<()> {
        self.admin
            .ensure_database(name, recreate || script.is_some())
            .await?;

        if let Some(script) = script {
            let connection_string = self.connection_string_for(name)?;
            run_script(
                &connection_string,
                script,
                self.script_root.as_deref(),
                self.script_timeout,
            )
            .await?;
        }
        Ok(())
    }

    /// Run a script against an existing database
    pub async fn run_script(&self, name: &str, script: &Path) -> Result<usize> {
        let connection_string = self.connection_string_for(name)?;
        run_script(
            &connection_string,
            script,
            self.script_root.as_deref(),
            self.script_timeout,
        )
        .await
    }

    /// Terminate sessions on `name` and drop it if it exists
    pub async fn delete_database(&self, name: &str) -> Result<()> {
        self.admin.delete_database(name).await
    }

    pub async fn database_exists(&self, name: &str) -> Result<bool> {
        self.admin.database_exists(name).await
    }

    /// Scratch databases currently on the server under this harness's prefix
    pub async fn list_scratch_databases(&self) -> Result<Vec<String>> {
        let databases = self.admin.list_databases().await?;
        Ok(databases
            .into_iter()
            .filter(|name| self.namer.is_scratch_name(name))
            .collect())
    }

    /// Delete every scratch database under this harness's prefix
    ///
    /// Meant for cleaning up after test processes that were killed before
    /// their stores were disposed. Do not run while tests using the same prefix
    /// are active.
    pub async fn purge_scratch_databases(&self) -> Result<Vec<String>> {
        let scratch = self.list_scratch_databases().await?;
        for name in &scratch {
            self.admin.delete_database(name).await?;
            tracing::info!("Purged scratch database '{}'", name);
        }
        Ok(scratch)
    }
}

impl SharedInit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn connection_string(&self) -> &ConnectionString {
        &self.connection_string
    }

    /// Open a session to the shared database outside any test transaction
    pub async fn connect(&self) -> Result<crate::postgres::DbConnection> {
        PgRelationalConnection::new(self.connection_string.with_pooling(false))?
            .open()
            .await
    }

    /// Run SQL against the shared database with the simple query protocol
    pub async fn batch_execute(&self, sql: &str) -> Result<()> {
        let connection = self.connect().await?;
        connection
            .batch_execute(sql)
            .await
            .with_context(|| format!("Failed to initialize shared database '{}'", self.name))
    }

    /// Run a script against the shared database
    pub async fn run_script(&self, script: &Path) -> Result<usize> {
        run_script(
            &self.connection_string,
            script,
            self.script_root.as_deref(),
            self.script_timeout,
        )
        .await
    }

    /// Drop and recreate the shared database, then run `script` against it
    pub async fn recreate_from_script(&self, script: &Path) -> Result<usize> {
        self.admin.ensure_database(&self.name, true).await?;
        self.run_script(script).await
    }
}

/// Load `script`, split it into batches, and run them against one database
///
/// Transport failures get a diagnostic trace here before the error is
/// returned; nothing is retried.
async fn run_script(
    connection_string: &ConnectionString,
    script: &Path,
    script_root: Option<&Path>,
    batch_timeout: Duration,
) -> Result<usize> {
    let path = store::resolve_script_path(script, script_root);
    let database = connection_string.database().unwrap_or("<default>");
    tracing::info!("Running script {} against '{}'", path.display(), database);

    let contents = store::read_script(&path).await?;
    let batches = store::split_batches(&contents);
    let connection = PgRelationalConnection::new(connection_string.with_pooling(false))?
        .open()
        .await?;

    match store::execute_batches(&connection, &batches, batch_timeout).await {
        Ok(executed) => {
            tracing::debug!("Executed {} batch(es) from {}", executed, path.display());
            Ok(executed)
        }
        Err(err @ ScriptError::Io { .. }) => {
            tracing::error!(
                script = %path.display(),
                database = %database,
                batch = ?err.batch(),
                "I/O failure while executing script: {:?}",
                err
            );
            Err(err.into())
        }
        Err(err) => Err(anyhow::Error::new(err)
            .context(format!("Script {} failed against '{}'", path.display(), database))),
    }
}

/// Install a `tracing` subscriber that writes through the test harness
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}
