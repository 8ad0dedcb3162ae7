// ABOUTME: Synchronous facade over the async harness for non-async test suites
// ABOUTME: Owns a tokio runtime and blocks on each harness and store operation

use crate::config::StoreConfig;
use crate::harness::{SharedInit, TestHarness};
use crate::postgres::ConnectionString;
use crate::store::{StoreMode, StoreState, TestStore};
use anyhow::{Context, Result};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};
use tokio_postgres::types::{FromSql, ToSql};

/// [`TestHarness`] for plain `#[test]` functions
///
/// Must not be used from inside an async context; blocking on the owned
/// runtime from there panics.
pub struct BlockingHarness {
    runtime: Arc<Runtime>,
    inner: TestHarness,
}

/// [`TestStore`] whose operations block the calling thread
pub struct BlockingTestStore {
    runtime: Arc<Runtime>,
    store: Option<TestStore>,
}

/// [`SharedInit`] whose operations block the calling thread
pub struct BlockingSharedInit {
    handle: Handle,
    inner: SharedInit,
}

impl BlockingHarness {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .context("Failed to build test store runtime")?;

        Ok(Self {
            runtime: Arc::new(runtime),
            inner: TestHarness::new(config)?,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&StoreConfig::from_env()?)
    }

    /// The async harness this facade drives
    pub fn harness(&self) -> &TestHarness {
        &self.inner
    }

    pub fn connection_string_for(&self, name: &str) -> Result<ConnectionString> {
        self.inner.connection_string_for(name)
    }

    pub fn next_scratch_name(&self) -> String {
        self.inner.next_scratch_name()
    }

    pub fn next_scratch_connection_string(&self) -> Result<ConnectionString> {
        self.inner.next_scratch_connection_string()
    }

    /// Blocking [`TestHarness::get_or_create_shared`]
    ///
    /// The initializer runs on the runtime's blocking pool, so it may call the
    /// blocking methods of [`BlockingSharedInit`].
    pub fn get_or_create_shared<F>(&self, name: &str, initialize: F) -> Result<BlockingTestStore>
    where
        F: FnOnce(&BlockingSharedInit) -> Result<()> + Send + 'static,
    {
        let store = self.runtime.block_on(self.inner.get_or_create_shared(name, |init| async move {
            let handle = Handle::current();
            tokio::task::spawn_blocking(move || {
                initialize(&BlockingSharedInit {
                    handle,
                    inner: init,
                })
            })
            .await
            .context("Shared database initializer panicked")?
        }))?;

        Ok(self.wrap(store))
    }

    pub fn create_scratch(&self, create_database: bool) -> Result<BlockingTestStore> {
        let store = self.runtime.block_on(self.inner.create_scratch(create_database))?;
        Ok(self.wrap(store))
    }

    /// Blocking [`TestHarness::with_scratch`]
    pub fn with_scratch<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&BlockingTestStore) -> Result<T>,
    {
        let store = self.create_scratch(true)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&store)));
        let name = store.name().to_string();
        let teardown = store.dispose();

        match outcome {
            Err(panic) => {
                if let Err(e) = teardown {
                    tracing::error!("Teardown after panic failed for '{}': {:#}", name, e);
                }
                panic::resume_unwind(panic)
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

    pub fn create_database(&self, name: &str, script: Option<&Path>, recreate: bool) -> Result<()> {
        self.runtime
            .block_on(self.inner.create_database(name, script, recreate))
    }

    pub fn run_script(&self, name: &str, script: &Path) -> Result<usize> {
        self.runtime.block_on(self.inner.run_script(name, script))
    }

    pub fn delete_database(&self, name: &str) -> Result<()> {
        self.runtime.block_on(self.inner.delete_database(name))
    }

    pub fn database_exists(&self, name: &str) -> Result<bool> {
        self.runtime.block_on(self.inner.database_exists(name))
    }

    pub fn purge_scratch_databases(&self) -> Result<Vec<String>> {
        self.runtime.block_on(self.inner.purge_scratch_databases())
    }

    fn wrap(&self, store: TestStore) -> BlockingTestStore {
        BlockingTestStore {
            runtime: Arc::clone(&self.runtime),
            store: Some(store),
        }
    }
}

impl BlockingTestStore {
    fn store(&self) -> &TestStore {
        // Only `dispose` and `Drop` take the store, and both consume the handle
        self.store
            .as_ref()
            .unwrap_or_else(|| unreachable!("blocking test store used after dispose"))
    }

    pub fn name(&self) -> &str {
        self.store().name()
    }

    pub fn connection_string(&self) -> &ConnectionString {
        self.store().connection_string()
    }

    pub fn mode(&self) -> StoreMode {
        self.store().mode()
    }

    pub fn state(&self) -> StoreState {
        self.store().state()
    }

    pub fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        self.runtime.block_on(self.store().execute(sql, params))
    }

    pub fn query_scalar<T>(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<T>
    where
        T: for<'a> FromSql<'a>,
    {
        self.runtime.block_on(self.store().query_scalar(sql, params))
    }

    pub fn query_column<T>(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<T>>
    where
        T: for<'a> FromSql<'a>,
    {
        self.runtime.block_on(self.store().query_column(sql, params))
    }

    pub fn batch_execute(&self, sql: &str) -> Result<()> {
        self.runtime.block_on(self.store().batch_execute(sql))
    }

    /// Blocking [`TestStore::dispose`]
    pub fn dispose(mut self) -> Result<()> {
        match self.store.take() {
            Some(store) => self.runtime.block_on(store.dispose()),
            None => Ok(()),
        }
    }
}

impl Drop for BlockingTestStore {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };

        if Handle::try_current().is_ok() {
            // Cannot block here; the store's own drop handles teardown
            drop(store);
            return;
        }

        let name = store.name().to_string();
        if let Err(e) = self.runtime.block_on(store.dispose()) {
            tracing::error!("Failed to dispose test store '{}': {:#}", name, e);
        }
    }
}

impl BlockingSharedInit {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn connection_string(&self) -> &ConnectionString {
        self.inner.connection_string()
    }

    pub fn batch_execute(&self, sql: &str) -> Result<()> {
        self.handle.block_on(self.inner.batch_execute(sql))
    }

    pub fn run_script(&self, script: &Path) -> Result<usize> {
        self.handle.block_on(self.inner.run_script(script))
    }

    pub fn recreate_from_script(&self, script: &Path) -> Result<usize> {
        self.handle.block_on(self.inner.recreate_from_script(script))
    }
}
