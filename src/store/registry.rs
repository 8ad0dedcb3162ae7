// ABOUTME: Registry of shared databases initialized by this harness
// ABOUTME: Guarantees each shared database initializer runs once per name

use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;

/// Tracks which shared databases have been initialized
///
/// Owned by a [`crate::harness::TestHarness`]; its lifetime is the lifetime of
/// the harness, normally the whole test process.
#[derive(Debug, Default)]
pub struct SharedRegistry {
    entries: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl SharedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, name: &str) -> Arc<OnceCell<()>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.entry(name.to_string()).or_default().clone()
    }

    /// Run `initialize` for `name` unless it already succeeded
    ///
    /// Concurrent callers for the same name wait for the one running
    /// initializer. If it fails, the error goes to that caller and the name
    /// stays uninitialized, so the next caller tries again.
    ///
    /// Returns `true` when this call ran the initializer.
    pub async fn initialize_once<F, Fut>(&self, name: &str, initialize: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let cell = self.cell(name);
        let ran = AtomicBool::new(false);
        let ran_ref = &ran;

        cell.get_or_try_init(|| async move {
            ran_ref.store(true, Ordering::Relaxed);
            initialize().await
        })
        .await?;

        Ok(ran.load(Ordering::Relaxed))
    }

    pub fn is_initialized(&self, name: &str) -> bool {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).is_some_and(|cell| cell.initialized())
    }

    /// Names whose initializer has completed
    pub fn initialized_names(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = entries
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }
}
