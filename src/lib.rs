// ABOUTME: Library module for postgres-test-store
// ABOUTME: Ephemeral PostgreSQL databases for tests: shared fixtures, scratch stores, and scripts

pub mod blocking;
pub mod commands;
pub mod config;
pub mod error;
pub mod harness;
pub mod postgres;
pub mod store;
pub mod utils;

pub use blocking::{BlockingHarness, BlockingSharedInit, BlockingTestStore};
pub use config::StoreConfig;
pub use error::ScriptError;
pub use harness::{init_test_logging, SharedInit, TestHarness};
pub use postgres::{ConnectionString, PgRelationalConnection, RelationalConnection};
pub use store::{StoreMode, StoreState, TestStore};
