// ABOUTME: Integration tests for shared and scratch test store lifecycles
// ABOUTME: Exercise the harness end-to-end against a real server via TEST_DATABASE_URL

use futures::FutureExt;
use postgres_test_store::postgres::connect;
use postgres_test_store::{
    init_test_logging, ScriptError, StoreConfig, StoreMode, StoreState, TestHarness,
};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Helper to build a harness from TEST_DATABASE_URL
fn harness() -> TestHarness {
    harness_with(|_| {})
}

fn harness_with(customize: impl FnOnce(&mut StoreConfig)) -> TestHarness {
    init_test_logging();
    std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");

    let mut config = StoreConfig::from_env().unwrap();
    config.scratch_prefix = "IntegrationTest.".to_string();
    customize(&mut config);
    TestHarness::new(&config).unwrap()
}

fn script_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".sql").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[tokio::test]
#[ignore]
async fn test_shared_initializer_runs_once() {
    let harness = harness();
    let calls = AtomicUsize::new(0);
    let name = "IntegrationTest.SharedOnce";

    let init = |init: postgres_test_store::SharedInit| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            init.batch_execute(
                "DROP TABLE IF EXISTS seed; CREATE TABLE seed (id int); INSERT INTO seed VALUES (1), (2)",
            )
            .await
        }
    };

    let (first, second) = tokio::join!(
        harness.get_or_create_shared(name, init),
        harness.get_or_create_shared(name, init)
    );
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(first.mode(), StoreMode::Shared);
    assert_eq!(second.state(), StoreState::TransactionActive);
    assert_eq!(first.query_scalar::<i64>("SELECT COUNT(*) FROM seed", &[]).await.unwrap(), 2);

    first.dispose().await.unwrap();
    second.dispose().await.unwrap();

    let third = harness.get_or_create_shared(name, init).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    third.dispose().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_shared_changes_are_rolled_back() {
    let harness = harness();
    let name = "IntegrationTest.SharedRollback";
    let init = |init: postgres_test_store::SharedInit| async move {
        init.batch_execute(
            "DROP TABLE IF EXISTS orders; CREATE TABLE orders (id int); INSERT INTO orders VALUES (1)",
        )
        .await
    };

    let store = harness.get_or_create_shared(name, init).await.unwrap();
    store.execute("INSERT INTO orders VALUES ($1)", &[&2i32]).await.unwrap();
    assert_eq!(store.query_scalar::<i64>("SELECT COUNT(*) FROM orders", &[]).await.unwrap(), 2);
    store.dispose().await.unwrap();

    assert!(harness.database_exists(name).await.unwrap());

    let store = harness.get_or_create_shared(name, init).await.unwrap();
    let ids: Vec<i32> = store.query_column("SELECT id FROM orders", &[]).await.unwrap();
    assert_eq!(ids, vec![1]);
    store.dispose().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_failed_shared_initializer_is_retried() {
    let harness = harness();
    let name = "IntegrationTest.SharedRetry";

    let result = harness
        .get_or_create_shared(name, |_init| async {
            Err::<(), _>(anyhow::anyhow!("seed data unavailable"))
        })
        .await;
    assert!(result.is_err());
    assert!(!harness.registry().is_initialized(name));

    let store = harness
        .get_or_create_shared(name, |_init| async { Ok(()) })
        .await
        .unwrap();
    assert!(harness.registry().is_initialized(name));
    store.dispose().await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_scratch_dispose_drops_database() {
    let harness = harness();

    let store = harness.create_scratch(true).await.unwrap();
    let name = store.name().to_string();
    assert!(name.starts_with("IntegrationTest.Scratch_"));
    assert_eq!(store.state(), StoreState::Open);
    assert!(harness.database_exists(&name).await.unwrap());

    store.batch_execute("CREATE TABLE t (id int)").await.unwrap();
    store.dispose().await.unwrap();

    assert!(!harness.database_exists(&name).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_scratch_dispose_terminates_other_sessions() {
    let harness = harness();

    let store = harness.create_scratch(true).await.unwrap();
    let name = store.name().to_string();
    let other = connect(store.connection_string()).await.unwrap();
    other.batch_execute("SELECT 1").await.unwrap();

    store.dispose().await.unwrap();

    assert!(!harness.database_exists(&name).await.unwrap());
    assert!(other.batch_execute("SELECT 1").await.is_err());
}

#[tokio::test]
#[ignore]
async fn test_scratch_without_database() {
    let harness = harness();

    let mut store = harness.create_scratch(false).await.unwrap();
    let name = store.name().to_string();
    assert_eq!(store.state(), StoreState::Unopened);
    assert!(!harness.database_exists(&name).await.unwrap());
    assert!(store.batch_execute("SELECT 1").await.is_err());

    // The caller creates the database; dispose still removes it
    harness.create_database(&name, None, false).await.unwrap();
    store.open().await.unwrap();
    store.batch_execute("SELECT 1").await.unwrap();
    store.dispose().await.unwrap();

    assert!(!harness.database_exists(&name).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_with_scratch_cleans_up_on_error() {
    let harness = harness();
    let seen = Arc::new(Mutex::new(None));
    let recorder = Arc::clone(&seen);

    let result: anyhow::Result<()> = harness
        .with_scratch(move |store| {
            async move {
                *recorder.lock().unwrap() = Some(store.name().to_string());
                store.batch_execute("SELECT * FROM no_such_table").await
            }
            .boxed()
        })
        .await;

    assert!(result.is_err());
    let name = seen.lock().unwrap().clone().unwrap();
    assert!(!harness.database_exists(&name).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_with_scratch_cleans_up_on_panic() {
    let harness = harness();
    let seen = Arc::new(Mutex::new(None));
    let recorder = Arc::clone(&seen);

    let outcome = std::panic::AssertUnwindSafe(harness.with_scratch(move |store| {
        async move {
            *recorder.lock().unwrap() = Some(store.name().to_string());
            assert!(store.name().is_empty(), "assertion failed inside test body");
            Ok(())
        }
        .boxed()
    }))
    .catch_unwind()
    .await;

    assert!(outcome.is_err());
    let name = seen.lock().unwrap().clone().unwrap();
    assert!(!harness.database_exists(&name).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_dropped_scratch_store_deletes_database() {
    let harness = harness();

    let store = harness.create_scratch(true).await.unwrap();
    let name = store.name().to_string();
    drop(store);

    assert!(!harness.database_exists(&name).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_delete_missing_database_succeeds() {
    let harness = harness();
    let name = harness.next_scratch_name();

    harness.delete_database(&name).await.unwrap();
    harness.delete_database(&name).await.unwrap();
    assert!(!harness.database_exists(&name).await.unwrap());
}

#[tokio::test]
#[ignore]
async fn test_script_stops_at_failing_batch() {
    let harness = harness();
    let name = harness.next_scratch_name();
    let script = script_file(
        "CREATE TABLE applied (id int);\nINSERT INTO applied VALUES (1);\nGO\n\
         INSERT INTO missing_table VALUES (1);\nGO\n\
         INSERT INTO applied VALUES (2);\n",
    );

    let err = harness
        .create_database(&name, Some(script.path()), false)
        .await
        .unwrap_err();
    let script_err = err.downcast_ref::<ScriptError>().unwrap();
    assert!(matches!(script_err, ScriptError::Database { batch: 2, .. }));

    let client = connect(&harness.connection_string_for(&name).unwrap()).await.unwrap();
    let row = client.query_one("SELECT COUNT(*) FROM applied", &[]).await.unwrap();
    assert_eq!(row.get::<_, i64>(0), 1);
    drop(client);

    harness.delete_database(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_script_recreates_database() {
    let harness = harness();
    let name = harness.next_scratch_name();
    let script = script_file("CREATE TABLE fresh (id int);\nGO\nINSERT INTO fresh VALUES (1);\n");

    harness.create_database(&name, None, false).await.unwrap();
    harness
        .create_database(&name, Some(script.path()), false)
        .await
        .unwrap();
    // Running the same script again only works if the database was recreated
    harness
        .create_database(&name, Some(script.path()), false)
        .await
        .unwrap();

    let client = connect(&harness.connection_string_for(&name).unwrap()).await.unwrap();
    let row = client.query_one("SELECT COUNT(*) FROM fresh", &[]).await.unwrap();
    assert_eq!(row.get::<_, i64>(0), 1);
    drop(client);

    harness.delete_database(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_script_batch_timeout() {
    let harness = harness_with(|config| config.script_timeout_secs = 1);
    let name = harness.next_scratch_name();
    let script = script_file("SELECT pg_sleep(5);\n");

    let err = harness
        .create_database(&name, Some(script.path()), false)
        .await
        .unwrap_err();
    match err.downcast_ref::<ScriptError>() {
        Some(ScriptError::Timeout { batch, timeout }) => {
            assert_eq!(*batch, 1);
            assert_eq!(*timeout, Duration::from_secs(1));
        }
        other => panic!("expected batch timeout, got {:?}", other),
    }

    harness.delete_database(&name).await.unwrap();
}

#[tokio::test]
#[ignore]
async fn test_purge_removes_leftover_scratch_databases() {
    let harness = harness_with(|config| config.scratch_prefix = "PurgeTest.".to_string());
    let leftover = harness.next_scratch_name();
    harness.create_database(&leftover, None, false).await.unwrap();

    let purged = harness.purge_scratch_databases().await.unwrap();
    assert!(purged.contains(&leftover));
    assert!(!harness.database_exists(&leftover).await.unwrap());
}

#[test]
#[ignore]
fn test_blocking_harness_shared_and_scratch() {
    init_test_logging();
    let harness = postgres_test_store::BlockingHarness::from_env().unwrap();

    let shared = harness
        .get_or_create_shared("IntegrationTest.BlockingShared", |init| {
            init.batch_execute(
                "DROP TABLE IF EXISTS widgets; CREATE TABLE widgets (id int); INSERT INTO widgets VALUES (7)",
            )
        })
        .unwrap();
    let ids: Vec<i32> = shared.query_column("SELECT id FROM widgets", &[]).unwrap();
    assert_eq!(ids, vec![7]);
    shared.dispose().unwrap();

    let scratch = harness.create_scratch(true).unwrap();
    let name = scratch.name().to_string();
    assert_eq!(scratch.query_scalar::<i32>("SELECT 1", &[]).unwrap(), 1);
    drop(scratch);
    assert!(!harness.database_exists(&name).unwrap());
}
