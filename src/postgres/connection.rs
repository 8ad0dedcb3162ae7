// ABOUTME: PostgreSQL connection utilities for test stores and admin sessions
// ABOUTME: Handles TLS setup, connect error translation, and connection task lifecycle

use super::ConnectionString;
use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::Client;

/// Build the TLS connector used for every connection
///
/// Servers without TLS still work: the driver's default `sslmode=prefer`
/// falls back to plaintext when the server declines.
pub fn tls_connector() -> Result<MakeTlsConnector> {
    let tls_connector = TlsConnector::builder()
        .danger_accept_invalid_certs(false)
        .build()
        .context("Failed to build TLS connector")?;
    Ok(MakeTlsConnector::new(tls_connector))
}

/// Open a direct (unpooled) connection to the database named by `connection_string`
pub async fn connect(connection_string: &ConnectionString) -> Result<Client> {
    let config = connection_string.driver_config()?;
    let tls = tls_connector()?;

    let (client, connection) = config
        .connect(tls)
        .await
        .map_err(|e| explain_connect_error(&e.to_string()))?;

    // Spawn connection handler
    let database = connection_string.database().unwrap_or("<default>").to_string();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(database = %database, "Connection error: {}", e);
        }
    });

    Ok(client)
}

/// Rewrite a driver connect failure into an actionable message
pub(crate) fn explain_connect_error(error_msg: &str) -> anyhow::Error {
    if error_msg.contains("password authentication failed") {
        anyhow::anyhow!(
            "Authentication failed for the test store role.\n\
             Check the credentials in TEST_DATABASE_URL or `connection_string` in the store config."
        )
    } else if error_msg.contains("database") && error_msg.contains("does not exist") {
        anyhow::anyhow!(
            "Database does not exist: {}\n\
             Shared stores are created on first use; scratch stores opened without \
             database creation must be created by the caller.",
            error_msg
        )
    } else if error_msg.contains("Connection refused") || error_msg.contains("could not connect") {
        anyhow::anyhow!(
            "Connection refused: no PostgreSQL server at the configured host and port.\n\
             Start the server or point TEST_DATABASE_URL at a running one.\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("timeout") || error_msg.contains("timed out") {
        anyhow::anyhow!(
            "Connection timeout: the server did not answer in time.\n\
             Raise `connect_timeout` in the connection string or `command_timeout_secs` \
             in the store config.\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("SSL") || error_msg.contains("TLS") {
        anyhow::anyhow!(
            "TLS negotiation failed.\n\
             Local test servers usually need `sslmode=disable` (or `prefer`) in the \
             connection string.\n\
             Error: {}",
            error_msg
        )
    } else if error_msg.contains("no pg_hba.conf entry") {
        anyhow::anyhow!(
            "Access denied by pg_hba.conf for the test store role.\n\
             The role must be allowed to reach both the admin database and the test databases.\n\
             Error: {}",
            error_msg
        )
    } else {
        anyhow::anyhow!("Failed to connect to test database: {}", error_msg)
    }
}
