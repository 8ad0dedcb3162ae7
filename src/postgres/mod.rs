// ABOUTME: PostgreSQL provider module
// ABOUTME: Exports connection strings, connection management, and the relational adapter

pub mod connection;
pub mod connection_string;
pub mod relational;
pub mod version;

pub(crate) use connection::explain_connect_error;
pub use connection::{connect, tls_connector};
pub use connection_string::ConnectionString;
pub use relational::{
    DbConnection, PgRelationalConnection, RelationalConnection, DEFAULT_ADMIN_DATABASE,
};
pub use version::{parse_server_version_num, server_version, ServerVersion};
