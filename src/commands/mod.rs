// ABOUTME: Maintenance command implementations for the CLI
// ABOUTME: Exports create, drop, status, and purge commands

pub mod create;
pub mod drop;
pub mod purge;
pub mod status;

pub use create::create;
pub use drop::drop_database;
pub use purge::purge;
pub use status::status;
