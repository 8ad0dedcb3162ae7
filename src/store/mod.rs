// ABOUTME: Ephemeral database lifecycle module
// ABOUTME: Exports admin DDL, scratch naming, shared registry, scripts, and the store handle

pub mod admin;
pub mod ddl;
pub mod naming;
pub mod registry;
pub mod script;
pub mod test_store;

pub use admin::{DatabaseAdmin, RolePrivileges};
pub use naming::ScratchNamer;
pub use registry::SharedRegistry;
pub use script::{execute_batches, read_script, resolve_script_path, split_batches};
pub use test_store::{StoreMode, StoreState, TestStore};
