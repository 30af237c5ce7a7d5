//! CLI command implementations

pub mod backup;
pub mod delete;
pub mod list;
pub mod restore;
pub mod settings;
pub mod status;
pub mod sync;
pub mod verify;
