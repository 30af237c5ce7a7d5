//! # tally-core
//!
//! Core library for the Tally backup subsystem providing:
//! - Shared error types for store, snapshot, and remote operations
//! - Retry execution engine with policy-based configuration
//! - Common utilities (data directory resolution, byte formatting)

pub mod error;
pub mod retry;
pub mod types;
pub mod utils;

pub use error::{Error, Result};
pub use types::{RetryPolicy, RetryStrategy};
pub use utils::{data_dir, human_bytes};
