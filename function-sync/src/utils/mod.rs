//! Utility modules for function-sync.

pub mod errors;
pub mod fs;
pub mod logger;

pub use errors::{Result, SyncError};
