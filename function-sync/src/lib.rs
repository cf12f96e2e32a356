//! function-sync library
//!
//! Keeps a cloud function's deployed code package in sync with a local
//! directory: clone once, then watch and re-upload on change.

pub mod archive;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod remote;
pub mod utils;
pub mod watcher;

// Re-export commonly used types
pub use config::Config;
pub use engine::{EngineState, RetryPolicy, SyncEngine};
pub use utils::errors::SyncError;
pub type Result<T> = std::result::Result<T, SyncError>;
