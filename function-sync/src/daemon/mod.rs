//! Process lifecycle for the watch mode.

pub mod shutdown;
