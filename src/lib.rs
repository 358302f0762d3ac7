//! Offline-first paginated query cache for a discussion-forum reader.

pub mod config;
pub mod forum;
pub mod logging;
pub mod persist;
pub mod query;
