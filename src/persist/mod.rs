//! Persistence of successful query results across restarts.
//!
//! Entries live in memory for up to a day; persisting them lets a restarted
//! reader show the last known lists immediately while it refetches.

mod layer;
mod storage;

pub use layer::PersistLayer;
pub use storage::{NoopPersister, Persister, SqlitePersister};
