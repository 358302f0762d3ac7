//! Forum API access and the queries built on it.

pub mod api_types;
pub mod client;
pub mod queries;
pub mod types;

pub use client::ForumClient;
