#![recursion_limit = "256"]
//! Retry-aware accessor for user comments stored in a ScyllaDB/Cassandra
//! table partitioned by media item.

pub mod config;
pub mod database;
pub mod errors;
pub mod metrics;
pub mod retry;
pub mod types;

pub use config::{DatabaseConfig, ObservabilityConfig, RetrySettings};
pub use database::{ClusterAccessor, CommentStore, CommentsTable};
pub use errors::{RetryError, StoreError};
pub use types::{Anchor, Comment, Page};
