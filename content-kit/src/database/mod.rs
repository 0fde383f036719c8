pub mod comments;
pub mod connection;
pub mod query_builder;
pub mod retry;

pub use comments::{CommentStore, CommentsTable};
pub use connection::ClusterAccessor;
pub use query_builder::QueryBuilder;
pub use retry::RetryPolicy;
