// content-kit/src/database/comments.rs
//
// Comments table: partition key media_item_id, clustering key "date" DESC.
//

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::frame::value::CqlTimestamp;
use scylla::query::Query;
use scylla::statement::{PagingState, PagingStateResponse};
use scylla::FromRow;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::connection::ClusterAccessor;
use super::query_builder::{QueryBuilder, TABLE_COMMENTS};
use crate::errors::StoreError;
use crate::metrics;
use crate::types::{Anchor, Comment, Page};

/// Narrow interface the service layer uses to persist and read comments.
///
/// Contract signals: `get` returns `Ok(None)` for an unknown id, `delete`
/// returns [`StoreError::NotFound`] for an unknown id, and a page whose
/// `next_anchor` is empty is the last one.
#[async_trait]
pub trait CommentStore: Send + Sync {
    async fn create(&self, cancel: &CancellationToken) -> Result<(), StoreError>;

    async fn insert(&self, cancel: &CancellationToken, comment: Comment)
        -> Result<Comment, StoreError>;

    async fn get(&self, cancel: &CancellationToken, id: Uuid)
        -> Result<Option<Comment>, StoreError>;

    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<(), StoreError>;

    async fn by_media_item(
        &self,
        cancel: &CancellationToken,
        media_item_id: Uuid,
        page_size: i32,
        anchor: &Anchor,
    ) -> Result<Page<Comment>, StoreError>;

    async fn count(&self, cancel: &CancellationToken, media_item_id: Uuid)
        -> Result<u64, StoreError>;
}

/// Column order matches `QueryBuilder`'s select list.
#[derive(Debug, FromRow)]
struct CommentRow {
    comment_id: Uuid,
    user_id: Uuid,
    media_item_id: Uuid,
    content: String,
    date: CqlTimestamp,
}

impl TryFrom<CommentRow> for Comment {
    type Error = StoreError;

    fn try_from(row: CommentRow) -> Result<Self, Self::Error> {
        let date = DateTime::<Utc>::from_timestamp_millis(row.date.0).ok_or_else(|| {
            StoreError::RowMapping(format!(
                "timestamp {} of comment {} is out of range",
                row.date.0, row.comment_id
            ))
        })?;

        Ok(Comment {
            comment_id: row.comment_id,
            user_id: row.user_id,
            media_item_id: row.media_item_id,
            content: row.content,
            date,
        })
    }
}

fn to_cql_timestamp(date: &DateTime<Utc>) -> CqlTimestamp {
    CqlTimestamp(date.timestamp_millis())
}

fn paging_state(anchor: &Anchor) -> PagingState {
    if anchor.is_empty() {
        PagingState::start()
    } else {
        PagingState::new_from_raw_bytes(anchor.as_bytes())
    }
}

fn anchor_from_response(response: PagingStateResponse) -> Anchor {
    match response {
        PagingStateResponse::HasMorePages { state } => state
            .as_bytes_slice()
            .map(|bytes| Anchor::from(&bytes[..]))
            .unwrap_or_default(),
        PagingStateResponse::NoMorePages => Anchor::start(),
    }
}

async fn timed<T, Fut>(operation: &str, fut: Fut) -> Result<T, StoreError>
where
    Fut: Future<Output = Result<T, StoreError>>,
{
    let start = Instant::now();
    let result = fut.await;
    metrics::record_operation(
        operation,
        TABLE_COMMENTS,
        result.is_ok(),
        start.elapsed().as_secs_f64(),
    );
    result
}

/// The `comments` table of one keyspace, behind [`CommentStore`].
///
/// Every call leases the accessor's shared session for its own duration and
/// sends its statements under the accessor's backoff policy.
pub struct CommentsTable {
    accessor: Arc<ClusterAccessor>,
}

impl CommentsTable {
    /// The table lives in `accessor`'s keyspace. Nothing is sent until the
    /// first call.
    pub fn new(accessor: Arc<ClusterAccessor>) -> Self {
        Self { accessor }
    }

    pub fn accessor(&self) -> &ClusterAccessor {
        &self.accessor
    }

    fn keyspace(&self) -> &str {
        self.accessor.keyspace()
    }

    /// `CREATE TABLE IF NOT EXISTS`; safe to call on every start.
    async fn create_table(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        let cql = QueryBuilder::build_create_comments_table(self.keyspace());
        self.accessor.execute_ddl(cancel, "create_table", cql).await?;
        info!("Table {}.{} is ready", self.keyspace(), TABLE_COMMENTS);
        Ok(())
    }

    /// Writes `comment` with its date rounded to whole UTC seconds and returns
    /// the record as stored. An existing row with the same media item and
    /// second is overwritten.
    async fn insert_comment(
        &self,
        cancel: &CancellationToken,
        comment: Comment,
    ) -> Result<Comment, StoreError> {
        // The clustering key is written from the normalized date, so the
        // returned record always matches the stored one.
        let comment = comment.normalized();
        let cql = QueryBuilder::build_insert_comment(self.keyspace());

        let values = (
            comment.comment_id,
            comment.user_id,
            comment.media_item_id,
            comment.content.clone(),
            to_cql_timestamp(&comment.date),
        );

        self.accessor
            .with_session(cancel, |session| async move {
                self.accessor
                    .run_statement(cancel, "insert", || {
                        let session = session.clone();
                        let cql = cql.clone();
                        let values = values.clone();
                        async move {
                            session.query_unpaged(cql, values).await?;
                            Ok::<_, StoreError>(())
                        }
                    })
                    .await
            })
            .await?;

        debug!(
            "Inserted comment {} into media item {}",
            comment.comment_id, comment.media_item_id
        );
        Ok(comment)
    }

    /// Looks a comment up by id alone. Without an index on `comment_id` this
    /// is a filtered scan. An unknown id is `Ok(None)`.
    async fn get_comment(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
    ) -> Result<Option<Comment>, StoreError> {
        let cql = QueryBuilder::build_select_comment_by_id(self.keyspace());

        let row = self
            .accessor
            .with_session(cancel, |session| async move {
                self.accessor
                    .run_statement(cancel, "get", || {
                        let session = session.clone();
                        let cql = cql.clone();
                        async move {
                            let result = session.query_unpaged(cql, (id,)).await?;
                            result
                                .maybe_first_row_typed::<CommentRow>()
                                .map_err(|e| StoreError::RowMapping(e.to_string()))
                        }
                    })
                    .await
            })
            .await?;

        row.map(Comment::try_from).transpose()
    }

    /// Resolves the comment first to learn its primary key, then deletes it.
    /// An unknown id is [`StoreError::NotFound`].
    async fn delete_comment(&self, cancel: &CancellationToken, id: Uuid) -> Result<(), StoreError> {
        // Not atomic with the lookup. If the row disappears in between, the
        // delete below is a no-op.
        let comment = match self.get_comment(cancel, id).await? {
            Some(comment) => comment,
            None => {
                warn!("Cannot delete comment {}: not found", id);
                return Err(StoreError::NotFound(id));
            }
        };
        let cql = QueryBuilder::build_delete_comment(self.keyspace());
        let key = (comment.media_item_id, to_cql_timestamp(&comment.date));

        self.accessor
            .with_session(cancel, |session| async move {
                self.accessor
                    .run_statement(cancel, "delete", || {
                        let session = session.clone();
                        let cql = cql.clone();
                        async move {
                            session.query_unpaged(cql, key).await?;
                            Ok::<_, StoreError>(())
                        }
                    })
                    .await
            })
            .await?;

        debug!("Deleted comment {} from media item {}", id, comment.media_item_id);
        Ok(())
    }

    /// One page of a media item's comments, newest first.
    ///
    /// `anchor` is the `next_anchor` of the previous page, or empty to start
    /// at the newest comment. The returned `next_anchor` is empty once the
    /// driver reports no more pages. A partition whose size is an exact
    /// multiple of `page_size` may end with one extra, empty page.
    async fn comments_page(
        &self,
        cancel: &CancellationToken,
        media_item_id: Uuid,
        page_size: i32,
        anchor: &Anchor,
    ) -> Result<Page<Comment>, StoreError> {
        if page_size <= 0 {
            return Err(StoreError::InvalidArgument(format!(
                "page size must be positive, got {}",
                page_size
            )));
        }

        let mut query = Query::new(QueryBuilder::build_select_comments_by_media_item(
            self.keyspace(),
        ));
        query.set_page_size(page_size);

        let (rows, next_anchor) = self
            .accessor
            .with_session(cancel, |session| async move {
                self.accessor
                    .run_statement(cancel, "by_media_item", || {
                        let session = session.clone();
                        let query = query.clone();
                        let state = paging_state(anchor);
                        async move {
                            let (result, response) = session
                                .query_single_page(query, (media_item_id,), state)
                                .await?;
                            let rows = result
                                .rows_typed_or_empty::<CommentRow>()
                                .collect::<Result<Vec<_>, _>>()
                                .map_err(|e| StoreError::RowMapping(e.to_string()))?;
                            Ok::<_, StoreError>((rows, anchor_from_response(response)))
                        }
                    })
                    .await
            })
            .await?;

        let items = rows
            .into_iter()
            .map(Comment::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(
            "Fetched {} comments of media item {} (last page: {})",
            items.len(),
            media_item_id,
            next_anchor.is_empty()
        );
        Ok(Page { items, next_anchor })
    }

    async fn count_comments(
        &self,
        cancel: &CancellationToken,
        media_item_id: Uuid,
    ) -> Result<u64, StoreError> {
        let cql = QueryBuilder::build_count_comments(self.keyspace());

        let (count,) = self
            .accessor
            .with_session(cancel, |session| async move {
                self.accessor
                    .run_statement(cancel, "count", || {
                        let session = session.clone();
                        let cql = cql.clone();
                        async move {
                            let result = session.query_unpaged(cql, (media_item_id,)).await?;
                            result
                                .single_row_typed::<(i64,)>()
                                .map_err(|e| StoreError::RowMapping(e.to_string()))
                        }
                    })
                    .await
            })
            .await?;

        u64::try_from(count)
            .map_err(|_| StoreError::RowMapping(format!("negative count: {}", count)))
    }
}

#[async_trait]
impl CommentStore for CommentsTable {
    async fn create(&self, cancel: &CancellationToken) -> Result<(), StoreError> {
        timed("create", self.create_table(cancel)).await
    }

    async fn insert(
        &self,
        cancel: &CancellationToken,
        comment: Comment,
    ) -> Result<Comment, StoreError> {
        timed("insert", self.insert_comment(cancel, comment)).await
    }

    async fn get(
        &self,
        cancel: &CancellationToken,
        id: Uuid,
    ) -> Result<Option<Comment>, StoreError> {
        timed("get", self.get_comment(cancel, id)).await
    }

    async fn delete(&self, cancel: &CancellationToken, id: Uuid) -> Result<(), StoreError> {
        timed("delete", self.delete_comment(cancel, id)).await
    }

    async fn by_media_item(
        &self,
        cancel: &CancellationToken,
        media_item_id: Uuid,
        page_size: i32,
        anchor: &Anchor,
    ) -> Result<Page<Comment>, StoreError> {
        timed(
            "by_media_item",
            self.comments_page(cancel, media_item_id, page_size, anchor),
        )
        .await
    }

    async fn count(
        &self,
        cancel: &CancellationToken,
        media_item_id: Uuid,
    ) -> Result<u64, StoreError> {
        timed("count", self.count_comments(cancel, media_item_id)).await
    }
}
