#![recursion_limit = "256"]
//! Runs against a live node: `SCYLLA_URI=127.0.0.1:9042 cargo test -- --ignored`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, FixedOffset, TimeZone, Timelike, Utc};
use content_kit::metrics::ACTIVE_SESSIONS;
use content_kit::{
    Anchor, ClusterAccessor, Comment, CommentStore, CommentsTable, DatabaseConfig,
    RetrySettings, StoreError,
};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn test_config() -> DatabaseConfig {
    let uri = std::env::var("SCYLLA_URI").unwrap_or_else(|_| "127.0.0.1:9042".to_string());
    DatabaseConfig {
        hosts: vec![uri],
        keyspace: format!("tests_{}", Uuid::new_v4().simple()),
        ..Default::default()
    }
}

async fn setup() -> (Arc<ClusterAccessor>, CommentsTable) {
    let settings = RetrySettings::new(1, std::time::Duration::from_millis(150));
    let accessor = Arc::new(ClusterAccessor::new(&test_config(), settings).unwrap());
    let cancel = CancellationToken::new();
    accessor.create_keyspace(&cancel).await.unwrap();

    let comments = CommentsTable::new(accessor.clone());
    comments.create(&cancel).await.unwrap();
    // idempotent
    comments.create(&cancel).await.unwrap();
    (accessor, comments)
}

async fn insert_ten(comments: &CommentsTable, media: Uuid) -> Vec<Comment> {
    insert_many(comments, media, 10).await
}

async fn insert_many(comments: &CommentsTable, media: Uuid, count: i64) -> Vec<Comment> {
    let cancel = CancellationToken::new();
    let now = Utc::now();
    let mut data = Vec::new();
    for i in 0..count {
        let comment = Comment::new(Uuid::new_v4(), media, format!("{}. comment on this", i))
            .with_date(now + Duration::minutes(-100 + i));
        data.push(comments.insert(&cancel, comment).await.unwrap());
    }
    data
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB node"]
async fn insert_get_page_and_delete() {
    let (accessor, comments) = setup().await;
    let cancel = CancellationToken::new();
    let media = Uuid::new_v4();
    let data = insert_ten(&comments, media).await;

    for inserted in &data {
        assert_eq!(inserted.date.nanosecond(), 0);
        let loaded = comments.get(&cancel, inserted.comment_id).await.unwrap();
        assert_eq!(loaded.as_ref(), Some(inserted));
    }

    assert_eq!(comments.count(&cancel, media).await.unwrap(), 10);

    let page = comments.by_media_item(&cancel, media, 4, &Anchor::start()).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|c| c.comment_id).collect();
    assert_eq!(
        ids,
        vec![data[9].comment_id, data[8].comment_id, data[7].comment_id, data[6].comment_id]
    );
    assert!(!page.is_last());

    let page = comments.by_media_item(&cancel, media, 4, &page.next_anchor).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|c| c.comment_id).collect();
    assert_eq!(
        ids,
        vec![data[5].comment_id, data[4].comment_id, data[3].comment_id, data[2].comment_id]
    );
    assert!(!page.is_last());

    let page = comments.by_media_item(&cancel, media, 4, &page.next_anchor).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|c| c.comment_id).collect();
    assert_eq!(ids, vec![data[1].comment_id, data[0].comment_id]);
    assert!(page.is_last());

    for (i, inserted) in data.iter().enumerate() {
        comments.delete(&cancel, inserted.comment_id).await.unwrap();
        assert_eq!(comments.count(&cancel, media).await.unwrap(), (data.len() - (i + 1)) as u64);
        assert!(comments.get(&cancel, inserted.comment_id).await.unwrap().is_none());
    }

    let page = comments.by_media_item(&cancel, media, 4, &Anchor::start()).await.unwrap();
    assert!(page.items.is_empty());
    assert!(page.is_last());

    accessor.drop_keyspace(&cancel).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB node"]
async fn chained_pages_cover_partition_in_order() {
    let (accessor, comments) = setup().await;
    let cancel = CancellationToken::new();
    let media = Uuid::new_v4();
    insert_ten(&comments, media).await;
    // another partition must not leak into the scan
    insert_ten(&comments, Uuid::new_v4()).await;

    let mut anchor = Anchor::start();
    let mut seen = Vec::new();
    loop {
        let page = comments.by_media_item(&cancel, media, 3, &anchor).await.unwrap();
        seen.extend(page.items);
        if page.next_anchor.is_empty() {
            break;
        }
        anchor = page.next_anchor;
    }

    assert_eq!(seen.len(), 10);
    assert!(seen.iter().all(|c| c.media_item_id == media));
    assert!(seen.windows(2).all(|pair| pair[0].date > pair[1].date));

    accessor.drop_keyspace(&cancel).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB node"]
async fn exact_multiple_of_page_size_ends_without_duplicates() {
    let (accessor, comments) = setup().await;
    let cancel = CancellationToken::new();
    let media = Uuid::new_v4();
    let data = insert_many(&comments, media, 8).await;

    // the driver may hand out one more anchor that yields an empty page
    let mut anchor = Anchor::start();
    let mut seen = Vec::new();
    let mut calls = 0;
    loop {
        let page = comments.by_media_item(&cancel, media, 4, &anchor).await.unwrap();
        calls += 1;
        assert!(page.items.len() <= 4);
        seen.extend(page.items);
        if page.next_anchor.is_empty() {
            break;
        }
        assert!(calls <= 3, "paging did not terminate");
        anchor = page.next_anchor;
    }

    let ids: HashSet<_> = seen.iter().map(|c| c.comment_id).collect();
    assert_eq!(seen.len(), 8);
    assert_eq!(ids.len(), 8);
    assert_eq!(ids, data.iter().map(|c| c.comment_id).collect::<HashSet<_>>());
    assert!(seen.windows(2).all(|pair| pair[0].date > pair[1].date));

    accessor.drop_keyspace(&cancel).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB node"]
async fn failed_session_callback_releases_lease() {
    let (accessor, _comments) = setup().await;
    let cancel = CancellationToken::new();
    let gauge = ACTIVE_SESSIONS.with_label_values(&[accessor.keyspace()]);
    let before = gauge.get();
    let missing = Uuid::new_v4();

    let result: Result<(), StoreError> = accessor
        .with_session(&cancel, |_session| async move { Err(StoreError::NotFound(missing)) })
        .await;

    assert!(matches!(result, Err(StoreError::NotFound(id)) if id == missing));
    assert_eq!(gauge.get(), before);

    accessor.drop_keyspace(&cancel).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB node"]
async fn insert_normalizes_offset_and_subsecond_dates() {
    let (accessor, comments) = setup().await;
    let cancel = CancellationToken::new();

    let offset = FixedOffset::east_opt(9 * 3600).unwrap();
    let local = offset.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap() + Duration::milliseconds(600);
    let comment = Comment::new(Uuid::new_v4(), Uuid::new_v4(), "late night").with_date(local);

    let stored = comments.insert(&cancel, comment).await.unwrap();
    assert_eq!(stored.date, Utc.with_ymd_and_hms(2024, 2, 29, 15, 0, 0).unwrap());

    let loaded = comments.get(&cancel, stored.comment_id).await.unwrap().unwrap();
    assert_eq!(loaded, stored);

    accessor.drop_keyspace(&cancel).await.unwrap();
}

#[tokio::test]
#[ignore = "requires a running ScyllaDB node"]
async fn missing_comment_signals() {
    let (accessor, comments) = setup().await;
    let cancel = CancellationToken::new();
    let missing = Uuid::new_v4();

    assert!(comments.get(&cancel, missing).await.unwrap().is_none());
    assert!(matches!(
        comments.delete(&cancel, missing).await,
        Err(StoreError::NotFound(id)) if id == missing
    ));
    assert!(matches!(
        comments.by_media_item(&cancel, missing, 0, &Anchor::start()).await,
        Err(StoreError::InvalidArgument(_))
    ));

    accessor.drop_keyspace(&cancel).await.unwrap();
}
