use chrono::{DateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user comment attached to a media item.
///
/// `media_item_id` is the partition key and `date` the clustering key
/// (newest first).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: Uuid,
    pub user_id: Uuid,
    pub media_item_id: Uuid,
    pub content: String,
    pub date: DateTime<Utc>,
}

impl Comment {
    /// New comment with a random id, dated now.
    pub fn new(user_id: Uuid, media_item_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            comment_id: Uuid::new_v4(),
            user_id,
            media_item_id,
            content: content.into(),
            date: Utc::now(),
        }
    }

    pub fn with_date<Tz: TimeZone>(mut self, date: DateTime<Tz>) -> Self {
        self.date = date.with_timezone(&Utc);
        self
    }

    /// Copy of the comment with `date` in UTC whole seconds.
    pub fn normalized(mut self) -> Self {
        self.date = normalize_date(self.date);
        self
    }
}

/// Converts to UTC and rounds to the nearest second, half a second rounding up.
pub fn normalize_date<Tz: TimeZone>(date: DateTime<Tz>) -> DateTime<Utc> {
    date.with_timezone(&Utc).round_subsecs(0)
}

/// Opaque continuation token for a partition scan.
///
/// The bytes belong to the storage driver. An empty anchor starts a scan from
/// the newest row, and an empty `next_anchor` marks the last page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor(Vec<u8>);

impl Anchor {
    pub fn start() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

impl From<Vec<u8>> for Anchor {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Anchor {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// One page of a partition scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_anchor: Anchor,
}

impl<T> Page<T> {
    pub fn is_last(&self) -> bool {
        self.next_anchor.is_empty()
    }
}
