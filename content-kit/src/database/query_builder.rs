pub const TABLE_COMMENTS: &str = "comments";
pub const COLUMN_COMMENT_ID: &str = "comment_id";
pub const COLUMN_USER_ID: &str = "user_id";
pub const COLUMN_MEDIA_ITEM_ID: &str = "media_item_id";
pub const COLUMN_CONTENT: &str = "content";
pub const COLUMN_DATE: &str = "date";

/// Selected columns, in the order `CommentRow` decodes them.
pub const COMMENT_COLUMNS: [&str; 5] = [
    COLUMN_COMMENT_ID,
    COLUMN_USER_ID,
    COLUMN_MEDIA_ITEM_ID,
    COLUMN_CONTENT,
    COLUMN_DATE,
];

pub struct QueryBuilder;

impl QueryBuilder {
    /// Single-node keyspace used for bootstrap and tests.
    pub fn build_create_keyspace(keyspace: &str) -> String {
        format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
            keyspace
        )
    }

    pub fn build_drop_keyspace(keyspace: &str) -> String {
        format!("DROP KEYSPACE IF EXISTS {}", keyspace)
    }

    pub fn build_create_comments_table(keyspace: &str) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {}.{} (\
             {} uuid, {} uuid, {} uuid, \"{}\" text, \"{}\" timestamp, \
             PRIMARY KEY ({}, \"{}\")\
             ) WITH CLUSTERING ORDER BY (\"{}\" DESC)",
            keyspace,
            TABLE_COMMENTS,
            COLUMN_COMMENT_ID,
            COLUMN_MEDIA_ITEM_ID,
            COLUMN_USER_ID,
            COLUMN_CONTENT,
            COLUMN_DATE,
            COLUMN_MEDIA_ITEM_ID,
            COLUMN_DATE,
            COLUMN_DATE
        )
    }

    pub fn build_insert_comment(keyspace: &str) -> String {
        format!(
            "INSERT INTO {}.{} ({}) VALUES (?, ?, ?, ?, ?)",
            keyspace,
            TABLE_COMMENTS,
            Self::column_list()
        )
    }

    /// Lookup by id without the partition key.
    pub fn build_select_comment_by_id(keyspace: &str) -> String {
        format!(
            "SELECT {} FROM {}.{} WHERE {} = ? LIMIT 1 ALLOW FILTERING",
            Self::column_list(),
            keyspace,
            TABLE_COMMENTS,
            COLUMN_COMMENT_ID
        )
    }

    pub fn build_select_comments_by_media_item(keyspace: &str) -> String {
        format!(
            "SELECT {} FROM {}.{} WHERE {} = ?",
            Self::column_list(),
            keyspace,
            TABLE_COMMENTS,
            COLUMN_MEDIA_ITEM_ID
        )
    }

    /// Delete keyed by the full primary key (partition + clustering).
    pub fn build_delete_comment(keyspace: &str) -> String {
        format!(
            "DELETE FROM {}.{} WHERE {} = ? AND \"{}\" = ?",
            keyspace, TABLE_COMMENTS, COLUMN_MEDIA_ITEM_ID, COLUMN_DATE
        )
    }

    pub fn build_count_comments(keyspace: &str) -> String {
        format!(
            "SELECT COUNT(*) FROM {}.{} WHERE {} = ?",
            keyspace, TABLE_COMMENTS, COLUMN_MEDIA_ITEM_ID
        )
    }

    fn column_list() -> String {
        COMMENT_COLUMNS
            .iter()
            .map(|column| format!("\"{}\"", column))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_create_keyspace() {
        let query = QueryBuilder::build_create_keyspace("tests");
        assert!(query.starts_with("CREATE KEYSPACE IF NOT EXISTS tests"));
        assert!(query.contains("'replication_factor': 1"));
    }

    #[test]
    fn test_build_create_comments_table() {
        let query = QueryBuilder::build_create_comments_table("tests");
        assert!(query.contains("CREATE TABLE IF NOT EXISTS tests.comments"));
        assert!(query.contains("PRIMARY KEY (media_item_id, \"date\")"));
        assert!(query.contains("CLUSTERING ORDER BY (\"date\" DESC)"));
    }

    #[test]
    fn test_build_insert_comment() {
        let query = QueryBuilder::build_insert_comment("tests");
        assert_eq!(
            query,
            "INSERT INTO tests.comments (\"comment_id\", \"user_id\", \"media_item_id\", \"content\", \"date\") VALUES (?, ?, ?, ?, ?)"
        );
    }

    #[test]
    fn test_build_select_comment_by_id() {
        let query = QueryBuilder::build_select_comment_by_id("tests");
        assert!(query.contains("WHERE comment_id = ?"));
        assert!(query.ends_with("LIMIT 1 ALLOW FILTERING"));
    }

    #[test]
    fn test_build_delete_uses_primary_key() {
        let query = QueryBuilder::build_delete_comment("tests");
        assert_eq!(
            query,
            "DELETE FROM tests.comments WHERE media_item_id = ? AND \"date\" = ?"
        );
    }

    #[test]
    fn test_build_count_comments() {
        let query = QueryBuilder::build_count_comments("tests");
        assert_eq!(
            query,
            "SELECT COUNT(*) FROM tests.comments WHERE media_item_id = ?"
        );
    }
}
