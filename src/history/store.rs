//! History database operations

use sqlx::SqlitePool;

use super::HistoryItem;
use crate::error::Result;

/// History repository
pub struct HistoryRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> HistoryRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, item: &HistoryItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO history_items
                (id, user_id, file_name, file_url, file_type, file_size, tool_type, storage_path, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&item.id)
        .bind(&item.user_id)
        .bind(&item.file_name)
        .bind(&item.file_url)
        .bind(&item.file_type)
        .bind(item.file_size)
        .bind(&item.tool_type)
        .bind(&item.storage_path)
        .bind(&item.created_at)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// All items for a user, newest first
    pub async fn list(&self, user_id: &str) -> Result<Vec<HistoryItem>> {
        let items = sqlx::query_as::<_, HistoryItem>(
            r#"
            SELECT id, user_id, file_name, file_url, file_type, file_size,
                   tool_type, storage_path, created_at
            FROM history_items
            WHERE user_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }

    /// Delete one item, returning the removed row
    pub async fn delete(&self, user_id: &str, id: &str) -> Result<Option<HistoryItem>> {
        let item = sqlx::query_as::<_, HistoryItem>(
            r#"
            DELETE FROM history_items
            WHERE user_id = ? AND id = ?
            RETURNING id, user_id, file_name, file_url, file_type, file_size,
                      tool_type, storage_path, created_at
            "#,
        )
        .bind(user_id)
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(item)
    }

    /// Delete items created before `cutoff` (RFC 3339), returning them
    pub async fn delete_older_than(&self, user_id: &str, cutoff: &str) -> Result<Vec<HistoryItem>> {
        let items = sqlx::query_as::<_, HistoryItem>(
            r#"
            DELETE FROM history_items
            WHERE user_id = ? AND created_at < ?
            RETURNING id, user_id, file_name, file_url, file_type, file_size,
                      tool_type, storage_path, created_at
            "#,
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(self.pool)
        .await?;

        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;
    use chrono::{Duration, TimeZone, Utc};

    fn item(user: &str, name: &str, created_at: chrono::DateTime<Utc>) -> HistoryItem {
        HistoryItem::new(user, name, "application/pdf", 1024, "merge", "https://cdn/x", created_at)
    }

    #[tokio::test]
    async fn test_list_newest_first_and_scoped_to_user() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = HistoryRepository::new(&pool);
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap();

        repo.insert(&item("u1", "old.pdf", t0)).await.unwrap();
        repo.insert(&item("u1", "new.pdf", t0 + Duration::hours(1))).await.unwrap();
        repo.insert(&item("u2", "other.pdf", t0)).await.unwrap();

        let names: Vec<String> = repo.list("u1").await.unwrap().into_iter().map(|i| i.file_name).collect();
        assert_eq!(names, vec!["new.pdf", "old.pdf"]);
    }

    #[tokio::test]
    async fn test_delete_is_scoped() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = HistoryRepository::new(&pool);
        let entry = item("u1", "a.pdf", Utc::now());
        repo.insert(&entry).await.unwrap();

        assert!(repo.delete("u2", &entry.id).await.unwrap().is_none());
        let removed = repo.delete("u1", &entry.id).await.unwrap().unwrap();
        assert_eq!(removed.storage_path, entry.storage_path);
        assert!(repo.list("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let repo = HistoryRepository::new(&pool);
        let now = Utc.with_ymd_and_hms(2025, 5, 10, 0, 0, 0).unwrap();

        repo.insert(&item("u1", "stale.pdf", now - Duration::days(8))).await.unwrap();
        repo.insert(&item("u1", "fresh.pdf", now - Duration::days(2))).await.unwrap();

        let cutoff = (now - Duration::days(7)).to_rfc3339();
        let removed = repo.delete_older_than("u1", &cutoff).await.unwrap();

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].file_name, "stale.pdf");
        assert_eq!(repo.list("u1").await.unwrap().len(), 1);
    }
}
