use anyhow::Result;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

use crate::db::models::{ThumbnailRecord, ThumbnailRow};
use crate::db::ThumbnailStore;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn init(database_url: &str) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS thumbnails (\
                user_id INTEGER PRIMARY KEY,\
                file_path TEXT NOT NULL,\
                file_unique_id TEXT NOT NULL,\
                updated_at TEXT NOT NULL\
            );",
        )
        .execute(&pool)
        .await?;

        info!("Database tables created successfully");
        Ok(Database { pool })
    }
}

#[async_trait]
impl ThumbnailStore for Database {
    async fn get(&self, user_id: i64) -> Result<Option<ThumbnailRecord>> {
        let row = sqlx::query_as::<_, ThumbnailRow>(
            "SELECT user_id, file_path, file_unique_id, updated_at FROM thumbnails WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(ThumbnailRecord::from))
    }

    async fn put(&self, record: ThumbnailRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO thumbnails (user_id, file_path, file_unique_id, updated_at) \
             VALUES (?, ?, ?, ?) \
             ON CONFLICT(user_id) DO UPDATE SET \
                file_path = excluded.file_path,\
                file_unique_id = excluded.file_unique_id,\
                updated_at = excluded.updated_at",
        )
        .bind(record.user_id)
        .bind(record.file_path.to_string_lossy().into_owned())
        .bind(record.file_unique_id)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, user_id: i64) -> Result<Option<ThumbnailRecord>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, ThumbnailRow>(
            "SELECT user_id, file_path, file_unique_id, updated_at FROM thumbnails WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if row.is_some() {
            sqlx::query("DELETE FROM thumbnails WHERE user_id = ?")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(row.map(ThumbnailRecord::from))
    }

    async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM thumbnails")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::exercise_store;

    #[tokio::test]
    async fn behaves_like_a_thumbnail_store() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("thumbs.db").display());
        let db = Database::init(&url).await.unwrap();
        exercise_store(&db).await;
        db.close().await;
    }

    #[tokio::test]
    async fn records_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("thumbs.db").display());

        let db = Database::init(&url).await.unwrap();
        db.put(ThumbnailRecord::new(
            42,
            std::path::PathBuf::from("thumbnails/42.jpg"),
            "uniq",
        ))
        .await
        .unwrap();
        db.close().await;

        let reopened = Database::init(&url).await.unwrap();
        let record = reopened.get(42).await.unwrap().unwrap();
        assert_eq!(record.file_unique_id, "uniq");
        reopened.close().await;
    }
}
