use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRecord {
    pub user_id: i64,
    pub file_path: PathBuf,
    pub file_unique_id: String,
    pub updated_at: DateTime<Utc>,
}

impl ThumbnailRecord {
    pub fn new(user_id: i64, file_path: PathBuf, file_unique_id: impl Into<String>) -> Self {
        ThumbnailRecord {
            user_id,
            file_path,
            file_unique_id: file_unique_id.into(),
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ThumbnailRow {
    pub user_id: i64,
    pub file_path: String,
    pub file_unique_id: String,
    pub updated_at: DateTime<Utc>,
}

impl From<ThumbnailRow> for ThumbnailRecord {
    fn from(row: ThumbnailRow) -> Self {
        ThumbnailRecord {
            user_id: row.user_id,
            file_path: PathBuf::from(row.file_path),
            file_unique_id: row.file_unique_id,
            updated_at: row.updated_at,
        }
    }
}
