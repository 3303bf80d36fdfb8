use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::db::models::ThumbnailRecord;
use crate::db::ThumbnailStore;

/// Process-local store; thumbnails are forgotten on restart.
#[derive(Debug, Default)]
pub struct MemoryThumbnailStore {
    records: Mutex<HashMap<i64, ThumbnailRecord>>,
}

#[async_trait]
impl ThumbnailStore for MemoryThumbnailStore {
    async fn get(&self, user_id: i64) -> Result<Option<ThumbnailRecord>> {
        Ok(self.records.lock().get(&user_id).cloned())
    }

    async fn put(&self, record: ThumbnailRecord) -> Result<()> {
        self.records.lock().insert(record.user_id, record);
        Ok(())
    }

    async fn remove(&self, user_id: i64) -> Result<Option<ThumbnailRecord>> {
        Ok(self.records.lock().remove(&user_id))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.lock().len())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::exercise_store;

    #[tokio::test]
    async fn behaves_like_a_thumbnail_store() {
        exercise_store(&MemoryThumbnailStore::default()).await;
    }
}
