//! Per-user thumbnail bookkeeping.
//!
//! Handlers only see [`ThumbnailStore`]; which backend sits behind it is a
//! configuration choice (`THUMBNAIL_STORE`).

pub mod database;
pub mod json_store;
pub mod memory;
pub mod models;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::{Config, ThumbnailStoreKind};
use database::Database;
use json_store::JsonThumbnailStore;
use memory::MemoryThumbnailStore;
use models::ThumbnailRecord;

#[async_trait]
pub trait ThumbnailStore: Send + Sync {
    async fn get(&self, user_id: i64) -> Result<Option<ThumbnailRecord>>;

    /// Inserts or replaces the record for `record.user_id`.
    async fn put(&self, record: ThumbnailRecord) -> Result<()>;

    /// Returns the removed record, if there was one.
    async fn remove(&self, user_id: i64) -> Result<Option<ThumbnailRecord>>;

    async fn count(&self) -> Result<usize>;

    fn backend(&self) -> &'static str;

    async fn close(&self) {}
}

pub async fn open_store(config: &Config) -> Result<Arc<dyn ThumbnailStore>> {
    let store: Arc<dyn ThumbnailStore> = match config.thumbnail_store {
        ThumbnailStoreKind::Sqlite => Arc::new(Database::init(&config.database_url).await?),
        ThumbnailStoreKind::Json => {
            Arc::new(JsonThumbnailStore::open(&config.thumbnail_json_path).await?)
        }
        ThumbnailStoreKind::Memory => Arc::new(MemoryThumbnailStore::default()),
    };
    info!("Thumbnail store backend: {}", store.backend());
    Ok(store)
}

#[cfg(test)]
pub(crate) async fn exercise_store(store: &dyn ThumbnailStore) {
    use std::path::PathBuf;

    assert_eq!(store.count().await.unwrap(), 0);
    assert!(store.get(7).await.unwrap().is_none());
    assert!(store.remove(7).await.unwrap().is_none());

    let first = ThumbnailRecord::new(7, PathBuf::from("thumbnails/7.jpg"), "uniq-a");
    store.put(first.clone()).await.unwrap();
    let loaded = store.get(7).await.unwrap().unwrap();
    assert_eq!(loaded.file_path, first.file_path);
    assert_eq!(loaded.file_unique_id, "uniq-a");

    let replacement = ThumbnailRecord::new(7, PathBuf::from("thumbnails/7.jpg"), "uniq-b");
    store.put(replacement).await.unwrap();
    store
        .put(ThumbnailRecord::new(8, PathBuf::from("thumbnails/8.jpg"), "uniq-c"))
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 2);
    assert_eq!(store.get(7).await.unwrap().unwrap().file_unique_id, "uniq-b");

    let removed = store.remove(7).await.unwrap().unwrap();
    assert_eq!(removed.user_id, 7);
    assert!(store.get(7).await.unwrap().is_none());
    assert_eq!(store.count().await.unwrap(), 1);
}
