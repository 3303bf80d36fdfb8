use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::db::models::ThumbnailRecord;
use crate::db::ThumbnailStore;

/// Flat JSON file keyed by user id, rewritten on every change.
pub struct JsonThumbnailStore {
    path: PathBuf,
    records: Mutex<BTreeMap<i64, ThumbnailRecord>>,
}

impl JsonThumbnailStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let records = match tokio::fs::read_to_string(path).await {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("invalid thumbnail store {}", path.display()))?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("Thumbnail store {} not found, starting empty", path.display());
                BTreeMap::new()
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read thumbnail store {}", path.display()))
            }
        };

        Ok(JsonThumbnailStore {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    async fn persist(&self, records: &BTreeMap<i64, ThumbnailRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(records)?;
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, payload).await?;
        if let Err(err) = tokio::fs::rename(&tmp_path, &self.path).await {
            warn!("Failed to replace {}: {err}", self.path.display());
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(err.into());
        }
        Ok(())
    }
}

#[async_trait]
impl ThumbnailStore for JsonThumbnailStore {
    async fn get(&self, user_id: i64) -> Result<Option<ThumbnailRecord>> {
        Ok(self.records.lock().await.get(&user_id).cloned())
    }

    // Changes are applied to a copy and only kept once they are on disk.
    async fn put(&self, record: ThumbnailRecord) -> Result<()> {
        let mut records = self.records.lock().await;
        let mut updated = records.clone();
        updated.insert(record.user_id, record);
        self.persist(&updated).await?;
        *records = updated;
        Ok(())
    }

    async fn remove(&self, user_id: i64) -> Result<Option<ThumbnailRecord>> {
        let mut records = self.records.lock().await;
        let mut updated = records.clone();
        let removed = updated.remove(&user_id);
        if removed.is_some() {
            self.persist(&updated).await?;
            *records = updated;
        }
        Ok(removed)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.lock().await.len())
    }

    fn backend(&self) -> &'static str {
        "json"
    }
}
