use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

// A local Bot API server hands out absolute paths on its own disk.
async fn local_bot_api_path(path: &str) -> Option<&Path> {
    let path = Path::new(path);
    if path.is_absolute() && tokio::fs::try_exists(path).await.unwrap_or(false) {
        Some(path)
    } else {
        None
    }
}

pub async fn download_file_bytes(bot: &Bot, file_id: &FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id.clone()).await?;
    if let Some(local_path) = local_bot_api_path(&file.path).await {
        return tokio::fs::read(local_path)
            .await
            .with_context(|| format!("failed to read {}", local_path.display()));
    }
    let mut bytes = Vec::with_capacity(file.size as usize);
    bot.download_file(&file.path, &mut bytes)
        .await
        .context("failed to download file from Telegram")?;
    Ok(bytes)
}

pub async fn download_file_to(bot: &Bot, file_id: &FileId, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = bot.get_file(file_id.clone()).await?;
    if let Some(local_path) = local_bot_api_path(&file.path).await {
        let copied = tokio::fs::copy(local_path, destination)
            .await
            .with_context(|| format!("failed to copy {}", local_path.display()))?;
        debug!("Copied {} bytes to {}", copied, destination.display());
        return Ok(copied);
    }

    let mut output = tokio::fs::File::create(destination)
        .await
        .with_context(|| format!("failed to create {}", destination.display()))?;
    bot.download_file(&file.path, &mut output)
        .await
        .context("failed to download file from Telegram")?;
    output.flush().await?;
    let written = output.metadata().await.map(|meta| meta.len()).unwrap_or(0);
    debug!("Downloaded {} bytes to {}", written, destination.display());
    Ok(written)
}

/// Files removed when the guard goes out of scope, on success and error paths alike.
#[derive(Debug, Default)]
pub struct TempFiles {
    paths: Vec<PathBuf>,
}

impl TempFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.paths.push(path.clone());
        path
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!("Removed temporary file {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("Failed to remove temporary file {}: {err}", path.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temp_files_are_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("in.mkv");
        std::fs::write(&existing, b"data").unwrap();
        let never_created = dir.path().join("out.mkv");

        {
            let mut temp = TempFiles::new();
            assert_eq!(temp.track(&existing), existing);
            temp.track(&never_created);
        }

        assert!(!existing.exists());
        assert!(!never_created.exists());
    }
}
