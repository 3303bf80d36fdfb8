use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use teloxide::prelude::*;
use teloxide::types::{InputFile, PhotoSize, ReplyParameters};
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::db::models::ThumbnailRecord;
use crate::handlers::access::check_owner_access;
use crate::handlers::media::download_file_bytes;
use crate::handlers::responses::reply_text;
use crate::media::thumbnail::prepare_thumbnail;
use crate::state::AppState;
use crate::utils::telegram::sender_id;
use crate::utils::timing::{complete_command_timer, start_command_timer};

const HELP_TEXT: &str = "\
Thumbnail Rename Bot

Send a photo with the caption /set_thumb (or reply to a photo with /set_thumb) to store your thumbnail.
Then send any document: it comes back renamed, with your thumbnail attached.

/set_thumb - Save a photo as your thumbnail
/view_thumb - Show your saved thumbnail
/delete_thumb - Remove your saved thumbnail
/start - Resume file processing
/stop - Pause file processing (owner only)
/status - Show bot status (owner only)
/help - Show this help message";

pub fn thumbnail_path(dir: &Path, user_id: i64) -> PathBuf {
    dir.join(format!("{user_id}.jpg"))
}

fn largest_photo(sizes: &[PhotoSize]) -> Option<&PhotoSize> {
    sizes
        .iter()
        .max_by_key(|photo| u64::from(photo.width) * u64::from(photo.height))
}

fn photo_for_thumbnail(message: &Message) -> Option<&PhotoSize> {
    message.photo().and_then(largest_photo).or_else(|| {
        message
            .reply_to_message()
            .and_then(|reply| reply.photo())
            .and_then(largest_photo)
    })
}

async fn remove_file_if_exists(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// Looks up the sender's thumbnail, dropping records whose file has vanished.
pub async fn resolve_thumbnail(state: &AppState, user_id: i64) -> Result<Option<ThumbnailRecord>> {
    let Some(record) = state.thumbnails.get(user_id).await? else {
        return Ok(None);
    };
    if tokio::fs::try_exists(&record.file_path).await.unwrap_or(false) {
        return Ok(Some(record));
    }
    warn!(
        "Thumbnail file {} for user {} is missing; dropping record",
        record.file_path.display(),
        user_id
    );
    state.thumbnails.remove(user_id).await?;
    Ok(None)
}

pub async fn start_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let was_enabled = state.processing.set(true);
    if !was_enabled {
        info!("Processing resumed by user {:?}", sender_id(&message));
    }
    reply_text(&bot, &message, "▶️ Bot is now active and processing files!").await?;
    Ok(())
}

pub async fn stop_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if !check_owner_access(&bot, &message, "stop").await {
        return Ok(());
    }

    if state.processing.set(false) {
        info!("Processing paused by owner");
    }
    reply_text(
        &bot,
        &message,
        "⏸️ Bot has stopped processing files. Use /start to resume.",
    )
    .await?;
    Ok(())
}

pub async fn help_handler(bot: Bot, message: Message) -> Result<()> {
    reply_text(&bot, &message, HELP_TEXT).await?;
    Ok(())
}

pub async fn set_thumb_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(user_id) = sender_id(&message) else {
        return Ok(());
    };
    let mut timer = start_command_timer("set_thumb", &message);

    let Some(photo) = photo_for_thumbnail(&message) else {
        complete_command_timer(&mut timer, "rejected", Some("no photo".to_string()));
        reply_text(
            &bot,
            &message,
            "⚠️ Send a photo with /set_thumb as its caption, or reply to a photo with /set_thumb.",
        )
        .await?;
        return Ok(());
    };

    let bytes = download_file_bytes(&bot, &photo.file.id).await?;
    let jpeg = tokio::task::spawn_blocking(move || prepare_thumbnail(&bytes)).await??;

    tokio::fs::create_dir_all(&CONFIG.thumbnail_dir).await?;
    let path = thumbnail_path(&CONFIG.thumbnail_dir, user_id);
    tokio::fs::write(&path, &jpeg)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    state
        .thumbnails
        .put(ThumbnailRecord::new(
            user_id,
            path.clone(),
            photo.file.unique_id.0.clone(),
        ))
        .await?;
    info!("Saved thumbnail for user {} at {}", user_id, path.display());
    complete_command_timer(&mut timer, "success", None);

    reply_text(
        &bot,
        &message,
        "✅ Thumbnail saved permanently! Use /delete_thumb to remove it.",
    )
    .await?;
    Ok(())
}

pub async fn delete_thumb_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(user_id) = sender_id(&message) else {
        return Ok(());
    };

    let removed = state.thumbnails.remove(user_id).await?;
    let file_removed = match &removed {
        Some(record) => remove_file_if_exists(&record.file_path).await?,
        None => remove_file_if_exists(&thumbnail_path(&CONFIG.thumbnail_dir, user_id)).await?,
    };

    let reply = if removed.is_some() || file_removed {
        info!("Deleted thumbnail for user {}", user_id);
        "🗑️ Thumbnail deleted successfully!"
    } else {
        "⚠️ No saved thumbnail found!"
    };
    reply_text(&bot, &message, reply).await?;
    Ok(())
}

pub async fn view_thumb_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(user_id) = sender_id(&message) else {
        return Ok(());
    };

    match resolve_thumbnail(&state, user_id).await? {
        Some(record) => {
            bot.send_photo(message.chat.id, InputFile::file(record.file_path))
                .caption(format!(
                    "🖼️ Your thumbnail (saved {})",
                    record.updated_at.format("%Y-%m-%d %H:%M UTC")
                ))
                .reply_parameters(ReplyParameters::new(message.id))
                .await?;
        }
        None => {
            reply_text(&bot, &message, "⚠️ No thumbnail found! Use /set_thumb to set one.").await?;
        }
    }
    Ok(())
}

pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 || value.fract() == 0.0 {
        format!("{}{}", value as u64, UNITS[unit])
    } else {
        format!("{:.1}{}", value, UNITS[unit])
    }
}

async fn build_status_report(state: &AppState) -> String {
    let thumbnails = match state.thumbnails.count().await {
        Ok(count) => count.to_string(),
        Err(err) => {
            warn!("Failed to count thumbnails: {err}");
            "unavailable".to_string()
        }
    };

    format!(
        "Status\n\
         processing: {}\n\
         thumbnails: {} ({})\n\
         tag prefix: {:?}\n\
         remux: {} via {}\n\
         max file size: {}",
        if state.processing.is_enabled() {
            "enabled"
        } else {
            "paused"
        },
        thumbnails,
        state.thumbnails.backend(),
        CONFIG.tag_prefix,
        CONFIG.remux_options.describe(),
        state.remuxer.name(),
        format_size(CONFIG.max_file_size_bytes)
    )
}

pub async fn status_handler(bot: Bot, state: AppState, message: Message) -> Result<()> {
    if !check_owner_access(&bot, &message, "status").await {
        return Ok(());
    }

    let report = build_status_report(&state).await;
    reply_text(&bot, &message, report).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::db::memory::MemoryThumbnailStore;
    use crate::media::remux::FfmpegRemuxer;

    fn memory_state() -> AppState {
        AppState::new(
            Arc::new(MemoryThumbnailStore::default()),
            Arc::new(FfmpegRemuxer::new("ffmpeg", Duration::from_secs(5))),
            Duration::ZERO,
        )
    }

    #[tokio::test]
    async fn resolves_a_thumbnail_whose_file_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = thumbnail_path(dir.path(), 7);
        std::fs::write(&path, b"jpeg").unwrap();
        let state = memory_state();
        state
            .thumbnails
            .put(ThumbnailRecord::new(7, path.clone(), "u7"))
            .await
            .unwrap();

        let record = resolve_thumbnail(&state, 7).await.unwrap().unwrap();
        assert_eq!(record.file_path, path);
        assert!(resolve_thumbnail(&state, 8).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn record_with_missing_file_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let state = memory_state();
        state
            .thumbnails
            .put(ThumbnailRecord::new(7, thumbnail_path(dir.path(), 7), "u7"))
            .await
            .unwrap();

        assert!(resolve_thumbnail(&state, 7).await.unwrap().is_none());
        assert!(state.thumbnails.get(7).await.unwrap().is_none());
        assert_eq!(state.thumbnails.count().await.unwrap(), 0);
    }

    #[test]
    fn thumbnail_files_are_keyed_by_user() {
        assert_eq!(
            thumbnail_path(Path::new("thumbnails"), 42),
            PathBuf::from("thumbnails/42.jpg")
        );
    }

    #[test]
    fn sizes_are_human_readable() {
        assert_eq!(format_size(512), "512B");
        assert_eq!(format_size(1536), "1.5KB");
        assert_eq!(format_size(20 * 1024 * 1024), "20MB");
        assert_eq!(format_size(2 * 1024 * 1024 * 1024), "2GB");
    }
}
