use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use teloxide::prelude::*;
use teloxide::types::{ChatAction, Document};
use tracing::{error, info, warn};

use crate::config::CONFIG;
use crate::handlers::commands::{format_size, resolve_thumbnail};
use crate::handlers::media::{download_file_to, TempFiles};
use crate::handlers::responses::{reply_text, send_document_with_retry, OutgoingDocument};
use crate::media::detect_file_mime_type;
use crate::media::remux::{is_remuxable, RemuxOptions, RemuxRequest};
use crate::naming::normalizer::{normalize, split_extension};
use crate::state::AppState;
use crate::utils::telegram::{sender_id, start_chat_action_heartbeat};
use crate::utils::timing::{complete_command_timer, start_command_timer};

const DEFAULT_DOCUMENT_NAME: &str = "file";

/// Extension used for temporary files: only short alphanumeric ones survive.
fn temp_extension(extension: &str) -> &str {
    let body = extension.strip_prefix('.').unwrap_or_default();
    if !body.is_empty() && body.len() <= 16 && body.chars().all(|ch| ch.is_ascii_alphanumeric()) {
        extension
    } else {
        ""
    }
}

pub fn temp_paths(
    dir: &Path,
    chat_id: i64,
    message_id: i32,
    extension: &str,
) -> (PathBuf, PathBuf) {
    let base = format!("{chat_id}_{message_id}");
    let extension = temp_extension(extension);
    (
        dir.join(format!("{base}_in{extension}")),
        dir.join(format!("{base}_out{extension}")),
    )
}

pub fn should_remux(options: &RemuxOptions, extension: &str, mime_type: Option<&str>) -> bool {
    // ffmpeg picks the output muxer from the extension.
    !options.is_noop() && !extension.is_empty() && is_remuxable(mime_type)
}

pub fn exceeds_size_limit(size: u64, max: u64) -> bool {
    max > 0 && size > max
}

async fn remux_or_original(
    state: &AppState,
    options: &RemuxOptions,
    input: PathBuf,
    output: PathBuf,
    extension: &str,
    new_name: &str,
) -> PathBuf {
    let mime_type = match detect_file_mime_type(&input).await {
        Ok(mime) => mime,
        Err(err) => {
            warn!("Failed to sniff {}: {err}", input.display());
            None
        }
    };
    if !should_remux(options, extension, mime_type.as_deref()) {
        return input;
    }

    let (title, _) = split_extension(new_name);
    let request = RemuxRequest {
        input: input.clone(),
        output,
        title: Some(title.to_string()),
        options: options.clone(),
    };
    match state.remuxer.remux(&request).await {
        Ok(path) => path,
        Err(err) => {
            warn!("Remux failed, sending original file: {err}");
            input
        }
    }
}

async fn run_pipeline(
    bot: &Bot,
    state: &AppState,
    message: &Message,
    document: &Document,
    thumbnail: &Path,
) -> Result<String> {
    let original_name = document
        .file_name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(DEFAULT_DOCUMENT_NAME);
    let new_name = normalize(original_name, &CONFIG.tag_prefix);
    let (_, extension) = split_extension(original_name);
    let extension = temp_extension(extension);

    let mut temp = TempFiles::new();
    let (input_path, output_path) = temp_paths(
        &CONFIG.download_dir,
        message.chat.id.0,
        message.id.0,
        extension,
    );
    let input_path = temp.track(input_path);
    let output_path = temp.track(output_path);

    let _heartbeat =
        start_chat_action_heartbeat(bot.clone(), message.chat.id, ChatAction::UploadDocument);

    download_file_to(bot, &document.file.id, &input_path)
        .await
        .map_err(|err| anyhow!("Failed to download file: {err}"))?;

    let upload_path = remux_or_original(
        state,
        &CONFIG.remux_options,
        input_path,
        output_path,
        extension,
        &new_name,
    )
    .await;

    let caption = format!("✅ Renamed: {new_name}");
    send_document_with_retry(
        bot,
        message.chat.id,
        &OutgoingDocument {
            path: &upload_path,
            file_name: &new_name,
            thumbnail: Some(thumbnail),
            caption: &caption,
        },
        Some(message.id),
    )
    .await?;

    Ok(new_name)
}

pub async fn process_document(bot: Bot, state: AppState, message: Message) -> Result<()> {
    let Some(document) = message.document().cloned() else {
        return Ok(());
    };
    let Some(user_id) = sender_id(&message) else {
        return Ok(());
    };
    let mut timer = start_command_timer("document", &message);

    if !state.processing.is_enabled() {
        complete_command_timer(&mut timer, "rejected", Some("paused".to_string()));
        reply_text(
            &bot,
            &message,
            "⏸️ Bot is currently stopped. Use /start to resume processing.",
        )
        .await?;
        return Ok(());
    }

    if state.rate_limiter.is_rate_limited(user_id) {
        complete_command_timer(&mut timer, "rejected", Some("rate_limited".to_string()));
        reply_text(
            &bot,
            &message,
            "⏳ You are sending files too quickly. Please wait a moment and try again.",
        )
        .await?;
        return Ok(());
    }

    let Some(thumbnail) = resolve_thumbnail(&state, user_id).await? else {
        complete_command_timer(&mut timer, "rejected", Some("no_thumbnail".to_string()));
        reply_text(&bot, &message, "⚠️ No thumbnail found! Use /set_thumb to set one.").await?;
        return Ok(());
    };

    let size = u64::from(document.file.size);
    if exceeds_size_limit(size, CONFIG.max_file_size_bytes) {
        complete_command_timer(&mut timer, "rejected", Some(format!("too_large={size}")));
        reply_text(
            &bot,
            &message,
            format!(
                "❌ File is too large (Max: {}).",
                format_size(CONFIG.max_file_size_bytes)
            ),
        )
        .await?;
        return Ok(());
    }

    state.rate_limiter.record(user_id);
    reply_text(&bot, &message, "🔄 Processing file...").await?;

    match run_pipeline(&bot, &state, &message, &document, &thumbnail.file_path).await {
        Ok(new_name) => {
            info!("Processed document for user {} as {:?}", user_id, new_name);
            complete_command_timer(&mut timer, "success", None);
            reply_text(&bot, &message, "✅ Done! Here is your updated file.").await?;
        }
        Err(err) => {
            error!("Document processing failed for user {}: {err:#}", user_id);
            complete_command_timer(&mut timer, "error", Some(err.to_string()));
            reply_text(&bot, &message, format!("❌ Error: {err}")).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use parking_lot::Mutex;

    use crate::db::memory::MemoryThumbnailStore;
    use crate::media::remux::{RemuxError, Remuxer};

    /// Remuxer that records its requests and answers with a canned result.
    struct ScriptedRemuxer {
        fail: bool,
        requests: Mutex<Vec<RemuxRequest>>,
    }

    impl ScriptedRemuxer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(ScriptedRemuxer {
                fail,
                requests: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.requests.lock().len()
        }
    }

    #[async_trait]
    impl Remuxer for ScriptedRemuxer {
        async fn remux(&self, request: &RemuxRequest) -> Result<PathBuf, RemuxError> {
            self.requests.lock().push(request.clone());
            if self.fail {
                Err(RemuxError::Failed {
                    code: Some(1),
                    stderr: "Invalid data found when processing input".to_string(),
                })
            } else {
                Ok(request.output.clone())
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn state_with(remuxer: Arc<ScriptedRemuxer>) -> AppState {
        AppState::new(
            Arc::new(MemoryThumbnailStore::default()),
            remuxer,
            Duration::ZERO,
        )
    }

    fn audio_title_options() -> RemuxOptions {
        RemuxOptions {
            audio_title: Some("Main".to_string()),
            ..RemuxOptions::default()
        }
    }

    fn write_mp4(path: &Path) {
        let mut header = vec![0x00, 0x00, 0x00, 0x18];
        header.extend_from_slice(b"ftypisom");
        header.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
        std::fs::write(path, header).unwrap();
    }

    #[tokio::test]
    async fn failed_remux_falls_back_to_the_download() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = temp_paths(dir.path(), 1, 2, ".mp4");
        write_mp4(&input);
        let remuxer = ScriptedRemuxer::new(true);
        let state = state_with(remuxer.clone());

        let sent = remux_or_original(
            &state,
            &audio_title_options(),
            input.clone(),
            output,
            ".mp4",
            "[@Tag] Show - [720p].mp4",
        )
        .await;

        assert_eq!(sent, input);
        assert_eq!(remuxer.calls(), 1);
    }

    #[tokio::test]
    async fn successful_remux_sends_the_output_with_the_new_title() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = temp_paths(dir.path(), 1, 2, ".mp4");
        write_mp4(&input);
        let remuxer = ScriptedRemuxer::new(false);
        let state = state_with(remuxer.clone());

        let sent = remux_or_original(
            &state,
            &audio_title_options(),
            input,
            output.clone(),
            ".mp4",
            "[@Tag] Show - [720p].mp4",
        )
        .await;

        assert_eq!(sent, output);
        let requests = remuxer.requests.lock();
        assert_eq!(requests[0].title.as_deref(), Some("[@Tag] Show - [720p]"));
    }

    #[tokio::test]
    async fn non_media_and_unconfigured_remux_skip_the_remuxer() {
        let dir = tempfile::tempdir().unwrap();
        let (input, output) = temp_paths(dir.path(), 1, 2, ".pdf");
        std::fs::write(&input, b"%PDF-1.7 not really").unwrap();
        let remuxer = ScriptedRemuxer::new(false);
        let state = state_with(remuxer.clone());

        let sent = remux_or_original(
            &state,
            &audio_title_options(),
            input.clone(),
            output.clone(),
            ".pdf",
            "[@Tag] doc.pdf",
        )
        .await;
        assert_eq!(sent, input);

        let (video, video_out) = temp_paths(dir.path(), 3, 4, ".mp4");
        write_mp4(&video);
        let sent = remux_or_original(
            &state,
            &RemuxOptions::default(),
            video.clone(),
            video_out,
            ".mp4",
            "[@Tag] clip.mp4",
        )
        .await;
        assert_eq!(sent, video);
        assert_eq!(remuxer.calls(), 0);
    }

    #[test]
    fn temp_paths_keep_the_extension() {
        let (input, output) = temp_paths(Path::new("downloads"), -100, 7, ".mkv");
        assert_eq!(input, PathBuf::from("downloads/-100_7_in.mkv"));
        assert_eq!(output, PathBuf::from("downloads/-100_7_out.mkv"));

        let (input, _) = temp_paths(Path::new("downloads"), 1, 2, "");
        assert_eq!(input, PathBuf::from("downloads/1_2_in"));

        let (input, _) = temp_paths(Path::new("downloads"), 1, 2, ". part/2");
        assert_eq!(input, PathBuf::from("downloads/1_2_in"));
    }

    #[test]
    fn remux_needs_options_extension_and_media_type() {
        let options = RemuxOptions {
            audio_title: Some("Main".to_string()),
            ..RemuxOptions::default()
        };
        assert!(should_remux(&options, ".mkv", Some("video/x-matroska")));
        assert!(!should_remux(&options, "", Some("video/x-matroska")));
        assert!(!should_remux(&options, ".pdf", Some("application/pdf")));
        assert!(!should_remux(&RemuxOptions::default(), ".mkv", Some("video/x-matroska")));
    }

    #[test]
    fn zero_limit_means_unlimited() {
        assert!(exceeds_size_limit(11, 10));
        assert!(!exceeds_size_limit(10, 10));
        assert!(!exceeds_size_limit(u64::MAX, 0));
    }
}
