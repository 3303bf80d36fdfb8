use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

const STDERR_TAIL_CHARS: usize = 600;

#[derive(Debug, Error)]
pub enum RemuxError {
    #[error("failed to start media tool '{binary}': {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("media tool timed out after {} seconds", .0.as_secs())]
    TimedOut(Duration),
    #[error("media tool exited with code {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Container-level rewrites applied while copying every stream as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemuxOptions {
    /// Title written to every remaining audio track.
    pub audio_title: Option<String>,
    /// Audio stream indexes (relative to audio streams, `0:a:N`) to remove.
    pub drop_audio_streams: Vec<usize>,
    /// Write the output name (without extension) as the container title.
    pub set_container_title: bool,
}

impl RemuxOptions {
    pub fn is_noop(&self) -> bool {
        self.audio_title.is_none() && self.drop_audio_streams.is_empty() && !self.set_container_title
    }

    pub fn describe(&self) -> String {
        if self.is_noop() {
            return "off".to_string();
        }
        let mut parts = Vec::new();
        if let Some(title) = &self.audio_title {
            parts.push(format!("audio title={title:?}"));
        }
        if !self.drop_audio_streams.is_empty() {
            let indexes = self
                .drop_audio_streams
                .iter()
                .map(|index| index.to_string())
                .collect::<Vec<_>>()
                .join(",");
            parts.push(format!("drop audio={indexes}"));
        }
        if self.set_container_title {
            parts.push("container title".to_string());
        }
        parts.join("; ")
    }
}

#[derive(Debug, Clone)]
pub struct RemuxRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub title: Option<String>,
    pub options: RemuxOptions,
}

#[async_trait]
pub trait Remuxer: Send + Sync {
    async fn remux(&self, request: &RemuxRequest) -> Result<PathBuf, RemuxError>;

    fn name(&self) -> &str;
}

pub fn build_ffmpeg_args(request: &RemuxRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        request.input.clone().into_os_string(),
        "-map".into(),
        "0".into(),
    ];

    for index in &request.options.drop_audio_streams {
        args.push("-map".into());
        args.push(format!("-0:a:{index}").into());
    }

    args.push("-c".into());
    args.push("copy".into());

    if request.options.set_container_title {
        if let Some(title) = request.title.as_deref().filter(|title| !title.is_empty()) {
            args.push("-metadata".into());
            args.push(format!("title={title}").into());
        }
    }

    if let Some(audio_title) = &request.options.audio_title {
        args.push("-metadata:s:a".into());
        args.push(format!("title={audio_title}").into());
    }

    args.push(request.output.clone().into_os_string());
    args
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    let count = text.chars().count();
    if count <= STDERR_TAIL_CHARS {
        return text.to_string();
    }
    text.chars().skip(count - STDERR_TAIL_CHARS).collect()
}

/// Runs an ffmpeg-compatible binary with stream copy.
#[derive(Debug, Clone)]
pub struct FfmpegRemuxer {
    binary: String,
    timeout: Duration,
}

impl FfmpegRemuxer {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn command(&self, args: &[OsString]) -> Command {
        let mut command = Command::new(&self.binary);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Remuxer for FfmpegRemuxer {
    async fn remux(&self, request: &RemuxRequest) -> Result<PathBuf, RemuxError> {
        let args = build_ffmpeg_args(request);
        debug!("Running {} with {:?}", self.binary, args);

        let output = timeout(self.timeout, self.command(&args).output())
            .await
            .map_err(|_| RemuxError::TimedOut(self.timeout))?
            .map_err(|source| RemuxError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(RemuxError::Failed {
                code: output.status.code(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        info!(
            "Remuxed {} -> {}",
            display_name(&request.input),
            display_name(&request.output)
        );
        Ok(request.output.clone())
    }

    fn name(&self) -> &str {
        &self.binary
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn is_remuxable(mime_type: Option<&str>) -> bool {
    matches!(mime_type, Some(mime) if mime.starts_with("video/") || mime.starts_with("audio/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(options: RemuxOptions) -> RemuxRequest {
        RemuxRequest {
            input: PathBuf::from("in.mkv"),
            output: PathBuf::from("out.mkv"),
            title: Some("[@Tag] Show [E01]".to_string()),
            options,
        }
    }

    fn as_strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn plain_copy_maps_every_stream() {
        let args = as_strings(build_ffmpeg_args(&request(RemuxOptions::default())));
        assert_eq!(
            args,
            vec![
                "-hide_banner", "-loglevel", "error", "-y", "-i", "in.mkv", "-map", "0", "-c",
                "copy", "out.mkv"
            ]
        );
    }

    #[test]
    fn drops_audio_streams_and_rewrites_titles() {
        let options = RemuxOptions {
            audio_title: Some("Japanese".to_string()),
            drop_audio_streams: vec![1, 2],
            set_container_title: true,
        };
        let args = as_strings(build_ffmpeg_args(&request(options)));
        let joined = args.join(" ");
        assert!(joined.contains("-map 0 -map -0:a:1 -map -0:a:2 -c copy"));
        assert!(joined.contains("-metadata title=[@Tag] Show [E01]"));
        assert!(joined.contains("-metadata:s:a title=Japanese"));
        assert_eq!(args.last().map(String::as_str), Some("out.mkv"));
    }

    #[test]
    fn container_title_needs_a_title() {
        let options = RemuxOptions {
            set_container_title: true,
            ..RemuxOptions::default()
        };
        let mut req = request(options);
        req.title = None;
        let args = as_strings(build_ffmpeg_args(&req));
        assert!(!args.iter().any(|arg| arg == "-metadata"));
    }

    #[test]
    fn noop_detection_and_description() {
        assert!(RemuxOptions::default().is_noop());
        assert_eq!(RemuxOptions::default().describe(), "off");
        let options = RemuxOptions {
            audio_title: None,
            drop_audio_streams: vec![0, 3],
            set_container_title: false,
        };
        assert!(!options.is_noop());
        assert_eq!(options.describe(), "drop audio=0,3");
    }

    #[test]
    fn only_audio_and_video_are_remuxable() {
        assert!(is_remuxable(Some("video/x-matroska")));
        assert!(is_remuxable(Some("audio/mpeg")));
        assert!(!is_remuxable(Some("application/pdf")));
        assert!(!is_remuxable(None));
    }

    #[test]
    fn stderr_tail_keeps_the_end() {
        let long = "x".repeat(STDERR_TAIL_CHARS) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert_eq!(tail.chars().count(), STDERR_TAIL_CHARS);
        assert!(tail.ends_with("END"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let remuxer = FfmpegRemuxer::new(
            "definitely-not-a-real-media-tool-binary",
            Duration::from_secs(5),
        );
        let err = remuxer
            .remux(&request(RemuxOptions::default()))
            .await
            .unwrap_err();
        assert!(matches!(err, RemuxError::Spawn { .. }), "{err}");
    }
}
