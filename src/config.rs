use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

use crate::media::remux::RemuxOptions;

const DEFAULT_TAG_PREFIX: &str = "[@Animes2u] ";
const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailStoreKind {
    Sqlite,
    Json,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub bot_api_url: Option<String>,
    pub owner_id: Option<i64>,
    pub tag_prefix: String,
    pub log_level: String,
    pub thumbnail_store: ThumbnailStoreKind,
    pub database_url: String,
    pub thumbnail_json_path: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub download_dir: PathBuf,
    pub max_file_size_bytes: u64,
    pub rate_limit_seconds: u64,
    pub port: u16,
    pub ffmpeg_path: String,
    pub remux_timeout: Duration,
    pub remux_options: RemuxOptions,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .map(|value| value.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_u16(name: &str, default: u16) -> u16 {
    env::var(name)
        .ok()
        .and_then(|value| value.trim().parse::<u16>().ok())
        .unwrap_or(default)
}

fn env_optional_string(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_store_kind(value: &str) -> ThumbnailStoreKind {
    match value.trim().to_lowercase().as_str() {
        "" | "sqlite" | "db" => ThumbnailStoreKind::Sqlite,
        "json" | "file" => ThumbnailStoreKind::Json,
        "memory" | "mem" => ThumbnailStoreKind::Memory,
        other => {
            warn!("Unknown THUMBNAIL_STORE value '{}'; defaulting to sqlite.", other);
            ThumbnailStoreKind::Sqlite
        }
    }
}

fn parse_owner_id(value: Option<String>) -> Option<i64> {
    let raw = value?;
    match raw.parse::<i64>() {
        Ok(0) => None,
        Ok(id) => Some(id),
        Err(_) => {
            warn!("Invalid OWNER_ID value '{}'; owner-only commands are disabled.", raw);
            None
        }
    }
}

fn parse_stream_indexes(value: &str) -> Vec<usize> {
    let mut indexes: Vec<usize> = value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .filter_map(|entry| match entry.parse::<usize>() {
            Ok(index) => Some(index),
            Err(_) => {
                warn!("Ignoring invalid audio stream index '{}'", entry);
                None
            }
        })
        .collect();
    indexes.sort_unstable();
    indexes.dedup();
    indexes
}

// An empty prefix would make every output name indistinguishable from the input.
fn normalize_tag_prefix(value: String) -> String {
    if value.trim().is_empty() {
        return DEFAULT_TAG_PREFIX.to_string();
    }
    value
}

impl Config {
    pub fn load() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").unwrap_or_default();
        if bot_token.trim().is_empty() {
            return Err(anyhow::anyhow!("BOT_TOKEN is required"));
        }

        let remux_options = RemuxOptions {
            audio_title: env_optional_string("REMUX_AUDIO_TITLE"),
            drop_audio_streams: parse_stream_indexes(&env_string(
                "REMUX_DROP_AUDIO_STREAMS",
                "",
            )),
            set_container_title: env_bool("REMUX_SET_TITLE", false),
        };

        Ok(Config {
            bot_token,
            bot_api_url: env_optional_string("BOT_API_URL"),
            owner_id: parse_owner_id(env_optional_string("OWNER_ID")),
            tag_prefix: normalize_tag_prefix(env_string("TAG_PREFIX", DEFAULT_TAG_PREFIX)),
            log_level: env_string("LOG_LEVEL", "info").to_lowercase(),
            thumbnail_store: parse_store_kind(&env_string("THUMBNAIL_STORE", "sqlite")),
            database_url: env_string("DATABASE_URL", "sqlite://thumbnails.db?mode=rwc"),
            thumbnail_json_path: PathBuf::from(env_string(
                "THUMBNAIL_JSON_PATH",
                "thumbnails.json",
            )),
            thumbnail_dir: PathBuf::from(env_string("THUMBNAIL_DIR", "thumbnails")),
            download_dir: PathBuf::from(env_string("DOWNLOAD_DIR", "downloads")),
            max_file_size_bytes: env_u64("MAX_FILE_SIZE_BYTES", DEFAULT_MAX_FILE_SIZE_BYTES),
            rate_limit_seconds: env_u64("RATE_LIMIT_SECONDS", 0),
            port: env_u16("PORT", 8080),
            ffmpeg_path: env_string("FFMPEG_PATH", "ffmpeg"),
            remux_timeout: Duration::from_secs(env_u64("REMUX_TIMEOUT_SECONDS", 600).max(1)),
            remux_options,
        })
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == Some(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_kind_accepts_aliases_and_falls_back_to_sqlite() {
        assert_eq!(parse_store_kind("JSON"), ThumbnailStoreKind::Json);
        assert_eq!(parse_store_kind(" memory "), ThumbnailStoreKind::Memory);
        assert_eq!(parse_store_kind(""), ThumbnailStoreKind::Sqlite);
        assert_eq!(parse_store_kind("redis"), ThumbnailStoreKind::Sqlite);
    }

    #[test]
    fn owner_id_zero_or_garbage_disables_owner_commands() {
        assert_eq!(parse_owner_id(Some("12345".to_string())), Some(12345));
        assert_eq!(parse_owner_id(Some("0".to_string())), None);
        assert_eq!(parse_owner_id(Some("abc".to_string())), None);
        assert_eq!(parse_owner_id(None), None);
    }

    #[test]
    fn stream_indexes_are_sorted_and_deduplicated() {
        assert_eq!(parse_stream_indexes("2, 0,x,2,,1"), vec![0, 1, 2]);
        assert!(parse_stream_indexes("").is_empty());
    }

    #[test]
    fn blank_tag_prefix_uses_default() {
        assert_eq!(normalize_tag_prefix("   ".to_string()), DEFAULT_TAG_PREFIX);
        assert_eq!(normalize_tag_prefix("[Mine] ".to_string()), "[Mine] ");
    }
}
