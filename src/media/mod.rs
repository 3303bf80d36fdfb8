pub mod remux;
pub mod thumbnail;

use std::path::Path;

use tokio::io::AsyncReadExt;

const SNIFF_BYTES: usize = 8192;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub async fn detect_file_mime_type(path: &Path) -> std::io::Result<Option<String>> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut head = vec![0u8; SNIFF_BYTES];
    let mut filled = 0;
    while filled < SNIFF_BYTES {
        let read = file.read(&mut head[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    head.truncate(filled);
    Ok(detect_mime_type(&head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_mp4_and_unknown_bytes() {
        let mut mp4_header = vec![0x00, 0x00, 0x00, 0x18];
        mp4_header.extend_from_slice(b"ftypisom");
        mp4_header.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
        assert_eq!(detect_mime_type(&mp4_header).as_deref(), Some("video/mp4"));
        assert_eq!(detect_mime_type(b"just some text"), None);
    }

    #[tokio::test]
    async fn sniffs_files_shorter_than_the_read_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.bin");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR").unwrap();
        let mime = detect_file_mime_type(&path).await.unwrap();
        assert_eq!(mime.as_deref(), Some("image/png"));
    }
}
