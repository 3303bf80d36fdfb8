use std::io::Cursor;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;

/// Telegram ignores document thumbnails larger than 320px on either side.
pub const THUMBNAIL_MAX_SIDE: u32 = 320;
const THUMBNAIL_JPEG_QUALITY: u8 = 87;

fn fit_within_limit(image: DynamicImage) -> DynamicImage {
    if image.width() <= THUMBNAIL_MAX_SIDE && image.height() <= THUMBNAIL_MAX_SIDE {
        return image;
    }
    image.thumbnail(THUMBNAIL_MAX_SIDE, THUMBNAIL_MAX_SIDE)
}

/// Re-encodes an uploaded photo as a JPEG that Telegram accepts as a
/// document thumbnail.
pub fn prepare_thumbnail(bytes: &[u8]) -> Result<Vec<u8>> {
    let image = image::load_from_memory(bytes).context("unsupported thumbnail image")?;
    let rgb = fit_within_limit(image).to_rgb8();

    let mut output = Cursor::new(Vec::new());
    {
        let mut encoder = JpegEncoder::new_with_quality(&mut output, THUMBNAIL_JPEG_QUALITY);
        encoder
            .encode_image(&rgb)
            .context("failed to encode thumbnail")?;
    }
    Ok(output.into_inner())
}
