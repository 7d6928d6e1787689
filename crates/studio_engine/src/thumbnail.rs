use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::imageops::FilterType;
use image::ImageFormat;
use studio_core::OriginalFile;
use thiserror::Error;

/// Longest edge of a generated thumbnail, in pixels.
pub const THUMBNAIL_EDGE: u32 = 200;

const DATA_URL_PREFIX: &str = "data:image/png;base64,";

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("cannot decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("cannot encode thumbnail: {0}")]
    Encode(#[source] image::ImageError),
    #[error("thumbnail task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Size that fits `width`×`height` inside a `max_edge` square, keeping the
/// aspect ratio. Images already inside the box keep their size. Never
/// returns a zero side.
pub fn bounded_size(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let (width, height) = (width.max(1), height.max(1));
    let max_edge = max_edge.max(1);
    if width <= max_edge && height <= max_edge {
        return (width, height);
    }
    let (w, h) = (u64::from(width), u64::from(height));
    let edge = u64::from(max_edge);
    let (nw, nh) = if w >= h {
        (edge, h * edge / w)
    } else {
        (w * edge / h, edge)
    };
    (nw.max(1) as u32, nh.max(1) as u32)
}

/// Decode, shrink and re-encode as a PNG data URL. CPU bound.
pub fn render_thumbnail(bytes: &[u8]) -> Result<String, ThumbnailError> {
    let img = image::load_from_memory(bytes).map_err(ThumbnailError::Decode)?;
    let (width, height) = bounded_size(img.width(), img.height(), THUMBNAIL_EDGE);
    let thumbnail = if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Lanczos3)
    };

    let mut buf = Cursor::new(Vec::new());
    thumbnail
        .write_to(&mut buf, ImageFormat::Png)
        .map_err(ThumbnailError::Encode)?;
    let encoded = general_purpose::STANDARD.encode(buf.get_ref());
    Ok(format!("{DATA_URL_PREFIX}{encoded}"))
}

/// [`render_thumbnail`] on the blocking pool.
pub async fn generate_thumbnail(original: OriginalFile) -> Result<String, ThumbnailError> {
    tokio::task::spawn_blocking(move || render_thumbnail(&original.bytes)).await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn landscape_is_capped_on_width() {
        assert_eq!(bounded_size(1000, 500, 200), (200, 100));
    }

    #[test]
    fn portrait_is_capped_on_height() {
        assert_eq!(bounded_size(300, 1200, 200), (50, 200));
    }

    #[test]
    fn small_images_are_not_enlarged() {
        assert_eq!(bounded_size(120, 80, 200), (120, 80));
    }

    #[test]
    fn extreme_aspect_keeps_one_pixel() {
        assert_eq!(bounded_size(10_000, 3, 200), (200, 1));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            render_thumbnail(b"not an image"),
            Err(ThumbnailError::Decode(_))
        ));
    }
}
