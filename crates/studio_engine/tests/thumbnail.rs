use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use studio_core::OriginalFile;
use studio_engine::{generate_thumbnail, THUMBNAIL_EDGE};

fn encoded(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 30, 30]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn decode_data_url(url: &str) -> DynamicImage {
    let payload = url
        .strip_prefix("data:image/png;base64,")
        .expect("png data url");
    let bytes = general_purpose::STANDARD.decode(payload).unwrap();
    image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap()
}

#[tokio::test]
async fn wide_photo_is_shrunk_to_the_edge() {
    let original = OriginalFile::new("wide.png", "image/png", encoded(800, 200, ImageFormat::Png));
    let url = generate_thumbnail(original).await.expect("thumbnail");

    let thumb = decode_data_url(&url);
    assert_eq!(thumb.dimensions(), (THUMBNAIL_EDGE, 50));
}

#[tokio::test]
async fn jpeg_input_still_yields_png_thumbnail() {
    let original = OriginalFile::new("tall.jpg", "image/jpeg", encoded(150, 600, ImageFormat::Jpeg));
    let url = generate_thumbnail(original).await.expect("thumbnail");

    let thumb = decode_data_url(&url);
    assert_eq!(thumb.dimensions(), (50, THUMBNAIL_EDGE));
}

#[tokio::test]
async fn small_image_keeps_its_size() {
    let original = OriginalFile::new("icon.png", "image/png", encoded(64, 48, ImageFormat::Png));
    let url = generate_thumbnail(original).await.expect("thumbnail");
    assert_eq!(decode_data_url(&url).dimensions(), (64, 48));
}

#[tokio::test]
async fn unreadable_bytes_are_an_error() {
    let original = OriginalFile::new("broken.png", "image/png", b"\x89PNG-not-really".to_vec());
    assert!(generate_thumbnail(original).await.is_err());
}
