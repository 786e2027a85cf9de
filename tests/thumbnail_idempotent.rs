use image::{Rgb, RgbImage};
use sitetrace_rust::store::{InMemoryLocalStorage, LocalStorage};
use sitetrace_rust::thumbnail;

fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([180, 40, 60]));
    let mut encoded = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 90)
        .encode_image(&image::DynamicImage::ImageRgb8(img))
        .expect("encode sample jpeg");
    encoded
}

#[test]
fn thumbnail_is_generated_once_and_reused() {
    let local = InMemoryLocalStorage::new();
    local
        .write_file("attachments/photo.jpg", &sample_jpeg(640, 480))
        .expect("write original");

    let thumb = thumbnail::ensure_thumbnail(&local, "photo.jpg").expect("generate");
    assert_eq!(thumb, "attachments/photo_thumb.jpg");

    let bytes = local.read_file(&thumb).expect("read thumbnail");
    let decoded = image::load_from_memory(&bytes).expect("decode thumbnail");
    assert_eq!(decoded.width(), thumbnail::THUMBNAIL_SIZE);
    assert_eq!(decoded.height(), thumbnail::THUMBNAIL_SIZE);

    // Second resolution must return the cached rendition untouched. Plant a
    // marker so regeneration would be visible.
    local
        .write_file(&thumb, b"MARKER")
        .expect("plant marker");
    let again = thumbnail::ensure_thumbnail(&local, "photo.jpg").expect("lookup");
    assert_eq!(again, thumb);
    assert_eq!(local.read_file(&thumb).expect("read marker"), b"MARKER");
}

#[test]
fn thumbnail_from_supplied_bytes_skips_local_read() {
    let local = InMemoryLocalStorage::new();
    let bytes = sample_jpeg(320, 200);

    // No original stored locally; the in-memory blob is the source.
    let thumb =
        thumbnail::ensure_thumbnail_from(&local, "fresh.jpg", &bytes).expect("generate");
    assert!(local.file_exists(&thumb).expect("exists check"));
}

#[test]
fn generation_failure_is_an_error_not_a_panic() {
    let local = InMemoryLocalStorage::new();
    local
        .write_file("attachments/broken.jpg", b"not an image")
        .expect("write junk");

    let err = thumbnail::ensure_thumbnail(&local, "broken.jpg");
    assert!(err.is_err());
    assert!(!local
        .file_exists("attachments/broken_thumb.jpg")
        .expect("exists check"));
}

#[test]
fn delete_cascades_to_thumbnail_only() {
    let local = InMemoryLocalStorage::new();
    local
        .write_file("attachments/photo.jpg", &sample_jpeg(64, 64))
        .expect("write original");
    thumbnail::ensure_thumbnail(&local, "photo.jpg").expect("generate");

    thumbnail::delete_thumbnail(&local, "photo.jpg").expect("delete thumbnail");
    assert!(!local
        .file_exists("attachments/photo_thumb.jpg")
        .expect("exists check"));
    assert!(local
        .file_exists("attachments/photo.jpg")
        .expect("original untouched"));
}
