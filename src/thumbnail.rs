use anyhow::Result;
use image::imageops::FilterType;

use crate::queue::attachment_rel_path;
use crate::store::LocalStorage;

pub const THUMBNAIL_SIZE: u32 = 150;
const JPEG_QUALITY: u8 = 80;

/// `<stem>_thumb.<ext>` next to the original.
pub fn thumbnail_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_thumb.{ext}"),
        None => format!("{filename}_thumb"),
    }
}

pub fn thumbnail_rel_path(filename: &str) -> String {
    attachment_rel_path(&thumbnail_filename(filename))
}

/// Idempotent lookup-or-generate: an existing thumbnail is returned without
/// regenerating. The source is the locally stored original.
pub fn ensure_thumbnail(local: &dyn LocalStorage, filename: &str) -> Result<String> {
    let source = |local: &dyn LocalStorage| local.read_file(&attachment_rel_path(filename));
    ensure_thumbnail_inner(local, filename, source)
}

/// Same as [`ensure_thumbnail`] but renders from already-available bytes
/// (fresh capture, fetched full-resolution image) instead of re-reading the
/// local tier.
pub fn ensure_thumbnail_from(
    local: &dyn LocalStorage,
    filename: &str,
    bytes: &[u8],
) -> Result<String> {
    ensure_thumbnail_inner(local, filename, |_| Ok(bytes.to_vec()))
}

fn ensure_thumbnail_inner(
    local: &dyn LocalStorage,
    filename: &str,
    source: impl FnOnce(&dyn LocalStorage) -> Result<Vec<u8>>,
) -> Result<String> {
    let thumb_rel = thumbnail_rel_path(filename);
    if local.file_exists(&thumb_rel)? {
        return Ok(thumb_rel);
    }

    let bytes = source(local)?;
    let encoded = render_thumbnail(&bytes)?;
    local.write_file(&thumb_rel, &encoded)?;
    Ok(thumb_rel)
}

fn render_thumbnail(bytes: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(bytes)?;
    let resized = image::imageops::resize(
        &decoded.to_rgb8(),
        THUMBNAIL_SIZE,
        THUMBNAIL_SIZE,
        FilterType::Triangle,
    );

    let mut encoded = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&image::DynamicImage::ImageRgb8(resized))?;
    Ok(encoded)
}

/// Deleting a logical image cascades here; the original and remote blob are
/// left alone.
pub fn delete_thumbnail(local: &dyn LocalStorage, filename: &str) -> Result<()> {
    local.delete_file(&thumbnail_rel_path(filename))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumb_name_derivation() {
        assert_eq!(thumbnail_filename("abc.jpg"), "abc_thumb.jpg");
        assert_eq!(thumbnail_filename("a.b.png"), "a.b_thumb.png");
        assert_eq!(thumbnail_filename("noext"), "noext_thumb");
    }
}
