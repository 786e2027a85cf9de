use std::sync::Arc;

use image::{Rgb, RgbImage};
use sitetrace_rust::api::ImageSyncService;
use sitetrace_rust::config::SyncConfig;
use sitetrace_rust::db::{self, AttachmentState, ImageAssociation};
use sitetrace_rust::store::localfs::FsLocalStorage;
use sitetrace_rust::store::{InMemoryRemoteStorage, LocalStorage, RemoteStorage};
use sitetrace_rust::thumbnail;

fn sample_jpeg() -> Vec<u8> {
    let img = RgbImage::from_pixel(300, 300, Rgb([20, 120, 200]));
    let mut encoded = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 90)
        .encode_image(&image::DynamicImage::ImageRgb8(img))
        .expect("encode sample jpeg");
    encoded
}

#[test]
fn capture_on_one_device_lands_on_a_second_replica() {
    let remote = Arc::new(InMemoryRemoteStorage::new());
    let bytes = sample_jpeg();

    // Device A captures an image for asset A1.
    let temp_a = tempfile::tempdir().expect("tempdir A");
    let local_a = Arc::new(FsLocalStorage::new(temp_a.path().join("blobs")).expect("local A"));
    let service_a = ImageSyncService::new(
        temp_a.path().to_path_buf(),
        Arc::clone(&local_a) as Arc<dyn LocalStorage>,
        Arc::clone(&remote) as Arc<dyn RemoteStorage>,
        SyncConfig::default(),
    );

    let row = service_a
        .upload_image(
            &bytes,
            "image/jpeg",
            ImageAssociation::Asset("A1".to_string()),
            Some("site-1".to_string()),
        )
        .expect("upload image");
    assert_eq!(row.asset_id.as_deref(), Some("A1"));
    let filename = row.image_id.clone().expect("content filename");

    let status = service_a.sync_status().expect("status A");
    assert_eq!(status.pending_uploads, 1);
    assert_eq!(status.synced, 0);

    assert_eq!(service_a.trigger_uploads().expect("trigger uploads"), 1);
    let status = service_a.sync_status().expect("status A");
    assert_eq!(status.pending_uploads, 0);
    assert_eq!(status.synced, 1);
    assert!(remote.contains(&filename));

    // Local bytes resolve directly; the thumbnail variant resolves lazily.
    let uri = service_a.image_uri(&row, false).expect("image uri");
    assert_eq!(uri, format!("attachments/{filename}"));
    let thumb_uri = service_a.image_uri(&row, true).expect("thumb uri");
    assert_eq!(thumb_uri, thumbnail::thumbnail_rel_path(&filename));
    assert!(local_a.file_exists(&thumb_uri).expect("thumb exists"));

    // Device B sees the same logical row through row replication; no local
    // attachment record exists yet.
    let temp_b = tempfile::tempdir().expect("tempdir B");
    let local_b = Arc::new(FsLocalStorage::new(temp_b.path().join("blobs")).expect("local B"));
    let service_b = ImageSyncService::new(
        temp_b.path().to_path_buf(),
        Arc::clone(&local_b) as Arc<dyn LocalStorage>,
        Arc::clone(&remote) as Arc<dyn RemoteStorage>,
        SyncConfig::default(),
    );

    let conn_b = db::open(temp_b.path()).expect("open B db");
    db::insert_replicated_image(&conn_b, &row).expect("replicate row");
    assert!(db::get_attachment_record(&conn_b, stem(&filename))
        .expect("get record")
        .is_none());

    service_b.queue().trigger_sync(&conn_b);

    let status = service_b.sync_status().expect("status B");
    assert_eq!(status.synced, 1);
    assert_eq!(status.pending_downloads, 0);
    assert!(local_b
        .file_exists(&format!("attachments/{filename}"))
        .expect("exists check"));

    let record = db::get_attachment_record(&conn_b, stem(&filename))
        .expect("get record")
        .expect("record exists on B");
    assert_eq!(record.state, AttachmentState::Synced);

    // Soft delete on A: row disabled, thumbnail gone, blob and record stay.
    service_a.delete_image(&row.id).expect("delete image");
    let conn_a = db::open(temp_a.path()).expect("open A db");
    let row_after = db::get_image(&conn_a, &row.id).expect("get row");
    assert!(!row_after.enabled);
    assert!(!local_a
        .file_exists(&thumbnail::thumbnail_rel_path(&filename))
        .expect("thumb removed"));
    assert!(local_a
        .file_exists(&format!("attachments/{filename}"))
        .expect("original kept"));
    assert!(remote.contains(&filename));
}

fn stem(filename: &str) -> &str {
    filename.split('.').next().unwrap_or(filename)
}
