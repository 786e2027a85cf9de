use std::sync::Arc;

use sitetrace_rust::config::SyncConfig;
use sitetrace_rust::db::{self, AttachmentRecord, AttachmentState, ImageRow};
use sitetrace_rust::db::watch::TableWatcher;
use sitetrace_rust::queue::AttachmentQueue;
use sitetrace_rust::store::{InMemoryLocalStorage, InMemoryRemoteStorage, LocalStorage, RemoteStorage};

#[test]
fn download_uses_logical_row_filename_when_record_diverges() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(temp.path()).expect("open db");

    // Record says .jpg, but the authoritative logical row says .png and only
    // the .png object exists remotely (historical naming drift).
    let record = AttachmentRecord {
        id: "abc".to_string(),
        filename: "abc.jpg".to_string(),
        media_type: "image/jpeg".to_string(),
        state: AttachmentState::QueuedDownload,
        size: None,
        local_uri: None,
        timestamp_ms: 1,
    };
    db::upsert_attachment_record(&conn, &record).expect("seed record");

    let row = ImageRow {
        id: "row-abc".to_string(),
        image_id: Some("abc.png".to_string()),
        image_url: None,
        asset_id: Some("asset-1".to_string()),
        point_id: None,
        gateway_id: None,
        site_id: None,
        enabled: true,
        created_at_ms: 1,
        updated_at_ms: 1,
    };
    db::insert_replicated_image(&conn, &row).expect("seed image row");

    let remote = Arc::new(InMemoryRemoteStorage::new());
    remote
        .upload_file("abc.png", b"png bytes", "image/png", true)
        .expect("seed remote blob");

    let local = Arc::new(InMemoryLocalStorage::new());
    let queue = AttachmentQueue::new(
        temp.path().to_path_buf(),
        Arc::clone(&local) as Arc<dyn LocalStorage>,
        remote,
        Arc::new(TableWatcher::new()),
        SyncConfig::default(),
    );

    let downloaded = queue.trigger_downloads(&conn).expect("download pass");
    assert_eq!(downloaded, 1);

    assert!(local
        .file_exists("attachments/abc.png")
        .expect("exists check"));
    assert!(!local
        .file_exists("attachments/abc.jpg")
        .expect("exists check"));
    assert_eq!(local.read_file("attachments/abc.png").expect("read"), b"png bytes");

    let record = db::get_attachment_record(&conn, "abc")
        .expect("get record")
        .expect("record exists");
    assert_eq!(record.filename, "abc.png");
    assert_eq!(record.state, AttachmentState::Synced);
}

#[test]
fn missing_logical_row_falls_back_to_record_filename() {
    let temp = tempfile::tempdir().expect("tempdir");
    let conn = db::open(temp.path()).expect("open db");

    let record = AttachmentRecord {
        id: "solo".to_string(),
        filename: "solo.jpg".to_string(),
        media_type: "image/jpeg".to_string(),
        state: AttachmentState::QueuedDownload,
        size: None,
        local_uri: None,
        timestamp_ms: 1,
    };
    db::upsert_attachment_record(&conn, &record).expect("seed record");

    let remote = Arc::new(InMemoryRemoteStorage::new());
    remote
        .upload_file("solo.jpg", b"jpg bytes", "image/jpeg", true)
        .expect("seed remote blob");

    let local = Arc::new(InMemoryLocalStorage::new());
    let queue = AttachmentQueue::new(
        temp.path().to_path_buf(),
        Arc::clone(&local) as Arc<dyn LocalStorage>,
        remote,
        Arc::new(TableWatcher::new()),
        SyncConfig::default(),
    );

    assert_eq!(queue.trigger_downloads(&conn).expect("download pass"), 1);
    assert!(local
        .file_exists("attachments/solo.jpg")
        .expect("exists check"));
}
