use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sitetrace_rust::api::ImageSyncService;
use sitetrace_rust::config::SyncConfig;
use sitetrace_rust::db::{self, AttachmentState, ImageAssociation};
use sitetrace_rust::queue::filename_stem;
use sitetrace_rust::store::{InMemoryLocalStorage, InMemoryRemoteStorage, LocalStorage, RemoteStorage};

/// A fresh capture commits its attachment record and its logical row as one
/// unit. A reconcile pass interleaving between the two would see a record id
/// missing from the desired set and archive the capture for good, so this
/// hammers full sync passes from a second connection while captures land.
#[test]
fn concurrent_passes_never_archive_a_fresh_capture() {
    let temp = tempfile::tempdir().expect("tempdir");
    let local = Arc::new(InMemoryLocalStorage::new());
    let remote = Arc::new(InMemoryRemoteStorage::new());

    let service = ImageSyncService::new(
        temp.path().to_path_buf(),
        Arc::clone(&local) as Arc<dyn LocalStorage>,
        Arc::clone(&remote) as Arc<dyn RemoteStorage>,
        SyncConfig::default(),
    );

    let stop = Arc::new(AtomicBool::new(false));
    let reconciler = {
        let stop = Arc::clone(&stop);
        let queue = Arc::clone(service.queue());
        let app_dir = temp.path().to_path_buf();
        std::thread::spawn(move || {
            let conn = db::open(&app_dir).expect("open reconciler db");
            while !stop.load(Ordering::Relaxed) {
                queue.trigger_sync(&conn);
            }
        })
    };

    let mut rows = Vec::new();
    for i in 0..10 {
        let row = service
            .upload_image(
                format!("capture {i}").as_bytes(),
                "image/jpeg",
                ImageAssociation::Asset(format!("A{i}")),
                None,
            )
            .expect("upload image");
        rows.push(row);
        std::thread::sleep(Duration::from_millis(2));
    }

    stop.store(true, Ordering::Relaxed);
    reconciler.join().expect("reconciler join");

    // Settle whatever the background passes did not finish.
    service.trigger_uploads().expect("final trigger");

    let conn = db::open(temp.path()).expect("open db");
    for row in &rows {
        let filename = row.image_id.as_deref().expect("content filename");
        let record = db::get_attachment_record(&conn, filename_stem(filename))
            .expect("get record")
            .expect("record exists");
        assert_ne!(
            record.state,
            AttachmentState::Archived,
            "capture {filename} was archived"
        );
        assert_eq!(record.state, AttachmentState::Synced);
        assert!(remote.contains(filename), "remote missing {filename}");
    }
}
