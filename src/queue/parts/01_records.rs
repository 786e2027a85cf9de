/// Partial input to the record factory. Anything absent gets a default.
#[derive(Clone, Debug, Default)]
pub struct PartialAttachment {
    pub id: Option<String>,
    pub filename: Option<String>,
    pub media_type: Option<String>,
    pub state: Option<AttachmentState>,
    pub size: Option<i64>,
    pub local_uri: Option<String>,
}

/// Record factory. Invoked by the upload path (explicit id/filename/media
/// type/size) and by the desired-id watcher for remote-only ids (id only,
/// everything else defaulted).
pub fn new_attachment_record(partial: PartialAttachment) -> AttachmentRecord {
    let id = partial
        .id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let filename = partial.filename.unwrap_or_else(|| format!("{id}.jpg"));
    AttachmentRecord {
        id,
        filename,
        media_type: partial
            .media_type
            .unwrap_or_else(|| "image/jpeg".to_string()),
        state: partial.state.unwrap_or(AttachmentState::QueuedUpload),
        size: partial.size,
        local_uri: partial.local_uri,
        timestamp_ms: db::now_ms(),
    }
}

/// The uuid stem of a content filename; this is the attachment id.
pub fn filename_stem(filename: &str) -> &str {
    match filename.split_once('.') {
        Some((stem, _)) => stem,
        None => filename,
    }
}

pub fn extension_for_media_type(media_type: &str) -> &'static str {
    match media_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}
