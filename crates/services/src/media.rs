//! # MediaService
//!
//! Validates a single image upload, names it, stores it, and hands back a
//! link that stops authorizing retrieval after [`MEDIA_URL_TTL`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domains::{DomainError, MediaObject, MediaStorage, MediaUpload, Result};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::context::RequestContext;

/// Retrieval links are valid for exactly one day.
pub const MEDIA_URL_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default cap on a single upload (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Longest client-supplied extension kept in generated names.
const MAX_EXTENSION_LEN: usize = 8;

pub struct MediaService {
    store: Arc<dyn MediaStorage>,
    max_upload_bytes: usize,
}

impl MediaService {
    pub fn new(store: Arc<dyn MediaStorage>, max_upload_bytes: usize) -> Self {
        Self { store, max_upload_bytes }
    }

    /// Runs the full ingestion workflow. Validation failures never reach the
    /// store.
    #[instrument(skip(self, ctx, upload), fields(size = upload.data.len()))]
    pub async fn ingest(&self, ctx: &RequestContext, upload: MediaUpload) -> Result<MediaObject> {
        let content_type = allowed_content_type(upload.content_type.as_deref())?;
        if upload.data.is_empty() {
            return Err(DomainError::invalid("uploaded file is empty"));
        }
        if upload.data.len() > self.max_upload_bytes {
            return Err(DomainError::invalid(format!(
                "uploaded file exceeds {} bytes",
                self.max_upload_bytes
            )));
        }

        let name = object_name(upload.original_name.as_deref(), &content_type);
        let size = ctx
            .run(self.store.put_object(&name, content_type.essence_str(), upload.data))
            .await
            .inspect_err(|err| error!(error = %err, object = %name, "media upload failed"))?;

        let created_at = Utc::now();
        let url = ctx
            .run(self.store.presigned_url(&name, MEDIA_URL_TTL))
            .await
            .inspect_err(|err| error!(error = %err, object = %name, "presigning failed"))?;

        info!(object = %name, size, "media stored");
        Ok(MediaObject {
            name,
            size,
            content_type: content_type.essence_str().to_string(),
            url,
            expires_at: created_at + chrono::Duration::seconds(MEDIA_URL_TTL.as_secs() as i64),
            created_at,
        })
    }
}

/// Accepts JPEG (both spellings) and PNG only. Parameters are ignored.
pub fn allowed_content_type(declared: Option<&str>) -> Result<mime::Mime> {
    let invalid = || DomainError::invalid("invalid file type");
    let parsed: mime::Mime = declared
        .ok_or_else(invalid)?
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| invalid())?;

    if parsed.type_() != mime::IMAGE {
        return Err(invalid());
    }
    match parsed.subtype().as_str() {
        "jpeg" | "png" => Ok(parsed),
        // Non-standard spelling that browsers still send.
        "jpg" => Ok(mime::IMAGE_JPEG),
        _ => Err(invalid()),
    }
}

/// `<uuid>.<ext>`. The client's extension is kept only when it names the
/// validated content type, so a stored object never advertises another type.
pub fn object_name(original: Option<&str>, content_type: &mime::Mime) -> String {
    let ext = original
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_LEN
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
                && mime_guess::from_ext(ext)
                    .iter()
                    .any(|guess| guess.essence_str() == content_type.essence_str())
        })
        .unwrap_or_else(|| canonical_extension(content_type).to_string());

    format!("{}.{}", Uuid::new_v4(), ext)
}

fn canonical_extension(content_type: &mime::Mime) -> &'static str {
    if content_type.subtype() == mime::PNG {
        return "png";
    }
    mime_guess::get_mime_extensions(content_type)
        .and_then(|exts| exts.iter().find(|e| **e == "jpg").or_else(|| exts.first()))
        .copied()
        .unwrap_or("jpg")
}
