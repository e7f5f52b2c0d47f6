//! Blob key derivation and content types for persisted assets.
//!
//! Keys are a pure function of the job id so that repeating a download
//! overwrites the same object instead of creating a second copy.

use crate::types::JobId;

/// Prefix under which finished videos are stored.
pub const VIDEO_PREFIX: &str = "videos";

/// Extension used for provider results.
pub const VIDEO_EXTENSION: &str = "mp4";

/// Fallback content type when the extension is unknown.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Deterministic blob key for a job's finished video.
pub fn video_key(job_id: JobId) -> String {
    format!("{VIDEO_PREFIX}/{job_id}.{VIDEO_EXTENSION}")
}

/// Content type for a blob key, based on its extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    let ext = key
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

/// Join a public base URL and a blob key into a retrieval URL.
pub fn public_url(base_url: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Reject keys that could escape the storage root.
pub fn is_safe_key(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with('/')
        && !key.contains('\\')
        && key.split('/').all(|segment| !segment.is_empty() && segment != "..")
}
