//! Upload intake handler
//!
//! Accepts a single multipart file field, checks its MIME prefix and
//! size, and answers with a self-contained data URL so no server-side
//! file storage is involved. Each rejection reason is its own 400.

use crate::gateway::{ApiError, AppState};
use axum::extract::{Multipart, State};
use axum::Json;
use base64::Engine;
use serde::Serialize;

/// MIME prefixes accepted for upload
const ALLOWED_MIME_PREFIXES: &[&str] = &["image/", "video/"];

/// Fallback file name when the client omits one
const DEFAULT_FILE_NAME: &str = "upload";

/// Successful upload response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Data URL carrying the full file content
    pub url: String,
    /// Thumbnail URL; same data URL, scaling is a client concern
    pub thumb_url: String,
    /// Declared MIME type
    pub mime: String,
    /// File size in bytes
    pub size: u64,
    /// Original file name
    pub name: String,
}

/// POST /api/upload
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> std::result::Result<Json<UploadResponse>, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("malformed multipart body: {}", e)))?
    {
        // The file field is the one carrying a content type.
        let Some(mime) = field.content_type().map(String::from) else {
            continue;
        };
        if !allowed_mime(&mime) {
            return Err(ApiError::bad_request(format!(
                "unsupported file type '{}': only image/* and video/* are accepted",
                mime
            )));
        }

        let name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_FILE_NAME)
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {}", e)))?;

        let size = bytes.len() as u64;
        if size > state.upload_max_bytes {
            return Err(ApiError::bad_request(format!(
                "file is {} bytes, exceeding the {} byte limit",
                size, state.upload_max_bytes
            )));
        }

        tracing::info!(name = %name, mime = %mime, size, "Accepted upload");
        let url = data_url(&mime, &bytes);
        return Ok(Json(UploadResponse {
            thumb_url: url.clone(),
            url,
            mime,
            size,
            name,
        }));
    }

    Err(ApiError::bad_request("no file field in upload"))
}

/// Whether the MIME type passes the prefix allow-list
fn allowed_mime(mime: &str) -> bool {
    ALLOWED_MIME_PREFIXES
        .iter()
        .any(|prefix| mime.starts_with(prefix))
}

/// Encode file content as a data URL
fn data_url(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_mime_prefixes() {
        assert!(allowed_mime("image/png"));
        assert!(allowed_mime("image/jpeg"));
        assert!(allowed_mime("video/mp4"));
        assert!(!allowed_mime("application/pdf"));
        assert!(!allowed_mime("text/plain"));
        assert!(!allowed_mime("imagex/png"));
    }

    #[test]
    fn test_data_url_round_trip() {
        let url = data_url("image/png", b"\x89PNG");
        assert!(url.starts_with("data:image/png;base64,"));
        let encoded = url.rsplit(',').next().unwrap();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .unwrap();
        assert_eq!(decoded, b"\x89PNG");
    }

    #[test]
    fn test_data_url_empty_file() {
        assert_eq!(data_url("image/gif", b""), "data:image/gif;base64,");
    }
}
