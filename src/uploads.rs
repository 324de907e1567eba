// src/uploads.rs
//
// Media collaborator: accepts named binary uploads, persists them under a
// sanitized, time-prefixed name and serves them back by name. Plant
// documents only ever hold the generated filename.
use std::path::Path as FsPath;

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};

use crate::{AppError, AppState};

const ALLOWED_EXT: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

fn extension(filename: &str) -> Option<&str> {
    filename.rsplit_once('.').map(|(_, ext)| ext)
}

pub fn allowed_file(filename: &str) -> bool {
    extension(filename)
        .map(|ext| ALLOWED_EXT.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Keep only `[A-Za-z0-9._-]` from the final path segment and strip any
/// leading dots so the result can never escape the upload directory.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    cleaned.trim_start_matches(|c| c == '.' || c == '_').to_string()
}

/// Generated storage name: UTC millisecond prefix + sanitized original.
/// Returns `None` when the extension is not on the allow-list.
pub fn stored_name(now: DateTime<Utc>, original: &str) -> Option<String> {
    let safe = sanitize_filename(original);
    if safe.is_empty() || !allowed_file(&safe) {
        return None;
    }
    Some(format!("{}_{}", now.timestamp_millis(), safe))
}

/// Persist an upload and return the generated filename. The write completes
/// before the owning mutation may reference the name.
pub async fn store_photo(dir: &FsPath, original: &str, data: &[u8]) -> Result<String, AppError> {
    let filename = stored_name(Utc::now(), original)
        .ok_or_else(|| AppError::BadRequest("invalid file".into()))?;
    tokio::fs::write(dir.join(&filename), data).await.map_err(|e| {
        tracing::error!("failed to persist upload {}: {}", filename, e);
        AppError::Internal
    })?;
    Ok(filename)
}

fn content_type_for(filename: &str) -> &'static str {
    match extension(filename).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

// GET /api/plants/photo/:filename (no auth, original behavior)
pub async fn serve_photo_handler(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
        return Err(AppError::NotFound("photo not found".into()));
    }

    let bytes = tokio::fs::read(state.upload_dir.join(&filename))
        .await
        .map_err(|_| AppError::NotFound("photo not found".into()))?;

    Ok(([(header::CONTENT_TYPE, content_type_for(&filename))], bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_covers_the_four_image_types() {
        assert!(allowed_file("fern.png"));
        assert!(allowed_file("fern.JPG"));
        assert!(allowed_file("fern.jpeg"));
        assert!(allowed_file("fern.gif"));
        assert!(!allowed_file("fern.exe"));
        assert!(!allowed_file("fern"));
        assert!(!allowed_file(""));
    }

    #[test]
    fn sanitizing_strips_paths_and_odd_characters() {
        assert_eq!(sanitize_filename("my photo.png"), "my_photo.png");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("..\\..\\boot.ini"), "boot.ini");
        assert_eq!(sanitize_filename("café plant!.jpg"), "caf__plant_.jpg");
        assert_eq!(sanitize_filename("..."), "");
    }

    #[test]
    fn stored_name_is_time_prefixed_and_extension_checked() {
        let now = Utc::now();
        let name = stored_name(now, "ficus leaf.png").unwrap();
        assert_eq!(
            name,
            format!("{}_ficus_leaf.png", now.timestamp_millis())
        );
        assert!(stored_name(now, "virus.exe").is_none());
        assert!(stored_name(now, "noextension").is_none());
        assert!(stored_name(now, "..").is_none());
    }

    #[test]
    fn content_types_follow_the_extension() {
        assert_eq!(content_type_for("a.png"), "image/png");
        assert_eq!(content_type_for("a.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("a.gif"), "image/gif");
        assert_eq!(content_type_for("a.bin"), "application/octet-stream");
    }
}
