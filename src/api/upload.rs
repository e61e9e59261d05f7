//! Multipart intake, filename rules and response packaging.

use std::io::{Cursor, Write};

use axum::{
    body::Bytes,
    extract::Multipart,
    http::header,
    response::{IntoResponse, Response},
};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::ApiError;

pub const ALLOWED_IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];
pub const ALLOWED_PDF_EXTENSIONS: [&str; 1] = ["pdf"];

/// Used when sanitizing leaves nothing of a filename.
const FALLBACK_FILENAME: &str = "upload";

/// One file part of a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// As sent by the client; empty when no filename was given.
    pub filename: String,
    pub data: Bytes,
}

/// All file parts named `field_name`, in request order.
pub async fn collect_files(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let filename = field.file_name().unwrap_or("").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;
        files.push(UploadedFile { filename, data });
    }

    Ok(files)
}

/// Whether the text after the last dot is one of `allowed` (any case).
pub fn allowed_file(filename: &str, allowed: &[&str]) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| allowed.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Reduce a client filename to a safe ASCII name without path components.
pub fn secure_filename(filename: &str) -> String {
    let flattened: String = filename
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = flattened.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// A download response.
pub fn attachment(content_type: &str, filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// Deflate-compressed zip of `(name, bytes)` entries.
pub fn zip_entries(entries: &[(String, Vec<u8>)]) -> Result<Vec<u8>, ApiError> {
    let zip_error = |e: zip::result::ZipError| ApiError::Compression(e.to_string());

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, data) in entries {
        zip.start_file(name.as_str(), options).map_err(zip_error)?;
        zip.write_all(data)
            .map_err(|e| ApiError::Compression(e.to_string()))?;
    }

    let cursor = zip.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}
