//! Image and PDF compression endpoints.

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::Response,
};
use tracing::{info, warn};

use super::upload::{
    allowed_file, attachment, collect_files, secure_filename, zip_entries, UploadedFile,
    ALLOWED_IMAGE_EXTENSIONS, ALLOWED_PDF_EXTENSIONS,
};
use super::{run_blocking, ApiError, AppState};
use crate::compressor::CompressedImage;
use crate::error::CompressError;

const BATCH_ARCHIVE_NAME: &str = "compressed_images.zip";

/// `POST /api/compress/image`
///
/// One file comes back as the compressed image, several as a zip.
pub async fn compress_image_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut files = collect_files(&mut multipart, "files").await?;
    if files.iter().all(|f| f.filename.is_empty()) {
        let error = if files.is_empty() {
            "No files provided"
        } else {
            "No selected file(s)"
        };
        return Err(ApiError::BadRequest(error.to_string()));
    }

    if files.len() > 1 {
        return compress_image_batch(&state, files).await;
    }
    match files.pop() {
        Some(file) => compress_single_image(&state, file).await,
        None => Err(ApiError::BadRequest("No files provided".to_string())),
    }
}

async fn compress_single_image(
    state: &Arc<AppState>,
    file: UploadedFile,
) -> Result<Response, ApiError> {
    if !allowed_file(&file.filename, &ALLOWED_IMAGE_EXTENSIONS) {
        return Err(ApiError::BadRequest("File type not allowed".to_string()));
    }

    let download_name = format!("compressed_{}", secure_filename(&file.filename));
    let compressed =
        run_blocking(state, move |s| s.images.compress(&file.data, &file.filename)).await??;

    Ok(attachment(
        compressed.format.mime_type(),
        &download_name,
        compressed.bytes,
    ))
}

/// Compress files one after another; disallowed or undecodable files are
/// left out of the archive.
async fn compress_image_batch(
    state: &Arc<AppState>,
    files: Vec<UploadedFile>,
) -> Result<Response, ApiError> {
    archive_batch(state, files, |s: &AppState, data: &[u8], name: &str| {
        s.images.compress(data, name)
    })
    .await
}

async fn archive_batch<F>(
    state: &Arc<AppState>,
    files: Vec<UploadedFile>,
    compress: F,
) -> Result<Response, ApiError>
where
    F: Fn(&AppState, &[u8], &str) -> Result<CompressedImage, CompressError>
        + Copy
        + Send
        + 'static,
{
    let total = files.len();
    let mut entries: Vec<(String, Vec<u8>)> = Vec::with_capacity(total);
    let mut used_names: HashSet<String> = HashSet::new();

    for file in files {
        if !allowed_file(&file.filename, &ALLOWED_IMAGE_EXTENSIONS) {
            warn!(filename = %file.filename, "File not allowed, skipping");
            continue;
        }

        let safe_name = secure_filename(&file.filename);
        let original_name = file.filename.clone();
        let outcome = run_blocking(state, move |s| compress(s, &file.data, &file.filename)).await;

        match outcome {
            Ok(Ok(compressed)) => {
                let mut entry_name = format!("compressed_{}", safe_name);
                let mut n = 1;
                while used_names.contains(&entry_name) {
                    entry_name = format!("compressed_{}_{}", n, safe_name);
                    n += 1;
                }
                used_names.insert(entry_name.clone());
                entries.push((entry_name, compressed.bytes));
            }
            Ok(Err(e)) => {
                warn!(filename = %original_name, error = %e, "Compression failed, skipping");
            }
            Err(e) => {
                warn!(filename = %original_name, error = %e, "Compression worker failed, skipping");
            }
        }
    }

    if entries.is_empty() {
        return Err(CompressError::EmptyInput.into());
    }

    info!(files = total, archived = entries.len(), "Batch compression finished");
    let archive = zip_entries(&entries)?;
    Ok(attachment("application/zip", BATCH_ARCHIVE_NAME, archive))
}

/// `POST /api/compress/pdf`
pub async fn compress_pdf_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut files = collect_files(&mut multipart, "file").await?;
    if files.is_empty() {
        return Err(ApiError::BadRequest("No file provided".to_string()));
    }
    let file = files.swap_remove(0);

    if file.filename.is_empty() {
        return Err(ApiError::BadRequest("No file selected".to_string()));
    }
    if !allowed_file(&file.filename, &ALLOWED_PDF_EXTENSIONS) {
        return Err(ApiError::BadRequest("File type not allowed".to_string()));
    }

    let download_name = format!("compressed_{}", secure_filename(&file.filename));
    let rewritten = run_blocking(&state, move |s| s.pdfs.compress(&file.data)).await??;

    Ok(attachment("application/pdf", &download_name, rewritten.bytes))
}
