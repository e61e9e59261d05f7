//! JPEG-to-PDF conversion endpoint.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Response,
};
use chrono::Local;

use super::upload::{attachment, collect_files};
use super::{run_blocking, ApiError, AppState};
use crate::error::CompressError;
use crate::raster::RasterImage;

/// `POST /api/convert/jpg-to-pdf`
///
/// Every non-empty upload becomes one page, in request order.
pub async fn jpg_to_pdf_handler(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let files = collect_files(&mut multipart, "files").await?;
    if files.is_empty() {
        return Err(ApiError::Rejected {
            error: "No files provided",
            message: "Please provide image files to convert",
        });
    }

    let uploads: Vec<_> = files
        .into_iter()
        .filter(|f| !f.filename.is_empty())
        .collect();

    let assembled = run_blocking(&state, move |s| {
        let images = uploads
            .iter()
            .map(|f| RasterImage::decode(&f.data).map_err(CompressError::Decode))
            .collect::<Result<Vec<_>, _>>()?;
        s.assembler.assemble(&images)
    })
    .await?;

    let pdf_bytes = match assembled {
        Ok(bytes) => bytes,
        Err(CompressError::EmptyInput) => {
            return Err(ApiError::NoValidImages {
                message: "No valid image files were provided".to_string(),
            })
        }
        Err(e) => {
            return Err(ApiError::Conversion {
                message: e.to_string(),
            })
        }
    };

    let filename = format!("converted_{}.pdf", Local::now().format("%Y%m%d_%H%M%S"));
    Ok(attachment("application/pdf", &filename, pdf_bytes))
}

/// Bare `OPTIONS` without CORS preflight headers.
pub async fn preflight_handler() -> StatusCode {
    StatusCode::OK
}
