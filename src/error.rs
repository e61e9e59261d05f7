//! Error types shared by the compression engine.

use thiserror::Error;

/// A single encode attempt failed.
///
/// The retry ladder recovers from these locally: it falls back to the best
/// attempt seen so far, and the compressor falls back to the original bytes.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Image too large for JPEG: {width}x{height}")]
    DimensionsTooLarge { width: u32, height: u32 },

    #[error("Failed to encode JPEG: {0}")]
    Jpeg(#[from] jpeg_encoder::EncodingError),

    #[error("Failed to encode PNG: {0}")]
    Png(#[from] png::EncodingError),

    #[error("Failed to encode image: {0}")]
    Image(#[from] image::ImageError),
}

/// Errors surfaced by the engine to its caller.
#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Failed to open PDF: {0}")]
    PdfOpen(#[source] lopdf::Error),

    #[error("Failed to save PDF: {0}")]
    PdfSave(String),

    #[error("Failed to encode image: {0}")]
    Encode(#[from] EncodeError),

    #[error("No valid images were provided")]
    EmptyInput,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompressError {
    /// Whether nothing usable was left to process after filtering.
    ///
    /// Unreadable files are service failures like any other.
    pub fn is_bad_input(&self) -> bool {
        matches!(self, CompressError::EmptyInput)
    }
}
