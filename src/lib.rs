//! Yukomp
//!
//! Adaptive compression for uploaded images and PDFs, plus JPEG-to-PDF
//! assembly, served over HTTP.
//!
//! Images are re-encoded through a bounded quality/downscale ladder aiming at
//! a fraction of the original size picked from a size table. PDFs get their
//! page images re-encoded as JPEG and their page tree rebuilt. Neither path
//! ever returns more bytes than it was given.

pub mod api;
pub mod assembler;
pub mod compressor;
pub mod config;
pub mod encoder;
pub mod error;
pub mod pdf;
pub mod raster;
pub mod scratch;
pub mod size;

pub use assembler::PdfAssembler;
pub use compressor::{AdaptiveImageCompressor, CompressedImage, SizePolicy, SizeTarget};
pub use config::ServiceConfig;
pub use encoder::{CompressionParams, ImageEncoder, OutputFormat, RasterEncoder};
pub use error::{CompressError, EncodeError};
pub use pdf::{PdfPageRewriter, RewrittenPdf};
pub use raster::RasterImage;
pub use size::EncodedSize;

/// In-memory fixtures for unit tests.
#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Cursor;

    use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};

    /// Deterministic pseudo-random bytes (64-bit LCG).
    pub fn noise_bytes(len: usize) -> Vec<u8> {
        let mut state: u64 = 0x2545_F491_4F6C_DD1D;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                (state >> 33) as u8
            })
            .collect()
    }

    /// Noise compresses badly, which keeps size-driven tests honest.
    pub fn noise_rgb(width: u32, height: u32) -> DynamicImage {
        let data = noise_bytes((width * height * 3) as usize);
        DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, data).unwrap())
    }

    pub fn noise_rgba(width: u32, height: u32) -> DynamicImage {
        let data = noise_bytes((width * height * 4) as usize);
        DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, data).unwrap())
    }

    pub fn encode_jpeg_at(img: &DynamicImage, quality: u8) -> Vec<u8> {
        crate::encoder::encode_jpeg(img, quality).unwrap()
    }

    pub fn encode_png_of(img: &DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }
}
