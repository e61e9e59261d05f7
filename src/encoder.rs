//! Encoding decoded rasters to JPEG or PNG at a given quality.

use std::borrow::Cow;

use color_quant::NeuQuant;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{DynamicImage, RgbImage};

use crate::error::EncodeError;
use crate::raster::{ColorMode, RasterImage};

/// PNG encodes below this quality are palette-reduced first.
pub const QUANTIZE_BELOW_QUALITY: u8 = 70;

/// NeuQuant sampling factor (1 = slowest/best, 30 = fastest).
const NEUQUANT_SAMPLE_FACTOR: i32 = 10;

/// Container format of a compressed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
}

impl OutputFormat {
    /// PNG for `.png` uploads (any case), JPEG for everything else.
    pub fn from_filename(filename: &str) -> Self {
        if filename.to_ascii_lowercase().ends_with(".png") {
            OutputFormat::Png
        } else {
            OutputFormat::Jpeg
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// Parameters of one encode attempt. A retry builds a new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionParams {
    pub format: OutputFormat,
    /// 1-100
    pub quality: u8,
    /// Longest side the image was scaled down to, if any.
    pub max_dimension: Option<u32>,
}

impl CompressionParams {
    pub fn new(format: OutputFormat, quality: u8) -> Self {
        Self {
            format,
            quality: quality.clamp(1, 100),
            max_dimension: None,
        }
    }

    pub fn with_quality(self, quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            ..self
        }
    }

    pub fn with_max_dimension(self, max_side: u32) -> Self {
        Self {
            max_dimension: Some(max_side),
            ..self
        }
    }
}

/// Number of palette colors used when a low-quality PNG is quantized.
pub fn palette_size(quality: u8) -> usize {
    let scaled = (256.0 * quality as f64 / 100.0).round() as usize;
    scaled.max(256)
}

/// Turns a raster into encoded bytes.
pub trait RasterEncoder {
    fn encode(&self, image: &RasterImage, params: &CompressionParams)
        -> Result<Vec<u8>, EncodeError>;
}

/// Encoder backed by jpeg-encoder, the image crate's PNG codec and NeuQuant.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageEncoder;

impl RasterEncoder for ImageEncoder {
    fn encode(
        &self,
        image: &RasterImage,
        params: &CompressionParams,
    ) -> Result<Vec<u8>, EncodeError> {
        match params.format {
            OutputFormat::Jpeg => encode_jpeg(image.pixels(), params.quality),
            OutputFormat::Png => encode_png(image, params.quality),
        }
    }
}

/// Encode as baseline JPEG with 4:2:0 subsampling and optimized Huffman tables.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let rgb: Cow<'_, RgbImage> = match img {
        DynamicImage::ImageRgb8(rgb) => Cow::Borrowed(rgb),
        other => Cow::Owned(other.to_rgb8()),
    };
    let (width, height) = rgb.dimensions();
    let too_large = || EncodeError::DimensionsTooLarge { width, height };
    let jpeg_width = u16::try_from(width).map_err(|_| too_large())?;
    let jpeg_height = u16::try_from(height).map_err(|_| too_large())?;

    let mut jpeg_bytes = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut jpeg_bytes, quality.clamp(1, 100));
    encoder.set_sampling_factor(jpeg_encoder::SamplingFactor::R_4_2_0);
    encoder.set_optimized_huffman_tables(true);
    encoder.encode(
        rgb.as_raw(),
        jpeg_width,
        jpeg_height,
        jpeg_encoder::ColorType::Rgb,
    )?;

    Ok(jpeg_bytes)
}

/// PNG is lossless, so "quality" only matters below the quantization
/// threshold, where truecolor images are reduced to a palette.
fn encode_png(image: &RasterImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    if image.mode() == ColorMode::Truecolor && quality < QUANTIZE_BELOW_QUALITY {
        return encode_quantized_png(image.pixels(), palette_size(quality));
    }

    let mut png_bytes = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut png_bytes, CompressionType::Default, PngFilter::Adaptive);
    image.pixels().write_with_encoder(encoder)?;
    Ok(png_bytes)
}

/// Reduce to at most `colors` palette entries and write an indexed PNG.
fn encode_quantized_png(img: &DynamicImage, colors: usize) -> Result<Vec<u8>, EncodeError> {
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();

    let quantizer = NeuQuant::new(NEUQUANT_SAMPLE_FACTOR, colors.min(256), rgba.as_raw());
    let palette = quantizer.color_map_rgb();
    let indices: Vec<u8> = rgba
        .as_raw()
        .chunks_exact(4)
        .map(|pixel| quantizer.index_of(pixel) as u8)
        .collect();

    let mut png_bytes = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut png_bytes, width, height);
        encoder.set_color(png::ColorType::Indexed);
        encoder.set_depth(png::BitDepth::Eight);
        encoder.set_palette(palette);
        encoder.set_compression(png::Compression::Default);

        let mut writer = encoder.write_header()?;
        writer.write_image_data(&indices)?;
        writer.finish()?;
    }

    Ok(png_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{noise_rgb, noise_rgba};
    use image::ImageFormat;

    #[test]
    fn format_follows_png_extension_case_insensitively() {
        assert_eq!(OutputFormat::from_filename("photo.PNG"), OutputFormat::Png);
        assert_eq!(OutputFormat::from_filename("photo.png"), OutputFormat::Png);
        assert_eq!(OutputFormat::from_filename("photo.jpeg"), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_filename("photo.JPG"), OutputFormat::Jpeg);
        assert_eq!(OutputFormat::from_filename("png"), OutputFormat::Jpeg);
    }

    #[test]
    fn palette_size_never_below_256() {
        for quality in 1..=100u8 {
            assert_eq!(palette_size(quality), 256);
        }
    }

    #[test]
    fn params_clamp_quality() {
        let params = CompressionParams::new(OutputFormat::Jpeg, 0);
        assert_eq!(params.quality, 1);
        assert_eq!(params.with_quality(250).quality, 100);
        assert_eq!(params.with_max_dimension(1920).max_dimension, Some(1920));
    }

    #[test]
    fn jpeg_quality_controls_size() {
        let image = RasterImage::new(noise_rgb(160, 120));
        let high = ImageEncoder
            .encode(&image, &CompressionParams::new(OutputFormat::Jpeg, 95))
            .unwrap();
        let low = ImageEncoder
            .encode(&image, &CompressionParams::new(OutputFormat::Jpeg, 20))
            .unwrap();

        assert!(low.len() < high.len());
        assert_eq!(image::guess_format(&low).unwrap(), ImageFormat::Jpeg);
        let decoded = image::load_from_memory(&low).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (160, 120));
    }

    #[test]
    fn png_keeps_alpha_channel() {
        let image = RasterImage::new(noise_rgba(64, 64));
        let bytes = ImageEncoder
            .encode(&image, &CompressionParams::new(OutputFormat::Png, 50))
            .unwrap();

        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        assert!(image::load_from_memory(&bytes).unwrap().color().has_alpha());
    }

    #[test]
    fn low_quality_truecolor_png_is_indexed() {
        let image = RasterImage::new(noise_rgb(128, 128));
        let bytes = ImageEncoder
            .encode(&image, &CompressionParams::new(OutputFormat::Png, 40))
            .unwrap();

        let decoder = png::Decoder::new(std::io::Cursor::new(&bytes));
        let reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().color_type, png::ColorType::Indexed);
        assert_eq!((reader.info().width, reader.info().height), (128, 128));
    }

    #[test]
    fn high_quality_truecolor_png_stays_rgb() {
        let image = RasterImage::new(noise_rgb(32, 32));
        let bytes = ImageEncoder
            .encode(&image, &CompressionParams::new(OutputFormat::Png, 85))
            .unwrap();

        let decoder = png::Decoder::new(std::io::Cursor::new(&bytes));
        let reader = decoder.read_info().unwrap();
        assert_eq!(reader.info().color_type, png::ColorType::Rgb);
    }
}
