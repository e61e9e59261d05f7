//! Decoded raster images and the pixel-level steps applied before encoding.

use image::imageops::FilterType;
use image::{DynamicImage, ImageError, Rgb, RgbImage};

use crate::encoder::OutputFormat;

/// Pixel layout of a decoded image.
///
/// Palette images never show up here: the decoder expands them to
/// truecolor, or to truecolor-with-alpha when they carry transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    Truecolor,
    TruecolorAlpha,
    Other,
}

/// A decoded pixel buffer. Each compression attempt works on its own copy.
#[derive(Debug, Clone)]
pub struct RasterImage {
    pixels: DynamicImage,
}

impl RasterImage {
    pub fn new(pixels: DynamicImage) -> Self {
        Self { pixels }
    }

    /// Decode any format the image crate recognizes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ImageError> {
        image::load_from_memory(bytes).map(Self::new)
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn into_pixels(self) -> DynamicImage {
        self.pixels
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn longest_side(&self) -> u32 {
        self.width().max(self.height())
    }

    pub fn mode(&self) -> ColorMode {
        match self.pixels {
            DynamicImage::ImageRgb8(_) => ColorMode::Truecolor,
            DynamicImage::ImageRgba8(_) => ColorMode::TruecolorAlpha,
            _ => ColorMode::Other,
        }
    }

    pub fn has_alpha(&self) -> bool {
        self.pixels.color().has_alpha()
    }

    /// Convert to the color mode the output format expects.
    ///
    /// PNG keeps transparency when the source has any and otherwise becomes
    /// truecolor. JPEG has no alpha, so transparent pixels are composited
    /// onto white first.
    pub fn normalized_for(self, format: OutputFormat) -> Self {
        match format {
            OutputFormat::Png if self.has_alpha() => self.into_truecolor_alpha(),
            OutputFormat::Png => self.into_truecolor(),
            OutputFormat::Jpeg => self.flatten_onto_white(),
        }
    }

    pub fn into_truecolor_alpha(self) -> Self {
        match self.pixels {
            DynamicImage::ImageRgba8(_) => self,
            other => Self::new(DynamicImage::ImageRgba8(other.to_rgba8())),
        }
    }

    pub fn into_truecolor(self) -> Self {
        match self.pixels {
            DynamicImage::ImageRgb8(_) => self,
            other => Self::new(DynamicImage::ImageRgb8(other.to_rgb8())),
        }
    }

    /// Composite onto an opaque white background, yielding truecolor.
    pub fn flatten_onto_white(self) -> Self {
        if !self.has_alpha() {
            return self.into_truecolor();
        }

        let rgba = self.pixels.to_rgba8();
        let (width, height) = rgba.dimensions();
        let mut flat = RgbImage::new(width, height);

        for (dst, src) in flat.pixels_mut().zip(rgba.pixels()) {
            let alpha = src.0[3] as u32;
            let blend = |c: u8| ((c as u32 * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
            *dst = Rgb([blend(src.0[0]), blend(src.0[1]), blend(src.0[2])]);
        }

        Self::new(DynamicImage::ImageRgb8(flat))
    }

    /// Shrink so the longest side is at most `max_side`, keeping the aspect
    /// ratio. Images that already fit are returned unchanged.
    pub fn downscaled_to_fit(&self, max_side: u32) -> Self {
        let (width, height) = (self.width(), self.height());
        if width <= max_side && height <= max_side {
            return self.clone();
        }

        let ratio = (max_side as f64 / width as f64).min(max_side as f64 / height as f64);
        let new_width = ((width as f64 * ratio) as u32).max(1);
        let new_height = ((height as f64 * ratio) as u32).max(1);

        tracing::debug!(width, height, new_width, new_height, "Downscaling");
        self.resized_exact(new_width, new_height)
    }

    /// Resample to exact dimensions with Lanczos filtering.
    pub fn resized_exact(&self, width: u32, height: u32) -> Self {
        Self::new(self.pixels.resize_exact(width, height, FilterType::Lanczos3))
    }
}
