//! JPEG-to-PDF assembly: one page per image, fixed width, white margins.

use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use tracing::{debug, info};

use crate::encoder::encode_jpeg;
use crate::error::{CompressError, EncodeError};
use crate::raster::RasterImage;

/// Tallest page a baseline JPEG can hold.
pub const MAX_PAGE_HEIGHT_PX: u32 = u16::MAX as u32;

/// A4 width at 200 DPI.
pub const PAGE_WIDTH_PX: u32 = 1654;
pub const MARGIN_PX: u32 = 50;
pub const RESOLUTION_DPI: f32 = 200.0;
pub const JPEG_QUALITY: u8 = 90;

const POINTS_PER_INCH: f32 = 72.0;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Pixel geometry of one assembled page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub content_width: u32,
    pub content_height: u32,
    pub page_width: u32,
    pub page_height: u32,
}

impl PageLayout {
    /// Scale the image to the content width, keeping its aspect ratio.
    pub fn for_image(width: u32, height: u32) -> Self {
        let content_width = PAGE_WIDTH_PX - 2 * MARGIN_PX;
        let aspect = height as f64 / width.max(1) as f64;
        let content_height = ((content_width as f64 * aspect).round() as u32).max(1);

        Self {
            content_width,
            content_height,
            page_width: PAGE_WIDTH_PX,
            page_height: content_height + 2 * MARGIN_PX,
        }
    }

    /// Page size in points at [`RESOLUTION_DPI`].
    pub fn size_in_points(&self) -> (f32, f32) {
        let scale = POINTS_PER_INCH / RESOLUTION_DPI;
        (self.page_width as f32 * scale, self.page_height as f32 * scale)
    }
}

/// Builds a multi-page PDF from raster images, in input order.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfAssembler;

impl PdfAssembler {
    pub fn new() -> Self {
        Self
    }

    pub fn assemble(&self, images: &[RasterImage]) -> Result<Vec<u8>, CompressError> {
        if images.is_empty() {
            return Err(CompressError::EmptyInput);
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids = Vec::with_capacity(images.len());

        for (index, image) in images.iter().enumerate() {
            let layout = PageLayout::for_image(image.width(), image.height());
            if layout.page_height > MAX_PAGE_HEIGHT_PX {
                return Err(EncodeError::DimensionsTooLarge {
                    width: layout.page_width,
                    height: layout.page_height,
                }
                .into());
            }
            let canvas = render_page(image, &layout);
            let jpeg_bytes = encode_jpeg(&DynamicImage::ImageRgb8(canvas), JPEG_QUALITY)?;
            debug!(
                page = index + 1,
                width = layout.page_width,
                height = layout.page_height,
                size = jpeg_bytes.len(),
                "Rendered page"
            );

            let image_id = doc.add_object(Stream::new(
                dictionary! {
                    "Type" => "XObject",
                    "Subtype" => "Image",
                    "Width" => layout.page_width as i64,
                    "Height" => layout.page_height as i64,
                    "ColorSpace" => "DeviceRGB",
                    "BitsPerComponent" => 8i64,
                    "Filter" => "DCTDecode",
                },
                jpeg_bytes,
            ));

            let (width_pt, height_pt) = layout.size_in_points();
            let content = Content {
                operations: vec![
                    Operation::new("q", vec![]),
                    Operation::new(
                        "cm",
                        vec![
                            Object::Real(width_pt),
                            Object::Integer(0),
                            Object::Integer(0),
                            Object::Real(height_pt),
                            Object::Integer(0),
                            Object::Integer(0),
                        ],
                    ),
                    Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                    Operation::new("Q", vec![]),
                ],
            };
            let content_bytes = content
                .encode()
                .map_err(|e| CompressError::PdfSave(e.to_string()))?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![
                    Object::Integer(0),
                    Object::Integer(0),
                    Object::Real(width_pt),
                    Object::Real(height_pt),
                ],
                "Resources" => dictionary! {
                    "XObject" => dictionary! { "Im0" => image_id },
                },
                "Contents" => content_id,
            });
            kids.push(Object::Reference(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => images.len() as i64,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);
        doc.compress();

        let mut pdf_bytes = Vec::new();
        doc.save_to(&mut pdf_bytes)
            .map_err(|e| CompressError::PdfSave(e.to_string()))?;

        info!(pages = images.len(), size = pdf_bytes.len(), "Assembled PDF");
        Ok(pdf_bytes)
    }
}

/// Flatten, resize to the content box and paste onto a white page.
fn render_page(image: &RasterImage, layout: &PageLayout) -> RgbImage {
    let flat = image.clone().flatten_onto_white().into_pixels();
    let content = flat
        .resize_exact(layout.content_width, layout.content_height, FilterType::Lanczos3)
        .to_rgb8();

    let mut canvas = RgbImage::from_pixel(layout.page_width, layout.page_height, WHITE);
    imageops::replace(&mut canvas, &content, MARGIN_PX as i64, MARGIN_PX as i64);
    canvas
}
