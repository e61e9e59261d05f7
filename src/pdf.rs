//! PDF recompression.
//!
//! Walks every page of an uploaded PDF, re-encodes the raster images the page
//! draws as low-quality JPEG (substituted in place under the same object id),
//! then copies the pages into a fresh document with its own page tree and
//! saves it with unreferenced objects removed and streams deflated.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Read;
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use image::{DynamicImage, ImageFormat, RgbImage};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info, warn};

use crate::encoder::{CompressionParams, ImageEncoder, OutputFormat, RasterEncoder};
use crate::error::CompressError;
use crate::raster::RasterImage;
use crate::scratch::ScopedUpload;
use crate::size::EncodedSize;

/// JPEG quality for images embedded in PDFs. Single pass, no ladder.
pub const EMBEDDED_IMAGE_QUALITY: u8 = 30;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"MediaBox", b"CropBox", b"Rotate", b"Resources"];

/// Guard against cyclic /Parent chains.
const MAX_PAGE_TREE_DEPTH: usize = 64;

/// US Letter, for pages without any MediaBox.
const DEFAULT_MEDIA_BOX: [f32; 4] = [0.0, 0.0, 612.0, 792.0];

/// Dictionary entries of an image XObject that survive re-encoding.
const PRESERVED_IMAGE_KEYS: [&[u8]; 3] = [b"SMask", b"Intent", b"Interpolate"];

/// One raster image drawn by a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImageRef {
    pub page_index: usize,
    pub id: ObjectId,
    /// Length of the stream data as stored in the upload.
    pub original_size: usize,
}

/// Width and height of a page, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub media_box: [f32; 4],
}

impl PageGeometry {
    pub fn width(&self) -> f32 {
        (self.media_box[2] - self.media_box[0]).abs()
    }

    pub fn height(&self) -> f32 {
        (self.media_box[3] - self.media_box[1]).abs()
    }
}

/// Counters for one rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteReport {
    pub pages: usize,
    pub total_images: usize,
    pub substituted_images: usize,
    pub skipped_images: usize,
}

/// Output of [`PdfPageRewriter::compress`].
#[derive(Debug, Clone)]
pub struct RewrittenPdf {
    pub bytes: Vec<u8>,
    pub report: RewriteReport,
    /// True when the rewrite was not smaller and the upload was returned.
    pub kept_original: bool,
}

/// Source and output documents of one request, plus the scratch copy the
/// source was opened from. Dropping the handle releases all three.
pub struct PdfDocumentHandle {
    source: Document,
    output: Document,
    _upload: ScopedUpload,
}

impl PdfDocumentHandle {
    /// Copy the upload to a per-request scratch file and open it.
    pub fn open(pdf_bytes: &[u8], temp_dir: Option<&Path>) -> Result<Self, CompressError> {
        let upload = ScopedUpload::write(pdf_bytes, temp_dir, ".pdf")?;
        let source = Document::load(upload.path()).map_err(CompressError::PdfOpen)?;
        let output = Document::with_version(source.version.clone());

        Ok(Self {
            source,
            output,
            _upload: upload,
        })
    }

    /// Recompress page images in the source, then copy the pages into the
    /// output document.
    pub fn rewrite<E: RasterEncoder>(&mut self, encoder: &E, quality: u8) -> RewriteReport {
        let pages = self.source.get_pages();
        let mut report = RewriteReport {
            pages: pages.len(),
            ..RewriteReport::default()
        };
        let mut processed: HashSet<ObjectId> = HashSet::new();

        for (page_index, (&page_number, &page_id)) in pages.iter().enumerate() {
            let geometry = page_geometry(&self.source, page_id);
            debug!(
                page = page_number,
                width = geometry.width(),
                height = geometry.height(),
                "Rewriting page"
            );

            for image in embedded_images(&self.source, page_index, page_id) {
                if !processed.insert(image.id) {
                    continue;
                }
                report.total_images += 1;

                match recompress_embedded_image(&self.source, &image, encoder, quality) {
                    Ok(Some(stream)) => {
                        debug!(
                            page = page_number,
                            object = ?image.id,
                            from = image.original_size,
                            to = stream.content.len(),
                            "Substituted image"
                        );
                        self.source.objects.insert(image.id, Object::Stream(stream));
                        report.substituted_images += 1;
                    }
                    Ok(None) => {
                        debug!(page = page_number, object = ?image.id, "Re-encoded image not smaller, kept");
                        report.skipped_images += 1;
                    }
                    Err(e) => {
                        warn!(page = page_number, object = ?image.id, error = %e, "Skipping image");
                        report.skipped_images += 1;
                    }
                }
            }
        }

        self.copy_pages(&pages);
        report
    }

    /// Build the output page tree from flattened copies of the source pages.
    fn copy_pages(&mut self, pages: &BTreeMap<u32, ObjectId>) {
        self.output.objects = self.source.objects.clone();
        self.output.max_id = self.source.max_id;

        let pages_id = self.output.new_object_id();
        let mut kids = Vec::with_capacity(pages.len());

        for &page_id in pages.values() {
            let mut page = flattened_page(&self.source, page_id);
            page.set("Parent", Object::Reference(pages_id));
            self.output.objects.insert(page_id, Object::Dictionary(page));
            merge_page_contents(&mut self.output, page_id);
            kids.push(Object::Reference(page_id));
        }

        self.output.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => pages.len() as i64,
            }),
        );
        let catalog_id = self.output.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        self.output.trailer.set("Root", catalog_id);
        if let Ok(info) = self.source.trailer.get(b"Info") {
            self.output.trailer.set("Info", info.clone());
        }
    }

    /// Garbage-collect, deflate and serialize the output document.
    pub fn save(mut self) -> Result<Vec<u8>, CompressError> {
        let doc = &mut self.output;

        let pruned = doc.prune_objects();
        let emptied = doc.delete_zero_length_streams();
        doc.renumber_objects();
        doc.compress();
        debug!(
            pruned = pruned.len(),
            empty_streams = emptied.len(),
            objects = doc.objects.len(),
            "Cleaned output document"
        );

        let mut output_bytes = Vec::new();
        doc.save_to(&mut output_bytes)
            .map_err(|e| CompressError::PdfSave(e.to_string()))?;
        Ok(output_bytes)
    }
}

/// Recompresses PDF uploads.
#[derive(Debug, Clone)]
pub struct PdfPageRewriter {
    temp_dir: Option<PathBuf>,
    quality: u8,
    encoder: ImageEncoder,
}

impl Default for PdfPageRewriter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PdfPageRewriter {
    /// Scratch copies go to `temp_dir`, or the system temp dir.
    pub fn new(temp_dir: Option<PathBuf>) -> Self {
        Self {
            temp_dir,
            quality: EMBEDDED_IMAGE_QUALITY,
            encoder: ImageEncoder,
        }
    }

    /// Rewrite `pdf_bytes`. Open and save failures are fatal, per-image
    /// failures are not. Never returns more bytes than it was given.
    pub fn compress(&self, pdf_bytes: &[u8]) -> Result<RewrittenPdf, CompressError> {
        let original_size = EncodedSize::of(pdf_bytes);
        info!(size = original_size.bytes(), "Starting PDF compression");

        let mut handle = PdfDocumentHandle::open(pdf_bytes, self.temp_dir.as_deref())?;
        let report = handle.rewrite(&self.encoder, self.quality);
        let bytes = handle.save()?;

        if bytes.len() >= original_size.bytes() {
            info!(
                rewritten = bytes.len(),
                original = original_size.bytes(),
                "Rewritten PDF not smaller, returning original"
            );
            return Ok(RewrittenPdf {
                bytes: pdf_bytes.to_vec(),
                report,
                kept_original: true,
            });
        }

        info!(
            pages = report.pages,
            images = report.total_images,
            substituted = report.substituted_images,
            skipped = report.skipped_images,
            original = original_size.bytes(),
            compressed = bytes.len(),
            "PDF compression successful"
        );
        Ok(RewrittenPdf {
            bytes,
            report,
            kept_original: false,
        })
    }
}

/// Decode one embedded image and re-encode it as JPEG.
///
/// `Ok(None)` means the JPEG was not smaller than the stored stream.
fn recompress_embedded_image<E: RasterEncoder>(
    doc: &Document,
    image: &EmbeddedImageRef,
    encoder: &E,
    quality: u8,
) -> Result<Option<Stream>, String> {
    let stream = match doc.get_object(image.id) {
        Ok(Object::Stream(s)) => s,
        _ => return Err("Object is not an image stream".to_string()),
    };

    let width = dict_u32(&stream.dict, b"Width").unwrap_or(0);
    let height = dict_u32(&stream.dict, b"Height").unwrap_or(0);
    if width == 0 || height == 0 {
        return Err("Invalid image dimensions".to_string());
    }
    if matches!(stream.dict.get(b"ImageMask"), Ok(Object::Boolean(true))) {
        return Err("Stencil masks are not re-encoded".to_string());
    }

    let color_space = stream
        .dict
        .get(b"ColorSpace")
        .ok()
        .map(|cs| get_color_space_name(cs, doc))
        .unwrap_or_else(|| "DeviceRGB".to_string());
    let bits_per_component = dict_u32(&stream.dict, b"BitsPerComponent").unwrap_or(8);

    let decoded = decode_image_stream(stream, width, height, &color_space, bits_per_component)?;
    let raster = RasterImage::new(decoded).normalized_for(OutputFormat::Jpeg);
    let params = CompressionParams::new(OutputFormat::Jpeg, quality);
    let jpeg_bytes = encoder
        .encode(&raster, &params)
        .map_err(|e| e.to_string())?;

    if jpeg_bytes.len() >= stream.content.len() {
        return Ok(None);
    }

    Ok(Some(jpeg_image_stream(
        &stream.dict,
        jpeg_bytes,
        raster.width(),
        raster.height(),
    )))
}

/// Image XObject for JPEG data, keeping the entries that still apply.
fn jpeg_image_stream(original: &Dictionary, jpeg_bytes: Vec<u8>, width: u32, height: u32) -> Stream {
    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width as i64,
        "Height" => height as i64,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8i64,
        "Filter" => "DCTDecode",
    };
    for key in PRESERVED_IMAGE_KEYS {
        if let Ok(value) = original.get(key) {
            dict.set(key.to_vec(), value.clone());
        }
    }
    if let Ok(Object::Reference(mask_id)) = original.get(b"Mask") {
        dict.set("Mask", Object::Reference(*mask_id));
    }

    Stream::new(dict, jpeg_bytes)
}

/// Images drawn by a page, directly or through nested Form XObjects.
pub fn embedded_images(doc: &Document, page_index: usize, page_id: ObjectId) -> Vec<EmbeddedImageRef> {
    let mut images: Vec<ObjectId> = Vec::new();
    let mut seen: HashSet<ObjectId> = HashSet::new();

    let page = flattened_page(doc, page_id);
    let resources = page.get(b"Resources").cloned().unwrap_or(Object::Null);

    let mut xobjects: Vec<(String, ObjectId)> = get_xobjects(doc, &resources).into_iter().collect();
    xobjects.sort();
    for (_, obj_id) in xobjects {
        collect_images_recursive(doc, obj_id, &mut images, &mut seen);
    }

    images
        .into_iter()
        .map(|id| EmbeddedImageRef {
            page_index,
            id,
            original_size: match doc.get_object(id) {
                Ok(Object::Stream(s)) => s.content.len(),
                _ => 0,
            },
        })
        .collect()
}

/// Recursively collect images from an object (handles Form XObjects)
fn collect_images_recursive(
    doc: &Document,
    obj_id: ObjectId,
    images: &mut Vec<ObjectId>,
    seen: &mut HashSet<ObjectId>,
) {
    if !seen.insert(obj_id) {
        return;
    }

    let stream = match doc.get_object(obj_id) {
        Ok(Object::Stream(s)) => s,
        _ => return,
    };

    match name_entry(&stream.dict, b"Subtype").as_deref() {
        Some("Image") => images.push(obj_id),
        Some("Form") => {
            if let Ok(res) = stream.dict.get(b"Resources") {
                let mut children: Vec<(String, ObjectId)> =
                    get_xobjects(doc, res).into_iter().collect();
                children.sort();
                for (_, child_id) in children {
                    collect_images_recursive(doc, child_id, images, seen);
                }
            }
        }
        _ => {}
    }
}

/// XObject name -> object id from a resources dictionary.
fn get_xobjects(doc: &Document, resources: &Object) -> HashMap<String, ObjectId> {
    let mut result = HashMap::new();

    let xobj_dict = resolve_dict(doc, resources)
        .and_then(|res| res.get(b"XObject").ok())
        .and_then(|xobjects| resolve_dict(doc, xobjects));

    if let Some(xobj_dict) = xobj_dict {
        for (name, value) in xobj_dict.iter() {
            if let Object::Reference(obj_id) = value {
                result.insert(String::from_utf8_lossy(name).to_string(), *obj_id);
            }
        }
    }

    result
}

fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match obj {
        Object::Dictionary(d) => Some(d),
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(Object::Dictionary(d)) => Some(d),
            _ => None,
        },
        _ => None,
    }
}

/// The page dictionary with inherited attributes written onto it.
fn flattened_page(doc: &Document, page_id: ObjectId) -> Dictionary {
    let mut page = doc
        .get_dictionary(page_id)
        .cloned()
        .unwrap_or_else(|_| Dictionary::new());

    for key in INHERITABLE_PAGE_KEYS {
        if page.has(key) {
            continue;
        }
        if let Some(value) = inherited_attribute(doc, &page, key) {
            page.set(key.to_vec(), value);
        }
    }

    if !page.has(b"MediaBox") {
        let default_box: Vec<Object> = DEFAULT_MEDIA_BOX.iter().map(|v| Object::Real(*v)).collect();
        page.set("MediaBox", default_box);
    }

    page
}

/// Walk up /Parent links looking for `key`.
fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();

    for _ in 0..MAX_PAGE_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }

    None
}

/// MediaBox of a page, inherited if needed.
pub fn page_geometry(doc: &Document, page_id: ObjectId) -> PageGeometry {
    let page = flattened_page(doc, page_id);

    let values: Option<Vec<f32>> = page.get(b"MediaBox").ok().and_then(|media_box| {
        let array = match media_box {
            Object::Reference(id) => doc.get_object(*id).ok()?.as_array().ok()?,
            other => other.as_array().ok()?,
        };
        array.iter().map(|v| v.as_float().ok()).collect()
    });

    match values.as_deref() {
        Some([x0, y0, x1, y1]) => PageGeometry {
            media_box: [*x0, *y0, *x1, *y1],
        },
        _ => PageGeometry {
            media_box: DEFAULT_MEDIA_BOX,
        },
    }
}

/// Replace a multi-stream /Contents array with one concatenated stream.
///
/// Pages whose streams use filters other than FlateDecode are left alone.
fn merge_page_contents(doc: &mut Document, page_id: ObjectId) {
    let parts = match doc
        .get_dictionary(page_id)
        .and_then(|page| page.get(b"Contents"))
    {
        Ok(Object::Array(parts)) if parts.len() > 1 => parts.clone(),
        _ => return,
    };

    let mut merged = Vec::new();
    for part in &parts {
        let stream = match part {
            Object::Reference(id) => match doc.get_object(*id) {
                Ok(Object::Stream(s)) => s,
                _ => return,
            },
            _ => return,
        };
        match plain_content(stream) {
            Ok(data) => {
                merged.extend_from_slice(&data);
                merged.push(b'\n');
            }
            Err(e) => {
                debug!(page = ?page_id, error = %e, "Leaving page contents unmerged");
                return;
            }
        }
    }

    let merged_id = doc.add_object(Stream::new(Dictionary::new(), merged));
    if let Ok(Object::Dictionary(page)) = doc.get_object_mut(page_id) {
        page.set("Contents", Object::Reference(merged_id));
    }
    debug!(page = ?page_id, streams = parts.len(), "Merged content streams");
}

/// Content of a stream with FlateDecode undone.
fn plain_content(stream: &Stream) -> Result<Vec<u8>, String> {
    match filter_names(stream).as_slice() {
        [] => Ok(stream.content.clone()),
        [only] if only == "FlateDecode" && !has_predictor(stream) => inflate(&stream.content),
        other => Err(format!("Unsupported filter chain: {:?}", other)),
    }
}

fn inflate(content: &[u8]) -> Result<Vec<u8>, String> {
    let mut decoder = ZlibDecoder::new(content);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| e.to_string())?;
    Ok(decoded)
}

/// All filter names of a stream, in application order.
fn filter_names(stream: &Stream) -> Vec<String> {
    match stream.dict.get(b"Filter") {
        Ok(Object::Name(n)) => vec![String::from_utf8_lossy(n).to_string()],
        Ok(Object::Array(arr)) => arr
            .iter()
            .filter_map(|f| match f {
                Object::Name(n) => Some(String::from_utf8_lossy(n).to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn has_predictor(stream: &Stream) -> bool {
    let parms = match stream.dict.get(b"DecodeParms") {
        Ok(Object::Dictionary(d)) => Some(d),
        Ok(Object::Array(arr)) => arr.iter().find_map(|p| match p {
            Object::Dictionary(d) => Some(d),
            _ => None,
        }),
        _ => None,
    };
    parms
        .and_then(|d| d.get(b"Predictor").ok())
        .and_then(|p| p.as_i64().ok())
        .is_some_and(|p| p > 1)
}

fn name_entry(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key) {
        Ok(Object::Name(n)) => Some(String::from_utf8_lossy(n).to_string()),
        _ => None,
    }
}

fn dict_u32(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    match dict.get(key) {
        Ok(Object::Integer(n)) if *n >= 0 => u32::try_from(*n).ok(),
        _ => None,
    }
}

/// Get color space name from PDF object
///
/// ICC-based spaces are reported as the device space with the profile's
/// component count.
fn get_color_space_name(obj: &Object, doc: &Document) -> String {
    match obj {
        Object::Name(name) => String::from_utf8_lossy(name).to_string(),
        Object::Array(arr) => match arr.first() {
            Some(Object::Name(name)) if name.as_slice() == b"ICCBased" => {
                match arr.get(1).and_then(|profile| icc_components(profile, doc)) {
                    Some(1) => "DeviceGray".to_string(),
                    Some(3) => "DeviceRGB".to_string(),
                    Some(4) => "DeviceCMYK".to_string(),
                    Some(n) => format!("ICCBased/{}", n),
                    None => "ICCBased".to_string(),
                }
            }
            Some(Object::Name(name)) => String::from_utf8_lossy(name).to_string(),
            _ => "Unknown".to_string(),
        },
        Object::Reference(id) => match doc.get_object(*id) {
            Ok(resolved) => get_color_space_name(resolved, doc),
            Err(_) => "Unknown".to_string(),
        },
        _ => "Unknown".to_string(),
    }
}

/// `/N` of an ICC profile stream.
fn icc_components(profile: &Object, doc: &Document) -> Option<i64> {
    let stream = match profile {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_stream().ok()?,
        Object::Stream(stream) => stream,
        _ => return None,
    };
    match stream.dict.get(b"N").ok()? {
        Object::Integer(n) => Some(*n),
        Object::Reference(id) => doc.get_object(*id).ok()?.as_i64().ok(),
        _ => None,
    }
}

/// Non-default `/Decode` ranges, one `(min, max)` pair per component.
fn decode_ranges(dict: &Dictionary) -> Result<Option<Vec<(f32, f32)>>, String> {
    let values = match dict.get(b"Decode") {
        Ok(Object::Array(values)) => values,
        Ok(_) => return Err("Malformed Decode array".to_string()),
        Err(_) => return Ok(None),
    };
    let numbers = values
        .iter()
        .map(|v| v.as_float().map_err(|_| "Malformed Decode array".to_string()))
        .collect::<Result<Vec<f32>, String>>()?;
    if numbers.len() % 2 != 0 {
        return Err("Malformed Decode array".to_string());
    }

    let ranges: Vec<(f32, f32)> = numbers.chunks_exact(2).map(|p| (p[0], p[1])).collect();
    if ranges.iter().all(|&range| range == (0.0, 1.0)) {
        Ok(None)
    } else {
        Ok(Some(ranges))
    }
}

/// Map 8-bit samples through their `/Decode` ranges.
fn apply_decode(samples: &mut [u8], ranges: &[(f32, f32)]) {
    for pixel in samples.chunks_exact_mut(ranges.len()) {
        for (sample, &(min, max)) in pixel.iter_mut().zip(ranges) {
            let value = min + (*sample as f32 / 255.0) * (max - min);
            *sample = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        }
    }
}

/// Decode a PDF image stream into pixels
fn decode_image_stream(
    stream: &Stream,
    width: u32,
    height: u32,
    color_space: &str,
    bits_per_component: u32,
) -> Result<DynamicImage, String> {
    let filters = filter_names(stream);
    let decode = decode_ranges(&stream.dict)?;

    let decoded_data = match filters.first().map(String::as_str) {
        Some("FlateDecode") if filters.len() == 1 => {
            if has_predictor(stream) {
                return Err("FlateDecode predictors are not supported".to_string());
            }
            inflate(&stream.content)?
        }
        Some("DCTDecode" | "JPXDecode") if decode.is_some() => {
            return Err("Decode arrays on compressed images are not supported".to_string());
        }
        Some("DCTDecode") if filters.len() == 1 => {
            return image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(|e| format!("Failed to decode JPEG image: {}", e));
        }
        Some("JPXDecode") if filters.len() == 1 => {
            return image::load_from_memory(&stream.content)
                .map_err(|e| format!("Failed to decode JPEG2000 image: {}", e));
        }
        None => stream.content.clone(),
        Some(_) => return Err(format!("Unsupported filter chain: {:?}", filters)),
    };

    if bits_per_component != 8 {
        return Err(format!("Unsupported bits per component: {}", bits_per_component));
    }

    let pixels = width as usize * height as usize;
    let raw = |channels: usize| -> Result<Vec<u8>, String> {
        let expected_size = pixels * channels;
        if decoded_data.len() < expected_size {
            return Err(format!(
                "Image data too short for {}: {} bytes (expected {})",
                color_space,
                decoded_data.len(),
                expected_size
            ));
        }
        let mut samples = decoded_data[..expected_size].to_vec();
        if let Some(ranges) = &decode {
            if ranges.len() != channels {
                return Err(format!(
                    "Decode array has {} ranges for {} components",
                    ranges.len(),
                    channels
                ));
            }
            apply_decode(&mut samples, ranges);
        }
        Ok(samples)
    };

    match color_space {
        "DeviceRGB" | "RGB" | "CalRGB" => {
            let img = RgbImage::from_raw(width, height, raw(3)?)
                .ok_or("Failed to create RGB image from raw data")?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        "DeviceGray" | "Gray" | "CalGray" => {
            let img = image::GrayImage::from_raw(width, height, raw(1)?)
                .ok_or("Failed to create grayscale image from raw data")?;
            Ok(DynamicImage::ImageLuma8(img))
        }
        "DeviceCMYK" | "CMYK" => {
            let cmyk = raw(4)?;
            let mut rgb_data = Vec::with_capacity(pixels * 3);
            for chunk in cmyk.chunks_exact(4) {
                let k = 1.0 - chunk[3] as f32 / 255.0;
                for ink in &chunk[..3] {
                    rgb_data.push(((1.0 - *ink as f32 / 255.0) * k * 255.0) as u8);
                }
            }
            let img = RgbImage::from_raw(width, height, rgb_data)
                .ok_or("Failed to create RGB image from CMYK data")?;
            Ok(DynamicImage::ImageRgb8(img))
        }
        _ => Err(format!("Unsupported color space: {}", color_space)),
    }
}
