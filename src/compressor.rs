//! Size-target-driven image recompression.
//!
//! An upload is decoded once, normalized for its output format, and then
//! pushed through a bounded retry ladder that lowers quality (or, for PNG,
//! downscales) until the encoded size reaches a target derived from the
//! original size. When a ladder run still produces something at least as
//! large as the upload, two escalation rounds retry with harsher starting
//! parameters. If nothing beats the original, the original bytes win.

use tracing::{debug, info, warn};

use crate::encoder::{CompressionParams, ImageEncoder, OutputFormat, RasterEncoder};
use crate::error::{CompressError, EncodeError};
use crate::raster::RasterImage;
use crate::size::EncodedSize;

/// Encode attempts per ladder run.
pub const MAX_ATTEMPTS: u32 = 3;

/// Quality reduction between ladder attempts.
pub const QUALITY_STEP: u8 = 20;

/// Ladder retries never go below this quality.
pub const QUALITY_FLOOR: u8 = 20;

/// Longest side a PNG is scaled to inside the ladder.
pub const PNG_LADDER_MAX_SIDE: u32 = 1920;

/// Longest side for PNG on each escalation round.
pub const PNG_ESCALATION_SIDES: [u32; 2] = [1280, 800];

/// Starting JPEG quality on each escalation round.
pub const JPEG_ESCALATION_QUALITIES: [u8; 2] = [60, 10];

/// Initial quality and target fraction for an upload size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SizePolicy {
    pub initial_quality: u8,
    pub target_fraction: f64,
}

impl SizePolicy {
    pub fn for_size(original: EncodedSize) -> Self {
        let mb = original.megabytes();
        let (initial_quality, target_fraction) = if mb > 1.0 {
            (85, 0.30)
        } else if mb >= 0.5 {
            (75, 0.40)
        } else if mb >= 0.1 {
            (85, 0.60)
        } else {
            (90, 0.80)
        };

        Self {
            initial_quality,
            target_fraction,
        }
    }
}

/// Byte goal for a compression run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeTarget {
    pub target_size_bytes: usize,
    pub original_size_bytes: usize,
}

impl SizeTarget {
    pub fn new(original: EncodedSize, fraction: f64) -> Self {
        let original_size_bytes = original.bytes();
        let target = (original_size_bytes as f64 * fraction.clamp(0.0, 1.0)).floor() as usize;

        Self {
            target_size_bytes: target.min(original_size_bytes),
            original_size_bytes,
        }
    }
}

/// One encoded candidate.
#[derive(Debug, Clone)]
pub struct CompressionAttempt {
    pub params: CompressionParams,
    pub encoded_bytes: Vec<u8>,
    pub size_bytes: usize,
}

/// Result of a ladder run: the smallest attempt and how many encodes it took.
#[derive(Debug, Clone)]
pub struct LadderOutcome {
    pub best: CompressionAttempt,
    pub attempts: u32,
}

/// How the next ladder attempt differs from the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Downscale(u32),
    Quality(u8),
}

/// Parameter change after an attempt missed its target.
///
/// Large PNGs are scaled down first since quality barely affects a
/// lossless encode; everything else loses quality.
pub fn next_adjustment(params: &CompressionParams, longest_side: u32) -> Adjustment {
    if params.format == OutputFormat::Png && longest_side > PNG_LADDER_MAX_SIDE {
        Adjustment::Downscale(PNG_LADDER_MAX_SIDE)
    } else {
        Adjustment::Quality(params.quality.saturating_sub(QUALITY_STEP).max(QUALITY_FLOOR))
    }
}

/// Encode `image` once with `params`.
pub fn attempt<E: RasterEncoder>(
    encoder: &E,
    image: &RasterImage,
    params: CompressionParams,
) -> Result<CompressionAttempt, EncodeError> {
    let encoded_bytes = encoder.encode(image, &params)?;
    let size_bytes = EncodedSize::of(&encoded_bytes).bytes();

    Ok(CompressionAttempt {
        params,
        encoded_bytes,
        size_bytes,
    })
}

/// Run up to [`MAX_ATTEMPTS`] encodes, stopping early once one meets
/// `target_bytes`. Returns the smallest attempt.
///
/// A failed encode returns the best earlier attempt if there is one;
/// a failure on the first attempt is returned as is.
pub fn compress_with_params<E: RasterEncoder>(
    encoder: &E,
    image: &RasterImage,
    params: CompressionParams,
    target_bytes: usize,
) -> Result<LadderOutcome, EncodeError> {
    let mut params = params;
    let mut resized: Option<RasterImage> = None;
    let mut best: Option<CompressionAttempt> = None;
    let mut attempts = 0;

    loop {
        let current = resized.as_ref().unwrap_or(image);

        let candidate = match attempt(encoder, current, params) {
            Ok(candidate) => candidate,
            Err(e) => {
                warn!(attempt = attempts + 1, error = %e, "Compression attempt failed");
                return best.map(|best| LadderOutcome { best, attempts }).ok_or(e);
            }
        };
        attempts += 1;

        debug!(
            attempt = attempts,
            size = candidate.size_bytes,
            quality = params.quality,
            width = current.width(),
            height = current.height(),
            "Encoded"
        );

        let reached = candidate.size_bytes <= target_bytes;
        let smallest = match best.take() {
            Some(previous) if previous.size_bytes <= candidate.size_bytes => previous,
            _ => candidate,
        };
        if reached {
            debug!(attempt = attempts, target = target_bytes, "Target size reached");
        }
        if reached || attempts >= MAX_ATTEMPTS {
            return Ok(LadderOutcome {
                best: smallest,
                attempts,
            });
        }
        best = Some(smallest);

        match next_adjustment(&params, current.longest_side()) {
            Adjustment::Downscale(max_side) => {
                let smaller = current.downscaled_to_fit(max_side);
                params = params.with_max_dimension(max_side);
                resized = Some(smaller);
            }
            Adjustment::Quality(quality) => params = params.with_quality(quality),
        }
    }
}

/// A finished compression: the bytes to return and how they were produced.
#[derive(Debug, Clone)]
pub struct CompressedImage {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    /// True when the original upload was returned unchanged.
    pub kept_original: bool,
    /// Encode attempts across all ladder runs.
    pub encode_calls: u32,
}

/// Adaptive recompression of standalone image uploads.
#[derive(Debug, Clone, Default)]
pub struct AdaptiveImageCompressor<E = ImageEncoder> {
    encoder: E,
}

impl AdaptiveImageCompressor<ImageEncoder> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<E: RasterEncoder> AdaptiveImageCompressor<E> {
    pub fn with_encoder(encoder: E) -> Self {
        Self { encoder }
    }

    /// Compress an upload. Fails only when the bytes cannot be decoded.
    pub fn compress(
        &self,
        original: &[u8],
        original_filename: &str,
    ) -> Result<CompressedImage, CompressError> {
        info!(filename = original_filename, "Starting image compression");

        let image = RasterImage::decode(original).map_err(CompressError::Decode)?;
        debug!(
            width = image.width(),
            height = image.height(),
            "Decoded original"
        );

        let format = OutputFormat::from_filename(original_filename);
        Ok(self.compress_decoded(image, original, format))
    }

    /// Compress an already decoded image whose encoded form is `original`.
    pub fn compress_decoded(
        &self,
        image: RasterImage,
        original: &[u8],
        format: OutputFormat,
    ) -> CompressedImage {
        let original_size = EncodedSize::of(original);
        let policy = SizePolicy::for_size(original_size);
        let target = SizeTarget::new(original_size, policy.target_fraction);

        info!(
            original_mb = original_size.megabytes(),
            quality = policy.initial_quality,
            target_bytes = target.target_size_bytes,
            ?format,
            "Compression plan"
        );

        let keep_original = |encode_calls: u32| CompressedImage {
            bytes: original.to_vec(),
            format,
            kept_original: true,
            encode_calls,
        };

        let mut base = image.normalized_for(format);
        let mut params = CompressionParams::new(format, policy.initial_quality);
        let mut encode_calls = 0;

        let mut outcome = match self.run_ladder(&base, params, &target, &mut encode_calls) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Compression failed, returning original");
                return keep_original(encode_calls + 1);
            }
        };

        for round in 0..PNG_ESCALATION_SIDES.len() {
            if outcome.best.size_bytes < target.original_size_bytes {
                break;
            }

            info!(
                round = round + 1,
                size = outcome.best.size_bytes,
                "Result not smaller than original, escalating"
            );
            match format {
                OutputFormat::Png => {
                    let max_side = PNG_ESCALATION_SIDES[round];
                    if base.longest_side() > max_side {
                        base = base.downscaled_to_fit(max_side);
                        params = params.with_max_dimension(max_side);
                    }
                }
                OutputFormat::Jpeg => {
                    params = params.with_quality(JPEG_ESCALATION_QUALITIES[round]);
                }
            }

            outcome = match self.run_ladder(&base, params, &target, &mut encode_calls) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(error = %e, "Escalated compression failed, returning original");
                    return keep_original(encode_calls + 1);
                }
            };
        }

        if outcome.best.size_bytes >= target.original_size_bytes {
            info!("All compression attempts failed, returning original image");
            return keep_original(encode_calls);
        }

        info!(
            original = target.original_size_bytes,
            compressed = outcome.best.size_bytes,
            quality = outcome.best.params.quality,
            "Compression successful"
        );
        CompressedImage {
            bytes: outcome.best.encoded_bytes,
            format,
            kept_original: false,
            encode_calls,
        }
    }

    fn run_ladder(
        &self,
        image: &RasterImage,
        params: CompressionParams,
        target: &SizeTarget,
        encode_calls: &mut u32,
    ) -> Result<LadderOutcome, EncodeError> {
        let outcome = compress_with_params(&self.encoder, image, params, target.target_size_bytes)?;
        *encode_calls += outcome.attempts;
        Ok(outcome)
    }
}
