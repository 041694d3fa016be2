//! Page normalization services applied before OCR.
//!
//! Each step is an independent service; `PreprocessingPipeline` composes
//! them in the fixed order grayscale -> median denoise -> Otsu binarization.
//! Deskewing is not performed: pages are expected within a couple of degrees.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::{otsu_level, threshold, ThresholdType};
use imageproc::filter::median_filter;
use tracing::debug;

use super::ExtractionError;

// ═══════════════════════════════════════════════════════════
// Constants
// ═══════════════════════════════════════════════════════════

/// 3x3 median window, enough to erase isolated noise pixels.
const MEDIAN_RADIUS: u32 = 1;

/// Pages above this edge length are rejected before processing.
const MAX_PAGE_DIMENSION: u32 = 12_000;

// ═══════════════════════════════════════════════════════════
// Service traits
// ═══════════════════════════════════════════════════════════

/// Collapses color pages to a single luminance channel.
pub trait GrayscaleConverter: Send + Sync {
    fn to_gray(&self, page: &DynamicImage) -> GrayImage;
}

/// Removes isolated pixel noise.
pub trait Denoiser: Send + Sync {
    fn denoise(&self, page: GrayImage) -> GrayImage;
}

/// Produces a two-level page (ink = 0, paper = 255).
pub trait Binarizer: Send + Sync {
    fn binarize(&self, page: &GrayImage) -> GrayImage;
}

// ═══════════════════════════════════════════════════════════
// PagePreprocessor trait (orchestrator interface)
// ═══════════════════════════════════════════════════════════

/// Pure image-to-image transform. No I/O, no OCR calls.
pub trait PagePreprocessor: Send + Sync {
    fn prepare(&self, page: &DynamicImage) -> Result<GrayImage, ExtractionError>;
}

// ═══════════════════════════════════════════════════════════
// PreprocessingPipeline: composes the stages
// ═══════════════════════════════════════════════════════════

pub struct PreprocessingPipeline {
    grayscale: Box<dyn GrayscaleConverter>,
    denoiser: Box<dyn Denoiser>,
    binarizer: Box<dyn Binarizer>,
}

impl PreprocessingPipeline {
    pub fn new(
        grayscale: Box<dyn GrayscaleConverter>,
        denoiser: Box<dyn Denoiser>,
        binarizer: Box<dyn Binarizer>,
    ) -> Self {
        Self {
            grayscale,
            denoiser,
            binarizer,
        }
    }

    /// Production pipeline for scanned prescriptions.
    pub fn standard() -> Self {
        Self::new(
            Box::new(Bt601Grayscale),
            Box::new(MedianDenoiser::default()),
            Box::new(OtsuBinarizer),
        )
    }
}

impl Default for PreprocessingPipeline {
    fn default() -> Self {
        Self::standard()
    }
}

impl PagePreprocessor for PreprocessingPipeline {
    fn prepare(&self, page: &DynamicImage) -> Result<GrayImage, ExtractionError> {
        validate_page_dimensions(page.width(), page.height())?;

        let gray = self.grayscale.to_gray(page);
        let denoised = self.denoiser.denoise(gray);
        let binary = self.binarizer.binarize(&denoised);

        debug!(
            width = binary.width(),
            height = binary.height(),
            "Page normalized for OCR"
        );

        Ok(binary)
    }
}

// ═══════════════════════════════════════════════════════════
// Production implementations
// ═══════════════════════════════════════════════════════════

/// ITU-R BT.601 luminance, matching common scanner/OCR tooling.
pub struct Bt601Grayscale;

impl GrayscaleConverter for Bt601Grayscale {
    fn to_gray(&self, page: &DynamicImage) -> GrayImage {
        if let DynamicImage::ImageLuma8(gray) = page {
            return gray.clone();
        }
        let rgb = page.to_rgb8();
        let mut gray = GrayImage::new(rgb.width(), rgb.height());
        for (x, y, p) in rgb.enumerate_pixels() {
            let luma = 0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32;
            gray.put_pixel(x, y, Luma([luma.round().min(255.0) as u8]));
        }
        gray
    }
}

pub struct MedianDenoiser {
    radius: u32,
}

impl MedianDenoiser {
    pub fn new(radius: u32) -> Self {
        Self { radius }
    }
}

impl Default for MedianDenoiser {
    fn default() -> Self {
        Self::new(MEDIAN_RADIUS)
    }
}

impl Denoiser for MedianDenoiser {
    fn denoise(&self, page: GrayImage) -> GrayImage {
        median_filter(&page, self.radius, self.radius)
    }
}

pub struct NoOpDenoiser;

impl Denoiser for NoOpDenoiser {
    fn denoise(&self, page: GrayImage) -> GrayImage {
        page
    }
}

/// Global threshold chosen by Otsu's method. Pixels strictly above the
/// level become paper, the rest ink.
pub struct OtsuBinarizer;

impl Binarizer for OtsuBinarizer {
    fn binarize(&self, page: &GrayImage) -> GrayImage {
        let level = otsu_level(page);
        debug!(level, "Otsu threshold selected");
        threshold(page, level, ThresholdType::Binary)
    }
}

// ═══════════════════════════════════════════════════════════
// Pure helper functions (reusable)
// ═══════════════════════════════════════════════════════════

pub fn validate_page_dimensions(width: u32, height: u32) -> Result<(), ExtractionError> {
    if width == 0 || height == 0 {
        return Err(ExtractionError::ImageProcessing(
            "Page has zero width or height".into(),
        ));
    }
    if width > MAX_PAGE_DIMENSION || height > MAX_PAGE_DIMENSION {
        return Err(ExtractionError::ImageProcessing(format!(
            "Page {width}x{height} exceeds {MAX_PAGE_DIMENSION}px limit"
        )));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
