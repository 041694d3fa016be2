use std::path::Path;

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Layout hint forwarded to the OCR engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSegmentation {
    /// Treat the page as a single uniform block of text.
    SingleBlock,
    /// Let the engine segment the page itself.
    Automatic,
}

impl PageSegmentation {
    /// Tesseract `--psm` value.
    pub fn psm(&self) -> u8 {
        match self {
            Self::SingleBlock => 6,
            Self::Automatic => 3,
        }
    }
}

/// Per-call recognition parameters.
#[derive(Debug, Clone, Copy)]
pub struct OcrRequest<'a> {
    pub language: &'a str,
    pub segmentation: PageSegmentation,
}

/// Recognized text for one page (1-based numbering).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageText {
    pub page_number: usize,
    pub text: String,
}

/// Result of text extraction from a single file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub pages: Vec<PageText>,
    pub full_text: String,
}

impl ExtractionResult {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

/// OCR engine abstraction (allows mocking for tests).
///
/// Receives an already normalized monochrome page. Its output is trusted as-is.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, page: &GrayImage, request: &OcrRequest<'_>) -> Result<String, ExtractionError>;
}

/// Rasterizes PDF pages for per-page OCR.
pub trait PdfPageRenderer: Send + Sync {
    /// Parse the document once, then hand every page (0-based, rendered at
    /// `dpi`) to `on_page` in order. Stops at the first error. Returns the
    /// page count.
    fn render_pages(
        &self,
        pdf_bytes: &[u8],
        dpi: u32,
        on_page: &mut dyn FnMut(usize, DynamicImage) -> Result<(), ExtractionError>,
    ) -> Result<usize, ExtractionError>;
}

/// File-to-text stage consumed by the document processor and the benchmark.
pub trait TextExtractor: Send + Sync {
    fn extract_file(&self, path: &Path) -> Result<ExtractionResult, ExtractionError>;
}
