use std::path::Path;

use image::DynamicImage;

use super::ocr::TesseractCli;
use super::pdfium::PdfiumRenderer;
use super::preprocess::{PagePreprocessor, PreprocessingPipeline};
use super::types::{
    ExtractionResult, OcrEngine, OcrRequest, PageSegmentation, PageText, PdfPageRenderer,
    TextExtractor,
};
use super::ExtractionError;
use crate::config::AppConfig;
use crate::pipeline::import::format::{detect_format, DocumentFormat};

pub const DEFAULT_OCR_LANGUAGE: &str = "fra";
pub const DEFAULT_RENDER_DPI: u32 = 200;

/// Separator inserted before each page of a multi-page document.
pub fn page_separator(page_number: usize) -> String {
    format!("\n--- Page {page_number} ---\n")
}

/// Vision stage: normalizes each page and delegates recognition to an
/// OCR engine. Collaborators are injected; the extractor holds no
/// per-document state and may be shared across pipelines.
pub struct VisionExtractor {
    preprocessor: Box<dyn PagePreprocessor>,
    ocr_engine: Box<dyn OcrEngine>,
    pdf_renderer: Option<Box<dyn PdfPageRenderer>>,
    language: String,
    segmentation: PageSegmentation,
    render_dpi: u32,
}

impl VisionExtractor {
    pub fn new(ocr_engine: Box<dyn OcrEngine>) -> Self {
        Self {
            preprocessor: Box::new(PreprocessingPipeline::standard()),
            ocr_engine,
            pdf_renderer: None,
            language: DEFAULT_OCR_LANGUAGE.to_string(),
            segmentation: PageSegmentation::SingleBlock,
            render_dpi: DEFAULT_RENDER_DPI,
        }
    }

    /// Production extractor: Tesseract CLI plus PDFium when available.
    pub fn from_config(config: &AppConfig) -> Self {
        let tesseract = TesseractCli::new(&config.tesseract_command);
        if let Err(e) = tesseract.check_available() {
            tracing::warn!(error = %e, "Tesseract unavailable, recognition will fail");
        }
        let extractor = Self::new(Box::new(tesseract))
            .with_language(&config.ocr_language)
            .with_segmentation(config.page_segmentation)
            .with_render_dpi(config.render_dpi);
        match PdfiumRenderer::new() {
            Ok(renderer) => extractor.with_pdf_renderer(Box::new(renderer)),
            Err(e) => {
                tracing::warn!(error = %e, "PDFium unavailable, PDF uploads will fail recognition");
                extractor
            }
        }
    }

    pub fn with_preprocessor(mut self, preprocessor: Box<dyn PagePreprocessor>) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Add a PDF page renderer for multi-page documents.
    pub fn with_pdf_renderer(mut self, renderer: Box<dyn PdfPageRenderer>) -> Self {
        self.pdf_renderer = Some(renderer);
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_segmentation(mut self, segmentation: PageSegmentation) -> Self {
        self.segmentation = segmentation;
        self
    }

    pub fn with_render_dpi(mut self, dpi: u32) -> Self {
        self.render_dpi = dpi;
        self
    }

    /// Normalize one raster page and recognize it.
    pub fn recognize_page(&self, page: &DynamicImage) -> Result<String, ExtractionError> {
        let normalized = self.preprocessor.prepare(page)?;
        let request = OcrRequest {
            language: &self.language,
            segmentation: self.segmentation,
        };
        let text = self.ocr_engine.recognize(&normalized, &request)?;
        Ok(text.trim().to_string())
    }

    /// Extract text from in-memory file bytes of a known format.
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        format: DocumentFormat,
    ) -> Result<ExtractionResult, ExtractionError> {
        match format {
            DocumentFormat::Unsupported => Err(ExtractionError::UnsupportedFormat),
            format if format.is_multi_page() => self.extract_pdf(bytes),
            _ => {
                let page = image::load_from_memory(bytes).map_err(|e| {
                    ExtractionError::ImageProcessing(format!("Failed to decode image: {e}"))
                })?;
                let text = self.recognize_page(&page)?;
                Ok(ExtractionResult {
                    full_text: text.clone(),
                    pages: vec![PageText {
                        page_number: 1,
                        text,
                    }],
                })
            }
        }
    }

    /// Rasterize and recognize every page independently, in order.
    fn extract_pdf(&self, bytes: &[u8]) -> Result<ExtractionResult, ExtractionError> {
        let renderer = self.pdf_renderer.as_ref().ok_or_else(|| ExtractionError::PdfRendering {
            page: 0,
            reason: "No PDF renderer configured".into(),
        })?;

        let mut pages = Vec::new();
        let mut full_text = String::new();

        renderer.render_pages(bytes, self.render_dpi, &mut |index, image| {
            let page_number = index + 1;
            let text = self.recognize_page(&image)?;
            tracing::debug!(page = page_number, chars = text.len(), "PDF page recognized");

            full_text.push_str(&page_separator(page_number));
            full_text.push_str(&text);
            pages.push(PageText { page_number, text });
            Ok(())
        })?;

        Ok(ExtractionResult { pages, full_text })
    }
}

impl TextExtractor for VisionExtractor {
    fn extract_file(&self, path: &Path) -> Result<ExtractionResult, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let format = detect_format(&bytes);
        tracing::info!(
            path = %path.display(),
            format = format.as_str(),
            "Starting text extraction"
        );
        self.extract_bytes(&bytes, format)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::pipeline::extraction::ocr::{FailingOcrEngine, MockOcrEngine};
    use crate::pipeline::extraction::pdfium::MockPdfPageRenderer;
    use image::{ImageFormat, Rgb, RgbImage};

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(24, 24, Rgb([250, 250, 250])));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    #[test]
    fn image_is_single_page_without_separator() {
        let extractor = VisionExtractor::new(Box::new(MockOcrEngine::new("  1. DOLIPRANE 1000mg \n")));
        let result = extractor.extract_bytes(&png_bytes(), DocumentFormat::Png).unwrap();
        assert_eq!(result.page_count(), 1);
        assert_eq!(result.full_text, "1. DOLIPRANE 1000mg");
    }

    #[test]
    fn multipage_pdf_has_numbered_separators() {
        let extractor = VisionExtractor::new(Box::new(MockOcrEngine::new("texte")))
            .with_pdf_renderer(Box::new(MockPdfPageRenderer::new(3)));
        let result = extractor.extract_bytes(b"%PDF-1.7", DocumentFormat::Pdf).unwrap();

        assert_eq!(result.page_count(), 3);
        assert_eq!(
            result.full_text,
            "\n--- Page 1 ---\ntexte\n--- Page 2 ---\ntexte\n--- Page 3 ---\ntexte"
        );
        assert_eq!(result.pages[2].page_number, 3);
    }

    #[test]
    fn multipage_pdf_is_loaded_once() {
        let renderer = MockPdfPageRenderer::new(5);
        let loads = renderer.load_counter();
        let engine = MockOcrEngine::new("page");
        let extractor =
            VisionExtractor::new(Box::new(engine)).with_pdf_renderer(Box::new(renderer));

        let result = extractor.extract_bytes(b"%PDF-1.7", DocumentFormat::Pdf).unwrap();
        assert_eq!(result.page_count(), 5);
        assert_eq!(loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn pdf_without_renderer_fails() {
        let extractor = VisionExtractor::new(Box::new(MockOcrEngine::new("x")));
        let err = extractor.extract_bytes(b"%PDF-1.7", DocumentFormat::Pdf).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfRendering { .. }));
    }

    #[test]
    fn ocr_failure_propagates() {
        let extractor = VisionExtractor::new(Box::new(FailingOcrEngine::new("boom")));
        let err = extractor.extract_bytes(&png_bytes(), DocumentFormat::Png).unwrap_err();
        assert!(matches!(err, ExtractionError::OcrProcessing(_)));
    }

    #[test]
    fn unsupported_format_rejected() {
        let extractor = VisionExtractor::new(Box::new(MockOcrEngine::new("x")));
        let err = extractor.extract_bytes(b"hello", DocumentFormat::Unsupported).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat));
    }

    #[test]
    fn corrupt_image_is_processing_error() {
        let extractor = VisionExtractor::new(Box::new(MockOcrEngine::new("x")));
        let mut bytes = png_bytes();
        bytes.truncate(20);
        let err = extractor.extract_bytes(&bytes, DocumentFormat::Png).unwrap_err();
        assert!(matches!(err, ExtractionError::ImageProcessing(_)));
    }

    #[test]
    fn injected_preprocessor_runs_before_ocr() {
        struct RejectAll;
        impl PagePreprocessor for RejectAll {
            fn prepare(&self, _page: &DynamicImage) -> Result<image::GrayImage, ExtractionError> {
                Err(ExtractionError::ImageProcessing("rejected".into()))
            }
        }

        let engine = MockOcrEngine::new("x");
        let extractor = VisionExtractor::new(Box::new(engine)).with_preprocessor(Box::new(RejectAll));
        let err = extractor.extract_bytes(&png_bytes(), DocumentFormat::Png).unwrap_err();
        assert!(matches!(err, ExtractionError::ImageProcessing(ref m) if m == "rejected"));
    }

    #[test]
    fn configured_segmentation_reaches_engine() {
        struct SegmentationRecorder(Arc<Mutex<Vec<PageSegmentation>>>);
        impl OcrEngine for SegmentationRecorder {
            fn recognize(&self, _page: &image::GrayImage, request: &OcrRequest<'_>) -> Result<String, ExtractionError> {
                self.0.lock().unwrap().push(request.segmentation);
                Ok("x".into())
            }
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let extractor = VisionExtractor::new(Box::new(SegmentationRecorder(Arc::clone(&seen))))
            .with_segmentation(PageSegmentation::Automatic);
        extractor.extract_bytes(&png_bytes(), DocumentFormat::Png).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![PageSegmentation::Automatic]);
    }

    #[test]
    fn extract_file_detects_format_from_content() {
        let dir = tempfile::tempdir().unwrap();
        // wrong extension on purpose
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, png_bytes()).unwrap();

        let extractor = VisionExtractor::new(Box::new(MockOcrEngine::new("Patient : Jean Dupont")));
        let result = extractor.extract_file(&path).unwrap();
        assert_eq!(result.full_text, "Patient : Jean Dupont");
    }
}
