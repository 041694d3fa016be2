//! PDF page rasterization via Google PDFium.
//!
//! `PdfiumRenderer` is stateless. The upstream `Pdfium` handle is `!Send`,
//! so each call binds the library afresh; the OS caches the load.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, RgbaImage, Rgb, RgbImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Upper bound for either edge of a rendered page.
const MAX_DIMENSION_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;

pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fail fast when the PDFium library cannot be bound.
    pub fn new() -> Result<Self, ExtractionError> {
        let _ = load_pdfium()?;
        Ok(Self)
    }
}

/// Bind PDFium: `PDFIUM_DYNAMIC_LIB_PATH`, then the executable's
/// directory, then system library paths.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var("PDFIUM_DYNAMIC_LIB_PATH") {
        debug!(path = %path, "Loading PDFium from env var");
        let bindings = Pdfium::bind_to_library(&path).map_err(|e| ExtractionError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDFium from {path}: {e}"),
        })?;
        return Ok(Pdfium::new(bindings));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|p| p.to_path_buf()))
    {
        let lib_path =
            Pdfium::pdfium_platform_library_name_at_path(exe_dir.to_string_lossy().as_ref());
        if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
            debug!(dir = %exe_dir.display(), "Loaded PDFium next to executable");
            return Ok(Pdfium::new(bindings));
        }
    }

    let bindings = Pdfium::bind_to_system_library().map_err(|e| ExtractionError::PdfRendering {
        page: 0,
        reason: format!("PDFium library not found. Set PDFIUM_DYNAMIC_LIB_PATH: {e}"),
    })?;
    Ok(Pdfium::new(bindings))
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    let lower = e.to_string().to_lowercase();
    if lower.contains("password") || lower.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfRendering {
            page: 0,
            reason: format!("Failed to load PDF: {e}"),
        }
    }
}

/// Pixel size for a page at `dpi`, capped to `MAX_DIMENSION_PX` with
/// aspect ratio preserved. Never returns a zero edge.
fn render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let w = (width_points * scale).max(1.0);
    let h = (height_points * scale).max(1.0);

    let longest = w.max(h);
    let ratio = if longest > MAX_DIMENSION_PX as f32 {
        MAX_DIMENSION_PX as f32 / longest
    } else {
        1.0
    };
    let clamp = |v: f32| ((v * ratio) as u32).clamp(1, MAX_DIMENSION_PX);
    (clamp(w), clamp(h))
}

/// Composite RGBA output onto white paper; transparent regions stay blank.
fn flatten_on_white(rgba: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, p) in rgba.enumerate_pixels() {
        let alpha = p.0[3] as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        out.put_pixel(x, y, Rgb([blend(p.0[0]), blend(p.0[1]), blend(p.0[2])]));
    }
    out
}

/// Render one loaded page to an RGB image.
fn render_loaded_page(
    page: &PdfPage<'_>,
    page_index: usize,
    dpi: u32,
) -> Result<DynamicImage, ExtractionError> {
    let (target_w, target_h) = render_dimensions(page.width().value, page.height().value, dpi);
    if target_w == MAX_DIMENSION_PX || target_h == MAX_DIMENSION_PX {
        warn!(page = page_index, dpi, "Rendered page capped to {MAX_DIMENSION_PX}px");
    }

    let config = PdfRenderConfig::new()
        .set_target_width(target_w as i32)
        .set_maximum_height(target_h as i32);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| ExtractionError::PdfRendering {
            page: page_index,
            reason: format!("Rendering failed: {e}"),
        })?;

    let (w, h) = (bitmap.width() as u32, bitmap.height() as u32);
    let rgba = RgbaImage::from_raw(w, h, bitmap.as_rgba_bytes()).ok_or_else(|| {
        ExtractionError::PdfRendering {
            page: page_index,
            reason: "Bitmap buffer does not match its dimensions".into(),
        }
    })?;

    debug!(page = page_index, width = w, height = h, "Rendered PDF page");
    Ok(DynamicImage::ImageRgb8(flatten_on_white(&rgba)))
}

impl PdfPageRenderer for PdfiumRenderer {
    fn render_pages(
        &self,
        pdf_bytes: &[u8],
        dpi: u32,
        on_page: &mut dyn FnMut(usize, DynamicImage) -> Result<(), ExtractionError>,
    ) -> Result<usize, ExtractionError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(map_load_error)?;

        let mut rendered = 0;
        for (page_index, page) in document.pages().iter().enumerate() {
            on_page(page_index, render_loaded_page(&page, page_index, dpi)?)?;
            rendered += 1;
        }
        Ok(rendered)
    }
}

// ── Mock for testing ──────────────────────────────────────

/// Renders blank white pages; used wherever PDFium is not installed.
/// Counts document loads so callers can check a PDF is parsed once.
pub struct MockPdfPageRenderer {
    page_count: usize,
    loads: Arc<AtomicUsize>,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self {
            page_count,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared load counter, readable after the mock is boxed away.
    pub fn load_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.loads)
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn render_pages(
        &self,
        _pdf_bytes: &[u8],
        _dpi: u32,
        on_page: &mut dyn FnMut(usize, DynamicImage) -> Result<(), ExtractionError>,
    ) -> Result<usize, ExtractionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        for page_index in 0..self.page_count {
            let page = RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]));
            on_page(page_index, DynamicImage::ImageRgb8(page))?;
        }
        Ok(self.page_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn a4_at_200dpi() {
        let (w, h) = render_dimensions(595.0, 842.0, 200);
        assert!(w > 1600 && w < 1700, "A4 width at 200dpi: got {w}");
        assert!(h > 2300 && h < 2400, "A4 height at 200dpi: got {h}");
    }

    #[test]
    fn oversized_page_capped_with_aspect_ratio() {
        let (w, h) = render_dimensions(5000.0, 10000.0, 200);
        assert_eq!(h, MAX_DIMENSION_PX);
        let ratio = h as f32 / w as f32;
        assert!((ratio - 2.0).abs() < 0.05, "got ratio {ratio}");
    }

    #[test]
    fn zero_sized_page_clamped_to_one_pixel() {
        assert_eq!(render_dimensions(0.0, 0.0, 200), (1, 1));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut rgba = RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 255]));
        let rgb = flatten_on_white(&rgba);
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn mock_renders_pages_in_order_from_one_load() {
        let mock = MockPdfPageRenderer::new(3);
        let mut seen = Vec::new();
        let count = mock
            .render_pages(&[], 200, &mut |index, page| {
                assert_eq!(page.width(), 32);
                seen.push(index);
                Ok(())
            })
            .unwrap();
        assert_eq!(count, 3);
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(mock.load_counter().load(Ordering::SeqCst), 1);
    }

    #[test]
    fn page_callback_error_stops_rendering() {
        let mock = MockPdfPageRenderer::new(4);
        let mut seen = 0;
        let err = mock
            .render_pages(&[], 200, &mut |index, _| {
                seen += 1;
                if index == 1 {
                    Err(ExtractionError::OcrProcessing("page 2 unreadable".into()))
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(matches!(err, ExtractionError::OcrProcessing(_)));
        assert_eq!(seen, 2);
    }
}
