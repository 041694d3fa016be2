use std::io::ErrorKind;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::{GrayImage, ImageFormat};

use super::types::{OcrEngine, OcrRequest};
use super::ExtractionError;

/// Tesseract driven through its command-line interface.
///
/// Each page is written to a temporary PNG and recognized with
/// `tesseract <page> stdout -l <lang> --psm <mode>`.
pub struct TesseractCli {
    command: String,
}

impl TesseractCli {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
        }
    }

    /// Verify the executable responds to `--version`.
    pub fn check_available(&self) -> Result<(), ExtractionError> {
        let output = Command::new(&self.command)
            .arg("--version")
            .output()
            .map_err(|e| self.spawn_error(e))?;
        if !output.status.success() {
            return Err(ExtractionError::OcrUnavailable(format!(
                "{} --version exited with {}",
                self.command, output.status
            )));
        }
        Ok(())
    }

    fn spawn_error(&self, e: std::io::Error) -> ExtractionError {
        if e.kind() == ErrorKind::NotFound {
            ExtractionError::OcrUnavailable(format!("'{}' not found on PATH", self.command))
        } else {
            ExtractionError::OcrUnavailable(format!("Failed to start '{}': {e}", self.command))
        }
    }
}

impl Default for TesseractCli {
    fn default() -> Self {
        Self::new("tesseract")
    }
}

impl OcrEngine for TesseractCli {
    fn recognize(&self, page: &GrayImage, request: &OcrRequest<'_>) -> Result<String, ExtractionError> {
        let input = tempfile::Builder::new()
            .prefix("ordoscan-page-")
            .suffix(".png")
            .tempfile()?;
        page.save_with_format(input.path(), ImageFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("Failed to write page: {e}")))?;

        let output = Command::new(&self.command)
            .arg(input.path())
            .arg("stdout")
            .arg("-l")
            .arg(request.language)
            .arg("--psm")
            .arg(request.segmentation.psm().to_string())
            .output()
            .map_err(|e| self.spawn_error(e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::OcrProcessing(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        tracing::debug!(
            lang = request.language,
            psm = request.segmentation.psm(),
            chars = text.len(),
            "Tesseract page recognized"
        );
        Ok(text.trim().to_string())
    }
}

/// Mock OCR engine for unit testing without Tesseract.
/// Returns the same text for every page and counts calls.
pub struct MockOcrEngine {
    pub text: String,
    calls: AtomicUsize,
}

impl MockOcrEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for MockOcrEngine {
    fn recognize(&self, _page: &GrayImage, _request: &OcrRequest<'_>) -> Result<String, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }
}

/// OCR engine that always fails, for exercising stage-failure paths.
pub struct FailingOcrEngine {
    reason: String,
}

impl FailingOcrEngine {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl OcrEngine for FailingOcrEngine {
    fn recognize(&self, _page: &GrayImage, _request: &OcrRequest<'_>) -> Result<String, ExtractionError> {
        Err(ExtractionError::OcrProcessing(self.reason.clone()))
    }
}
