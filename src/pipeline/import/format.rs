use serde::{Deserialize, Serialize};

/// Upload formats the pipeline can rasterize.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Png,
    Jpeg,
    Unsupported,
}

/// Larger uploads are rejected without inspection.
pub const MAX_FILE_SIZE: usize = 100 * 1024 * 1024; // 100MB

impl DocumentFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Unsupported => "unsupported",
        }
    }

    /// Map a declared content type (as sent by an upload client).
    pub fn from_content_type(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            "application/pdf" => Self::Pdf,
            "image/png" => Self::Png,
            "image/jpeg" | "image/jpg" => Self::Jpeg,
            _ => Self::Unsupported,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Unsupported => "application/octet-stream",
        }
    }

    /// Extension used for the stored copy of the upload.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Pdf => Some("pdf"),
            Self::Png => Some("png"),
            Self::Jpeg => Some("jpg"),
            Self::Unsupported => None,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }

    pub fn is_multi_page(&self) -> bool {
        matches!(self, Self::Pdf)
    }
}

/// Detect the format from magic bytes (NOT file extensions or declared types).
pub fn detect_format(bytes: &[u8]) -> DocumentFormat {
    if bytes.len() > MAX_FILE_SIZE {
        return DocumentFormat::Unsupported;
    }

    match bytes {
        // PDF: starts with %PDF
        [0x25, 0x50, 0x44, 0x46, ..] => DocumentFormat::Pdf,
        // JPEG: starts with FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => DocumentFormat::Jpeg,
        // PNG: full 8-byte signature
        [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, ..] => DocumentFormat::Png,
        _ => DocumentFormat::Unsupported,
    }
}
