use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::StructuredRecord;

/// Digitization result attached to at most one Document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub document_id: Uuid,
    /// Recognized text. `None` until OCR completes.
    pub raw_text: Option<String>,
    /// First machine extraction. Written once, never overwritten.
    pub ai_structured_json: Option<StructuredRecord>,
    /// Current version: AI output until a human correction replaces it.
    pub structured_json: Option<StructuredRecord>,
    /// Only ever moves false -> true.
    pub is_validated: bool,
}

impl Prescription {
    /// Extraction has committed a structured record.
    pub fn is_structured(&self) -> bool {
        self.structured_json.is_some()
    }
}
