//! Rule-based field extraction from recognized prescription text.
//!
//! Each `FieldExtractor` owns one part of the `StructuredRecord` and reads
//! the same `NormalizedText` view, so extractors can run in any order.
//! New layouts or locales are supported by adding extractors to a
//! `PrescriptionParser`, not by editing the existing ones.

pub mod header;
pub mod medicines;
pub mod text;

pub use header::*;
pub use medicines::*;
pub use text::*;

use crate::models::StructuredRecord;

pub trait FieldExtractor: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Fill the fields this extractor owns. A miss leaves them empty.
    fn extract(&self, text: &NormalizedText, record: &mut StructuredRecord);
}

/// Composes field extractors into a full record parser.
pub struct PrescriptionParser {
    extractors: Vec<Box<dyn FieldExtractor>>,
}

impl PrescriptionParser {
    pub fn new(extractors: Vec<Box<dyn FieldExtractor>>) -> Self {
        Self { extractors }
    }

    /// French prescription layout: numbered medicine lines, a `Patient :`
    /// label, a `Dr` prescriber line and a `DD/MM/YYYY` date.
    pub fn french() -> Self {
        Self::new(vec![
            Box::new(PatientExtractor),
            Box::new(DoctorExtractor),
            Box::new(DateExtractor),
            Box::new(MedicineLinesExtractor),
        ])
    }

    pub fn with_extractor(mut self, extractor: Box<dyn FieldExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn parse(&self, raw_text: &str) -> StructuredRecord {
        let text = NormalizedText::new(raw_text);
        let mut record = StructuredRecord::default();
        for extractor in &self.extractors {
            extractor.extract(&text, &mut record);
        }
        tracing::debug!(
            extractors = self.extractors.len(),
            medicines = record.medicines.len(),
            patient = record.patient.is_some(),
            doctor = record.doctor.is_some(),
            date = record.date.is_some(),
            "Structured record extracted"
        );
        record
    }
}

impl Default for PrescriptionParser {
    fn default() -> Self {
        Self::french()
    }
}
