//! Document lifecycle: upload registration, the per-document pipeline
//! (recognize -> persist text -> extract -> persist record) and the
//! result/correction operations exposed to upstream callers.
//!
//! Status walks PENDING -> PROCESSING -> COMPLETED | FAILED. A stage
//! failure is recorded as FAILED and returned inside `PipelineOutcome`;
//! it is never surfaced as `Err`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::db::{DatabaseError, DocumentStore};
use crate::models::enums::ProcessingStatus;
use crate::models::{Document, Prescription, StructuredRecord};
use crate::pipeline::extraction::types::TextExtractor;
use crate::pipeline::fields::PrescriptionParser;
use crate::pipeline::import::format::{detect_format, DocumentFormat};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Recognition,
    Extraction,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recognition => "recognition",
            Self::Extraction => "extraction",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("Invalid upload: {0}")]
    Validation(String),

    #[error("{stage} stage failed: {reason}")]
    StageFailure { stage: PipelineStage, reason: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Results not ready yet for document {0}")]
    DataIncomplete(Uuid),

    #[error("Pipeline worker stopped: {0}")]
    WorkerStopped(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StageFailure {
    pub stage: PipelineStage,
    pub reason: String,
}

/// Final state of one pipeline invocation.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub document_id: Uuid,
    pub status: ProcessingStatus,
    pub page_count: usize,
    pub medicine_count: usize,
    pub failure: Option<StageFailure>,
}

impl PipelineOutcome {
    pub fn is_completed(&self) -> bool {
        self.status == ProcessingStatus::Completed
    }

    /// Surface a recorded stage failure as an error (for callers that
    /// want `?` semantics, such as the CLI).
    pub fn into_result(self) -> Result<PipelineOutcome, ProcessingError> {
        match self.failure {
            Some(StageFailure { stage, reason }) => {
                Err(ProcessingError::StageFailure { stage, reason })
            }
            None => Ok(self),
        }
    }
}

/// Outcome of a run paired with the stored record, which is present only
/// when the run completed.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub outcome: PipelineOutcome,
    pub result: Option<Prescription>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Drives documents through recognition and field extraction.
///
/// Holds no per-document state; one instance serves every pipeline.
/// Same-document serialization is the dispatcher's job.
pub struct DocumentProcessor {
    store: Arc<dyn DocumentStore>,
    extractor: Box<dyn TextExtractor>,
    parser: PrescriptionParser,
    upload_dir: PathBuf,
}

impl DocumentProcessor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        extractor: Box<dyn TextExtractor>,
        parser: PrescriptionParser,
        upload_dir: &Path,
    ) -> Self {
        Self {
            store,
            extractor,
            parser,
            upload_dir: upload_dir.to_path_buf(),
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Validate and store an upload, then create its PENDING document.
    ///
    /// Rejected uploads leave no file and no database row behind.
    pub fn register_upload(
        &self,
        filename: &str,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<Document, ProcessingError> {
        let detected = detect_format(bytes);
        if let Some(declared) = content_type {
            let declared_format = DocumentFormat::from_content_type(declared);
            if !declared_format.is_supported() {
                return Err(ProcessingError::Validation(format!(
                    "Invalid file type: {declared}"
                )));
            }
            if detected.is_supported() && detected != declared_format {
                return Err(ProcessingError::Validation(format!(
                    "Declared {declared} but content is {}",
                    detected.mime_type()
                )));
            }
        }
        let Some(extension) = detected.extension() else {
            return Err(ProcessingError::Validation(format!(
                "Unsupported file content for {filename}"
            )));
        };

        let id = Uuid::new_v4();
        std::fs::create_dir_all(&self.upload_dir)?;
        let stored_path = self.upload_dir.join(format!("{id}.{extension}"));
        std::fs::write(&stored_path, bytes)?;

        let document = Document {
            id,
            filename: filename.to_string(),
            file_path: stored_path.to_string_lossy().into_owned(),
            status: ProcessingStatus::Pending,
            upload_timestamp: Utc::now().naive_utc(),
        };
        if let Err(e) = self.store.create_document(&document) {
            let _ = std::fs::remove_file(&stored_path);
            return Err(e.into());
        }

        tracing::info!(
            document_id = %id,
            filename,
            format = detected.as_str(),
            size = bytes.len(),
            "Upload registered"
        );
        Ok(document)
    }

    /// Run the full pipeline for one document.
    ///
    /// `Err` only for preconditions (unknown document, store unavailable
    /// while marking PROCESSING or FAILED). Stage failures come back as a
    /// FAILED outcome.
    pub fn run_pipeline(&self, document_id: &Uuid) -> Result<PipelineOutcome, ProcessingError> {
        let document = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| ProcessingError::NotFound(format!("Document {document_id}")))?;

        self.store.set_status(document_id, ProcessingStatus::Processing)?;
        tracing::info!(document_id = %document_id, stage = "recognition", "Pipeline started");

        // Stage 1: recognition, committed on its own
        let extraction = match self.extractor.extract_file(Path::new(&document.file_path)) {
            Ok(result) => result,
            Err(e) => return self.fail(document_id, PipelineStage::Recognition, e.to_string()),
        };
        if let Err(e) = self.store.record_raw_text(document_id, &extraction.full_text) {
            return self.fail(
                document_id,
                PipelineStage::Recognition,
                format!("Failed to record text: {e}"),
            );
        }
        tracing::info!(
            document_id = %document_id,
            pages = extraction.page_count(),
            chars = extraction.full_text.len(),
            "Raw text recorded"
        );

        // Stage 2: field extraction, committed atomically
        let record = self.parser.parse(&extraction.full_text);
        if let Err(e) = self.store.record_extraction(document_id, &record) {
            return self.fail(
                document_id,
                PipelineStage::Extraction,
                format!("Failed to record structured data: {e}"),
            );
        }

        self.store.set_status(document_id, ProcessingStatus::Completed)?;
        tracing::info!(
            document_id = %document_id,
            medicines = record.medicines.len(),
            "Pipeline completed"
        );

        Ok(PipelineOutcome {
            document_id: *document_id,
            status: ProcessingStatus::Completed,
            page_count: extraction.page_count(),
            medicine_count: record.medicines.len(),
            failure: None,
        })
    }

    fn fail(
        &self,
        document_id: &Uuid,
        stage: PipelineStage,
        reason: String,
    ) -> Result<PipelineOutcome, ProcessingError> {
        tracing::warn!(
            document_id = %document_id,
            stage = stage.as_str(),
            reason = %reason,
            "Pipeline stage failed"
        );
        self.store.set_status(document_id, ProcessingStatus::Failed)?;
        Ok(PipelineOutcome {
            document_id: *document_id,
            status: ProcessingStatus::Failed,
            page_count: 0,
            medicine_count: 0,
            failure: Some(StageFailure { stage, reason }),
        })
    }

    pub fn document_status(&self, document_id: &Uuid) -> Result<ProcessingStatus, ProcessingError> {
        Ok(self.require_document(document_id)?.status)
    }

    /// Structured result. DataIncomplete until extraction has committed.
    pub fn fetch_result(&self, document_id: &Uuid) -> Result<Prescription, ProcessingError> {
        self.require_document(document_id)?;
        match self.store.get_prescription(document_id)? {
            Some(p) if p.is_structured() => Ok(p),
            _ => Err(ProcessingError::DataIncomplete(*document_id)),
        }
    }

    /// Attach the stored record to a finished run.
    pub fn report(&self, outcome: PipelineOutcome) -> Result<ProcessReport, ProcessingError> {
        let result = if outcome.is_completed() {
            Some(self.fetch_result(&outcome.document_id)?)
        } else {
            None
        };
        Ok(ProcessReport { outcome, result })
    }

    /// Store a human correction and mark the prescription validated.
    /// The first AI extraction is kept untouched.
    pub fn submit_correction(
        &self,
        document_id: &Uuid,
        correction: &StructuredRecord,
    ) -> Result<Prescription, ProcessingError> {
        self.fetch_result(document_id)?;
        self.store.record_correction(document_id, correction)?;
        tracing::info!(
            document_id = %document_id,
            medicines = correction.medicines.len(),
            "Human correction recorded"
        );
        self.fetch_result(document_id)
    }

    fn require_document(&self, document_id: &Uuid) -> Result<Document, ProcessingError> {
        self.store
            .get_document(document_id)?
            .ok_or_else(|| ProcessingError::NotFound(format!("Document {document_id}")))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::db::SqliteDocumentStore;
    use crate::models::MedicineEntry;
    use crate::pipeline::extraction::ocr::{FailingOcrEngine, MockOcrEngine};
    use crate::pipeline::extraction::orchestrator::VisionExtractor;
    use crate::pipeline::extraction::types::OcrEngine;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

    const OCR_TEXT: &str = "Dr. House\nPatient : Jean Dupont\n12/12/2024\n1. DOLIPRANE 1000mg matin et soir";

    fn png_bytes() -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([255, 255, 255])));
        let mut cursor = Cursor::new(Vec::new());
        img.write_to(&mut cursor, ImageFormat::Png).unwrap();
        cursor.into_inner()
    }

    fn processor_with(
        store: Arc<dyn DocumentStore>,
        engine: impl OcrEngine + 'static,
        dir: &Path,
    ) -> DocumentProcessor {
        DocumentProcessor::new(
            store,
            Box::new(VisionExtractor::new(Box::new(engine))),
            PrescriptionParser::french(),
            dir,
        )
    }

    fn setup(engine: impl OcrEngine + 'static) -> (tempfile::TempDir, DocumentProcessor) {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let processor = processor_with(store, engine, dir.path());
        (dir, processor)
    }

    /// Store that loses every structured write.
    struct RejectingExtractionStore(SqliteDocumentStore);

    impl DocumentStore for RejectingExtractionStore {
        fn create_document(&self, d: &Document) -> Result<(), DatabaseError> {
            self.0.create_document(d)
        }
        fn get_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
            self.0.get_document(id)
        }
        fn set_status(&self, id: &Uuid, s: ProcessingStatus) -> Result<(), DatabaseError> {
            self.0.set_status(id, s)
        }
        fn get_prescription(&self, id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
            self.0.get_prescription(id)
        }
        fn record_raw_text(&self, id: &Uuid, text: &str) -> Result<(), DatabaseError> {
            self.0.record_raw_text(id, text)
        }
        fn record_extraction(&self, _: &Uuid, _: &StructuredRecord) -> Result<(), DatabaseError> {
            Err(DatabaseError::ConstraintViolation("disk full".into()))
        }
        fn record_correction(&self, id: &Uuid, r: &StructuredRecord) -> Result<(), DatabaseError> {
            self.0.record_correction(id, r)
        }
    }

    #[test]
    fn upload_creates_pending_document_and_file() {
        let (dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let doc = processor
            .register_upload("ordonnance.png", Some("image/png"), &png_bytes())
            .unwrap();

        assert_eq!(doc.status, ProcessingStatus::Pending);
        assert!(Path::new(&doc.file_path).exists());
        assert!(doc.file_path.ends_with(".png"));
        assert!(Path::new(&doc.file_path).starts_with(dir.path()));
        assert_eq!(processor.document_status(&doc.id).unwrap(), ProcessingStatus::Pending);
    }

    #[test]
    fn disallowed_type_rejected_without_state() {
        let (dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let err = processor
            .register_upload("notes.txt", Some("text/plain"), b"Patient : X")
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Validation(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn content_not_matching_declared_type_rejected() {
        let (_dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let err = processor
            .register_upload("scan.pdf", Some("application/pdf"), &png_bytes())
            .unwrap_err();
        assert!(matches!(err, ProcessingError::Validation(_)));
    }

    #[test]
    fn unrecognized_content_rejected_without_declared_type() {
        let (_dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let err = processor.register_upload("blob", None, &[0u8; 32]).unwrap_err();
        assert!(matches!(err, ProcessingError::Validation(_)));
    }

    #[test]
    fn pipeline_completes_and_stores_both_records() {
        let (_dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let doc = processor.register_upload("a.png", None, &png_bytes()).unwrap();

        let outcome = processor.run_pipeline(&doc.id).unwrap();
        assert!(outcome.is_completed());
        assert_eq!(outcome.medicine_count, 1);
        assert!(outcome.failure.is_none());

        let p = processor.fetch_result(&doc.id).unwrap();
        assert_eq!(p.raw_text.as_deref(), Some(OCR_TEXT));
        let record = p.structured_json.unwrap();
        assert_eq!(record.patient.as_deref(), Some("Jean Dupont"));
        assert_eq!(record.medicines[0], MedicineEntry::new("DOLIPRANE", "1000mg", "matin et soir"));
        assert_eq!(p.ai_structured_json.unwrap(), record);
        assert!(!p.is_validated);
    }

    #[test]
    fn ocr_failure_marks_failed_without_structured_write() {
        let (_dir, processor) = setup(FailingOcrEngine::new("tesseract crashed"));
        let doc = processor.register_upload("a.png", None, &png_bytes()).unwrap();

        let outcome = processor.run_pipeline(&doc.id).unwrap();
        let outcome_clone = outcome.clone();
        assert_eq!(outcome.status, ProcessingStatus::Failed);
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.stage, PipelineStage::Recognition);
        assert!(failure.reason.contains("tesseract crashed"));

        assert_eq!(processor.document_status(&doc.id).unwrap(), ProcessingStatus::Failed);
        assert!(processor.store().get_prescription(&doc.id).unwrap().is_none());
        assert!(matches!(
            outcome_clone.into_result(),
            Err(ProcessingError::StageFailure { stage: PipelineStage::Recognition, .. })
        ));
        assert!(matches!(
            processor.fetch_result(&doc.id),
            Err(ProcessingError::DataIncomplete(_))
        ));
    }

    #[test]
    fn report_carries_outcome_and_record_in_one_object() {
        let (_dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let doc = processor.register_upload("a.png", None, &png_bytes()).unwrap();
        let outcome = processor.run_pipeline(&doc.id).unwrap();

        let json = serde_json::to_value(processor.report(outcome).unwrap()).unwrap();
        let object = json.as_object().unwrap();
        assert_eq!(object.len(), 2);
        assert_eq!(json["outcome"]["status"], "completed");
        assert_eq!(json["result"]["structured_json"]["patient"], "Jean Dupont");
    }

    #[test]
    fn failed_report_has_null_result() {
        let (_dir, processor) = setup(FailingOcrEngine::new("offline"));
        let doc = processor.register_upload("a.png", None, &png_bytes()).unwrap();
        let outcome = processor.run_pipeline(&doc.id).unwrap();

        let json = serde_json::to_value(processor.report(outcome).unwrap()).unwrap();
        assert!(json["result"].is_null());
        assert_eq!(json["outcome"]["failure"]["stage"], "recognition");
    }

    #[test]
    fn extraction_write_failure_leaves_text_only() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DocumentStore> =
            Arc::new(RejectingExtractionStore(SqliteDocumentStore::in_memory().unwrap()));
        let processor = processor_with(store, MockOcrEngine::new(OCR_TEXT), dir.path());
        let doc = processor.register_upload("a.png", None, &png_bytes()).unwrap();

        let outcome = processor.run_pipeline(&doc.id).unwrap();
        assert_eq!(outcome.status, ProcessingStatus::Failed);
        assert_eq!(outcome.failure.unwrap().stage, PipelineStage::Extraction);

        let p = processor.store().get_prescription(&doc.id).unwrap().unwrap();
        assert_eq!(p.raw_text.as_deref(), Some(OCR_TEXT));
        assert!(p.structured_json.is_none());
        assert!(p.ai_structured_json.is_none());
    }

    #[test]
    fn rerun_keeps_first_ai_record() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let first = processor_with(store.clone(), MockOcrEngine::new("1. AMOXICILLINE 500mg"), dir.path());
        let doc = first.register_upload("a.png", None, &png_bytes()).unwrap();
        first.run_pipeline(&doc.id).unwrap();

        let second = processor_with(store, MockOcrEngine::new("1. DOLIPRANE 1000mg"), dir.path());
        let outcome = second.run_pipeline(&doc.id).unwrap();
        assert!(outcome.is_completed());

        let p = second.fetch_result(&doc.id).unwrap();
        assert_eq!(p.ai_structured_json.unwrap().medicines[0].drug_name, "AMOXICILLINE");
        assert_eq!(p.structured_json.unwrap().medicines[0].drug_name, "DOLIPRANE");
        assert_eq!(p.raw_text.as_deref(), Some("1. DOLIPRANE 1000mg"));
    }

    #[test]
    fn correction_validates_and_preserves_ai_copy() {
        let (_dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let doc = processor.register_upload("a.png", None, &png_bytes()).unwrap();
        processor.run_pipeline(&doc.id).unwrap();

        let correction = StructuredRecord {
            medicines: vec![
                MedicineEntry::new("DOLIPRANE", "1000mg", "matin et soir"),
                MedicineEntry::new("SPASFON", "80mg", ""),
            ],
            ..StructuredRecord::default()
        };
        let p = processor.submit_correction(&doc.id, &correction).unwrap();
        assert!(p.is_validated);
        assert_eq!(p.structured_json.unwrap(), correction);
        assert_eq!(p.ai_structured_json.unwrap().medicines.len(), 1);
    }

    #[test]
    fn correction_before_extraction_is_data_incomplete() {
        let (_dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let doc = processor.register_upload("a.png", None, &png_bytes()).unwrap();
        let err = processor
            .submit_correction(&doc.id, &StructuredRecord::default())
            .unwrap_err();
        assert!(matches!(err, ProcessingError::DataIncomplete(_)));
    }

    #[test]
    fn unknown_document_is_not_found_everywhere() {
        let (_dir, processor) = setup(MockOcrEngine::new(OCR_TEXT));
        let id = Uuid::new_v4();
        assert!(matches!(processor.run_pipeline(&id), Err(ProcessingError::NotFound(_))));
        assert!(matches!(processor.document_status(&id), Err(ProcessingError::NotFound(_))));
        assert!(matches!(processor.fetch_result(&id), Err(ProcessingError::NotFound(_))));
        assert!(matches!(
            processor.submit_correction(&id, &StructuredRecord::default()),
            Err(ProcessingError::NotFound(_))
        ));
    }

    #[test]
    fn failed_document_can_be_rerun() {
        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::in_memory().unwrap());
        let failing = processor_with(store.clone(), FailingOcrEngine::new("offline"), dir.path());
        let doc = failing.register_upload("a.png", None, &png_bytes()).unwrap();
        assert_eq!(failing.run_pipeline(&doc.id).unwrap().status, ProcessingStatus::Failed);

        let working = processor_with(store, MockOcrEngine::new(OCR_TEXT), dir.path());
        assert!(working.run_pipeline(&doc.id).unwrap().is_completed());
        assert_eq!(working.document_status(&doc.id).unwrap(), ProcessingStatus::Completed);
    }
}
