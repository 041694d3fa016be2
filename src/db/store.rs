//! Persistence collaborator used by the document pipeline.
//!
//! The pipeline only ever performs single-document operations through this
//! trait; listing lives in the repository layer for the statistics command.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::sqlite::{open_database, open_memory_database};
use super::DatabaseError;
use crate::models::enums::ProcessingStatus;
use crate::models::{Document, Prescription, StructuredRecord};

pub trait DocumentStore: Send + Sync {
    fn create_document(&self, document: &Document) -> Result<(), DatabaseError>;

    fn get_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError>;

    fn set_status(&self, id: &Uuid, status: ProcessingStatus) -> Result<(), DatabaseError>;

    fn get_prescription(&self, document_id: &Uuid) -> Result<Option<Prescription>, DatabaseError>;

    /// Durably record OCR output. Commits independently of extraction.
    fn record_raw_text(&self, document_id: &Uuid, raw_text: &str) -> Result<(), DatabaseError>;

    /// Atomically commit an extraction result (AI copy written once).
    fn record_extraction(
        &self,
        document_id: &Uuid,
        record: &StructuredRecord,
    ) -> Result<(), DatabaseError>;

    /// Replace the current record with a human correction and validate it.
    fn record_correction(
        &self,
        document_id: &Uuid,
        record: &StructuredRecord,
    ) -> Result<(), DatabaseError>;
}

/// SQLite-backed store sharing one connection behind a mutex.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_database(path)?))
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::from_connection(open_memory_database()?))
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Lock the connection for ad hoc queries (statistics, listing).
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn
            .lock()
            .map_err(|_| DatabaseError::ConstraintViolation("Database lock poisoned".into()))
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn create_document(&self, document: &Document) -> Result<(), DatabaseError> {
        repository::insert_document(&*self.connection()?, document)
    }

    fn get_document(&self, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
        repository::get_document(&*self.connection()?, id)
    }

    fn set_status(&self, id: &Uuid, status: ProcessingStatus) -> Result<(), DatabaseError> {
        repository::update_document_status(&*self.connection()?, id, status)
    }

    fn get_prescription(&self, document_id: &Uuid) -> Result<Option<Prescription>, DatabaseError> {
        repository::get_prescription_by_document(&*self.connection()?, document_id)
    }

    fn record_raw_text(&self, document_id: &Uuid, raw_text: &str) -> Result<(), DatabaseError> {
        repository::upsert_raw_text(&*self.connection()?, document_id, raw_text)
    }

    fn record_extraction(
        &self,
        document_id: &Uuid,
        record: &StructuredRecord,
    ) -> Result<(), DatabaseError> {
        repository::record_extraction(&*self.connection()?, document_id, record)
    }

    fn record_correction(
        &self,
        document_id: &Uuid,
        record: &StructuredRecord,
    ) -> Result<(), DatabaseError> {
        repository::record_correction(&*self.connection()?, document_id, record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn document() -> Document {
        Document {
            id: Uuid::new_v4(),
            filename: "scan.jpg".into(),
            file_path: "/uploads/scan.jpg".into(),
            status: ProcessingStatus::Pending,
            upload_timestamp: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn store_round_trips_a_document_lifecycle() {
        let store = SqliteDocumentStore::in_memory().unwrap();
        let doc = document();
        store.create_document(&doc).unwrap();
        store.set_status(&doc.id, ProcessingStatus::Processing).unwrap();
        store.record_raw_text(&doc.id, "1. DOLIPRANE 1000mg").unwrap();
        store
            .record_extraction(&doc.id, &StructuredRecord::default())
            .unwrap();
        store.set_status(&doc.id, ProcessingStatus::Completed).unwrap();

        let loaded = store.get_document(&doc.id).unwrap().unwrap();
        assert_eq!(loaded.status, ProcessingStatus::Completed);
        let p = store.get_prescription(&doc.id).unwrap().unwrap();
        assert!(p.is_structured());
        assert!(p.ai_structured_json.is_some());
        assert!(!p.is_validated);
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordoscan.db");
        let doc = document();
        {
            let store = SqliteDocumentStore::open(&path).unwrap();
            store.create_document(&doc).unwrap();
        }
        let store = SqliteDocumentStore::open(&path).unwrap();
        assert!(store.get_document(&doc.id).unwrap().is_some());
    }
}
