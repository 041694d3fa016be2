use std::str::FromStr;

use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::{parse_uuid, TIMESTAMP_FORMAT};
use crate::db::DatabaseError;
use crate::models::enums::ProcessingStatus;
use crate::models::Document;

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, filename, file_path, status, upload_timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            doc.id.to_string(),
            doc.filename,
            doc.file_path,
            doc.status.as_str(),
            doc.upload_timestamp.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_document(conn: &Connection, id: &Uuid) -> Result<Option<Document>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, filename, file_path, status, upload_timestamp
         FROM documents WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], |row| {
        Ok(DocumentRow {
            id: row.get::<_, String>(0)?,
            filename: row.get::<_, String>(1)?,
            file_path: row.get::<_, String>(2)?,
            status: row.get::<_, String>(3)?,
            upload_timestamp: row.get::<_, String>(4)?,
        })
    });

    match result {
        Ok(row) => Ok(Some(document_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Set the processing status. Errors with NotFound when no row matches.
pub fn update_document_status(
    conn: &Connection,
    id: &Uuid,
    status: ProcessingStatus,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE documents SET status = ?2 WHERE id = ?1",
        params![id.to_string(), status.as_str()],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Document".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

struct DocumentRow {
    id: String,
    filename: String,
    file_path: String,
    status: String,
    upload_timestamp: String,
}

fn document_from_row(row: DocumentRow) -> Result<Document, DatabaseError> {
    Ok(Document {
        id: parse_uuid(&row.id)?,
        filename: row.filename,
        file_path: row.file_path,
        status: ProcessingStatus::from_str(&row.status)?,
        upload_timestamp: NaiveDateTime::parse_from_str(&row.upload_timestamp, TIMESTAMP_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(&row.upload_timestamp, "%Y-%m-%dT%H:%M:%S"))
            .unwrap_or_default(),
    })
}
