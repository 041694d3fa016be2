use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::parse_uuid;
use crate::db::DatabaseError;
use crate::models::{Prescription, StructuredRecord};

const PRESCRIPTION_COLUMNS: &str =
    "id, document_id, raw_text, ai_structured_json, structured_json, is_validated";

pub fn get_prescription_by_document(
    conn: &Connection,
    document_id: &Uuid,
) -> Result<Option<Prescription>, DatabaseError> {
    let sql = format!("SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE document_id = ?1");
    let row = conn
        .query_row(&sql, params![document_id.to_string()], read_row)
        .optional()?;

    row.map(prescription_from_row).transpose()
}

/// Create the prescription row on first OCR, or replace its raw text on
/// re-runs. Structured columns are left untouched.
pub fn upsert_raw_text(
    conn: &Connection,
    document_id: &Uuid,
    raw_text: &str,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO prescriptions (id, document_id, raw_text)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(document_id) DO UPDATE SET raw_text = excluded.raw_text",
        params![Uuid::new_v4().to_string(), document_id.to_string(), raw_text],
    )?;
    Ok(())
}

/// Commit an extraction result in one transaction.
///
/// `ai_structured_json` is only written while NULL. `structured_json` is
/// replaced unless a human has already validated the prescription.
pub fn record_extraction(
    conn: &Connection,
    document_id: &Uuid,
    record: &StructuredRecord,
) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(record)?;

    let tx = conn.unchecked_transaction()?;
    let updated = tx.execute(
        "UPDATE prescriptions
         SET ai_structured_json = COALESCE(ai_structured_json, ?2),
             structured_json = CASE WHEN is_validated = 1 THEN structured_json ELSE ?2 END
         WHERE document_id = ?1",
        params![document_id.to_string(), json],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Prescription".into(),
            id: document_id.to_string(),
        });
    }
    tx.commit()?;
    Ok(())
}

/// Replace the current record with a human correction and mark it validated.
pub fn record_correction(
    conn: &Connection,
    document_id: &Uuid,
    record: &StructuredRecord,
) -> Result<(), DatabaseError> {
    let json = serde_json::to_string(record)?;
    let updated = conn.execute(
        "UPDATE prescriptions SET structured_json = ?2, is_validated = 1 WHERE document_id = ?1",
        params![document_id.to_string(), json],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Prescription".into(),
            id: document_id.to_string(),
        });
    }
    Ok(())
}

/// Validated prescriptions, for aggregate statistics.
pub fn list_validated_prescriptions(conn: &Connection) -> Result<Vec<Prescription>, DatabaseError> {
    let sql = format!(
        "SELECT {PRESCRIPTION_COLUMNS} FROM prescriptions WHERE is_validated = 1 ORDER BY document_id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], read_row)?;

    let mut prescriptions = Vec::new();
    for row in rows {
        prescriptions.push(prescription_from_row(row?)?);
    }
    Ok(prescriptions)
}

struct PrescriptionRow {
    id: String,
    document_id: String,
    raw_text: Option<String>,
    ai_structured_json: Option<String>,
    structured_json: Option<String>,
    is_validated: i32,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PrescriptionRow> {
    Ok(PrescriptionRow {
        id: row.get::<_, String>(0)?,
        document_id: row.get::<_, String>(1)?,
        raw_text: row.get::<_, Option<String>>(2)?,
        ai_structured_json: row.get::<_, Option<String>>(3)?,
        structured_json: row.get::<_, Option<String>>(4)?,
        is_validated: row.get::<_, i32>(5)?,
    })
}

fn prescription_from_row(row: PrescriptionRow) -> Result<Prescription, DatabaseError> {
    Ok(Prescription {
        id: parse_uuid(&row.id)?,
        document_id: parse_uuid(&row.document_id)?,
        raw_text: row.raw_text,
        ai_structured_json: parse_record(row.ai_structured_json)?,
        structured_json: parse_record(row.structured_json)?,
        is_validated: row.is_validated != 0,
    })
}

fn parse_record(json: Option<String>) -> Result<Option<StructuredRecord>, DatabaseError> {
    json.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(DatabaseError::from)
}
