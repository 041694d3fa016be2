//! Repository layer: entity-scoped database operations.

mod document;
mod prescription;

pub use document::*;
pub use prescription::*;

use uuid::Uuid;

use super::DatabaseError;

pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
