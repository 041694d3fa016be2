use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ProcessingStatus;

/// An uploaded page or multi-page file awaiting digitization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub filename: String,
    /// Where the original bytes live on disk.
    pub file_path: String,
    pub status: ProcessingStatus,
    pub upload_timestamp: NaiveDateTime,
}
