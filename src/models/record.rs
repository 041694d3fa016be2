use serde::{Deserialize, Serialize};

/// Schema shared by the field extractor (producer) and the metrics
/// evaluator (consumer). Missing fields degrade to `None` / empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredRecord {
    #[serde(default)]
    pub patient: Option<String>,
    #[serde(default)]
    pub doctor: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub medicines: Vec<MedicineEntry>,
}

/// One numbered prescription line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedicineEntry {
    #[serde(default)]
    pub drug_name: String,
    #[serde(default)]
    pub dosage: String,
    #[serde(default)]
    pub raw_instruction: String,
    /// Reserved for ATC code mapping; always null for now.
    #[serde(default)]
    pub standardized_code: Option<String>,
}

impl MedicineEntry {
    pub fn new(drug_name: &str, dosage: &str, raw_instruction: &str) -> Self {
        Self {
            drug_name: drug_name.to_string(),
            dosage: dosage.to_string(),
            raw_instruction: raw_instruction.to_string(),
            standardized_code: None,
        }
    }
}
