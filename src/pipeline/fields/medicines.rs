use std::sync::LazyLock;

use regex::Regex;

use super::{FieldExtractor, NormalizedText};
use crate::models::{MedicineEntry, StructuredRecord};

/// `1. ...` or `2) ...` at the start of a line.
static NUMBERED_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+)[.)]\s*(.+)").expect("static regex"));

// Longer units first so "2 gélules" is not read as "2 g".
static DOSAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\d+\s*(?:comprimé|gélule|sachet|mg|ml|cp|g)").expect("static regex")
});

static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static regex"));

/// Every numbered line becomes one medicine entry, in line order.
/// Repeated drug names are kept as separate entries.
pub struct MedicineLinesExtractor;

impl FieldExtractor for MedicineLinesExtractor {
    fn name(&self) -> &'static str {
        "medicines"
    }

    fn extract(&self, text: &NormalizedText, record: &mut StructuredRecord) {
        record.medicines = text
            .lines()
            .filter_map(|line| NUMBERED_LINE.captures(line))
            .filter_map(|caps| caps.get(2).map(|m| split_medicine_line(m.as_str())))
            .collect();
    }
}

/// Split a medicine line on its first dosage mention.
pub fn split_medicine_line(line: &str) -> MedicineEntry {
    match DOSAGE.find(line) {
        Some(m) => MedicineEntry::new(
            &clean_drug_name(&line[..m.start()]),
            m.as_str(),
            line[m.end()..].trim(),
        ),
        None => MedicineEntry::new(&clean_drug_name(line), "", ""),
    }
}

fn clean_drug_name(raw: &str) -> String {
    NON_WORD.replace_all(raw.trim(), "").trim().to_string()
}
