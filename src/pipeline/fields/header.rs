use std::sync::LazyLock;

use regex::Regex;

use super::{FieldExtractor, NormalizedText};
use crate::models::StructuredRecord;

static PATIENT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Patient\s*:\s*(.+)").expect("static regex"));

// Greedy: captures everything after the title on that line.
static DOCTOR_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Dr\.?\s*(.+)").expect("static regex"));

static DATE_DD_MM_YYYY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{2}/\d{2}/\d{4}").expect("static regex"));

/// The first line matching `pattern` supplies the value, trimmed. A label
/// followed only by spaces yields an empty string; later lines are not
/// consulted.
fn first_labelled_value(text: &NormalizedText, pattern: &Regex) -> Option<String> {
    text.lines()
        .find_map(|line| pattern.captures(line))
        .and_then(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
}

pub struct PatientExtractor;

impl FieldExtractor for PatientExtractor {
    fn name(&self) -> &'static str {
        "patient"
    }

    fn extract(&self, text: &NormalizedText, record: &mut StructuredRecord) {
        record.patient = first_labelled_value(text, &PATIENT_LABEL);
    }
}

pub struct DoctorExtractor;

impl FieldExtractor for DoctorExtractor {
    fn name(&self) -> &'static str {
        "doctor"
    }

    fn extract(&self, text: &NormalizedText, record: &mut StructuredRecord) {
        record.doctor = first_labelled_value(text, &DOCTOR_LABEL);
    }
}

pub struct DateExtractor;

impl FieldExtractor for DateExtractor {
    fn name(&self) -> &'static str {
        "date"
    }

    fn extract(&self, text: &NormalizedText, record: &mut StructuredRecord) {
        record.date = DATE_DD_MM_YYYY
            .find(text.as_str())
            .map(|m| m.as_str().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(extractor: &dyn FieldExtractor, raw: &str) -> StructuredRecord {
        let mut record = StructuredRecord::default();
        extractor.extract(&NormalizedText::new(raw), &mut record);
        record
    }

    #[test]
    fn patient_label_with_spaces() {
        let record = run(&PatientExtractor, "ORDONNANCE\nPatient : Jean Dupont\n");
        assert_eq!(record.patient.as_deref(), Some("Jean Dupont"));
    }

    #[test]
    fn patient_label_case_insensitive() {
        let record = run(&PatientExtractor, "PATIENT:Marie Curie  ");
        assert_eq!(record.patient.as_deref(), Some("Marie Curie"));
    }

    #[test]
    fn first_patient_line_wins() {
        let record = run(&PatientExtractor, "Patient : A\nPatient : B");
        assert_eq!(record.patient.as_deref(), Some("A"));
    }

    #[test]
    fn blank_first_patient_label_wins() {
        let record = run(&PatientExtractor, "Patient :  \nPatient : Jean");
        assert_eq!(record.patient.as_deref(), Some(""));
    }

    #[test]
    fn bare_patient_label_does_not_match() {
        let record = run(&PatientExtractor, "Patient :\nPatient : Jean");
        assert_eq!(record.patient.as_deref(), Some("Jean"));
    }

    #[test]
    fn missing_patient_is_none() {
        assert!(run(&PatientExtractor, "Nom : Jean").patient.is_none());
    }

    #[test]
    fn doctor_with_and_without_period() {
        assert_eq!(run(&DoctorExtractor, "Dr. House").doctor.as_deref(), Some("House"));
        assert_eq!(run(&DoctorExtractor, "dr Martin").doctor.as_deref(), Some("Martin"));
    }

    #[test]
    fn doctor_overcaptures_rest_of_line() {
        let record = run(&DoctorExtractor, "Dr. House - Cardiologue 01 23 45");
        assert_eq!(record.doctor.as_deref(), Some("House - Cardiologue 01 23 45"));
    }

    #[test]
    fn missing_doctor_is_none() {
        assert!(run(&DoctorExtractor, "Patient : X").doctor.is_none());
    }

    #[test]
    fn date_found_anywhere() {
        let record = run(&DateExtractor, "Fait à Paris le 03/07/2024, signé");
        assert_eq!(record.date.as_deref(), Some("03/07/2024"));
    }

    #[test]
    fn first_date_wins_and_short_dates_ignored() {
        let record = run(&DateExtractor, "3/7/24\n01/02/2023\n12/12/2024");
        assert_eq!(record.date.as_deref(), Some("01/02/2023"));
    }

    #[test]
    fn missing_date_is_none() {
        assert!(run(&DateExtractor, "sans date").date.is_none());
    }
}
