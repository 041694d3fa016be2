use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::SyntheticError;

pub const DEFAULT_DRUG_NAME: &str = "MEDICAMENT";
pub const DEFAULT_FORM: &str = "comprimé";
pub const DEFAULT_ROUTE_PHRASE: &str = "orale";

/// One catalog row. Column names follow the MIMIC prescriptions export;
/// extra columns are ignored and missing ones read as empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(default)]
    pub drug: String,
    #[serde(default)]
    pub prod_strength: String,
    #[serde(default)]
    pub route: String,
    #[serde(default)]
    pub form_rx: String,
}

impl CatalogEntry {
    pub fn new(drug: &str, prod_strength: &str, route: &str, form_rx: &str) -> Self {
        Self {
            drug: drug.to_string(),
            prod_strength: prod_strength.to_string(),
            route: route.to_string(),
            form_rx: form_rx.to_string(),
        }
    }

    pub fn drug_name(&self) -> &str {
        non_empty_or(&self.drug, DEFAULT_DRUG_NAME)
    }

    pub fn form(&self) -> &str {
        non_empty_or(&self.form_rx, DEFAULT_FORM)
    }

    pub fn route_phrase(&self) -> &'static str {
        route_phrase(&self.route)
    }
}

fn non_empty_or<'a>(value: &'a str, default: &'a str) -> &'a str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default
    } else {
        trimmed
    }
}

/// French phrase for an administration route code. Unknown codes read as oral.
pub fn route_phrase(code: &str) -> &'static str {
    match code.trim().to_ascii_uppercase().as_str() {
        "PO" | "ORAL" => "orale",
        "IV" => "intraveineuse",
        "IM" => "intramusculaire",
        "TOPICAL" => "cutanée",
        "INHALATION" => "inhalée",
        "SC" => "sous-cutanée",
        _ => DEFAULT_ROUTE_PHRASE,
    }
}

/// Drug rows available to the generator. Never empty.
#[derive(Debug, Clone)]
pub struct DrugCatalog {
    entries: Vec<CatalogEntry>,
}

impl DrugCatalog {
    /// Built-in three-row catalog used when no file is supplied.
    pub fn fallback() -> Self {
        Self {
            entries: vec![
                CatalogEntry::new("AMOXICILLINE", "500mg", "ORAL", "gélule"),
                CatalogEntry::new("DOLIPRANE", "1000mg", "ORAL", "comprimé"),
                CatalogEntry::new("VOLTARENE", "1%", "TOPICAL", "gel"),
            ],
        }
    }

    /// Parse CSV with a header row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, SyntheticError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut entries = Vec::new();
        for row in csv_reader.deserialize::<CatalogEntry>() {
            entries.push(row?);
        }
        Ok(Self { entries })
    }

    /// Load `path` when it exists and parses to at least one row,
    /// otherwise fall back to the built-in catalog.
    pub fn load_or_fallback(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::fallback();
        };
        if !path.exists() {
            tracing::info!(path = %path.display(), "Catalog not found, using built-in drugs");
            return Self::fallback();
        }

        match std::fs::File::open(path)
            .map_err(SyntheticError::from)
            .and_then(Self::from_reader)
        {
            Ok(catalog) if !catalog.entries.is_empty() => {
                tracing::info!(path = %path.display(), rows = catalog.len(), "Catalog loaded");
                catalog
            }
            Ok(_) => {
                tracing::warn!(path = %path.display(), "Catalog has no rows, using built-in drugs");
                Self::fallback()
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Catalog unreadable, using built-in drugs");
                Self::fallback()
            }
        }
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when `name` is one of the catalog's rendered drug names.
    pub fn contains_drug(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.drug_name() == name)
    }
}
