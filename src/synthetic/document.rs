use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::catalog::{CatalogEntry, DrugCatalog};

pub const DEFAULT_PRESCRIBER: &str = "House";
pub const DEFAULT_PRESCRIPTION_DATE: &str = "12/12/2024";
/// Upper bound on medicine rows per synthetic prescription.
pub const MAX_LINE_ITEMS: usize = 3;

/// A prescription to be rendered. Drawn once, rendered once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntheticDocument {
    pub patient_name: String,
    pub prescriber_name: String,
    pub date: String,
    pub lines: Vec<LineItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub drug_name: String,
    pub strength: String,
    pub posology: String,
    pub form: String,
}

impl LineItem {
    pub fn from_catalog(entry: &CatalogEntry) -> Self {
        Self {
            drug_name: entry.drug_name().to_string(),
            strength: entry.prod_strength.trim().to_string(),
            posology: posology(entry.form(), entry.route_phrase()),
            form: entry.form().to_string(),
        }
    }
}

/// Dosing instruction template rendered under each drug row.
pub fn posology(form: &str, route_phrase: &str) -> String {
    format!("1 {form}, 3 fois par jour ({route_phrase})")
}

impl SyntheticDocument {
    /// Draw one to three distinct catalog rows, never more than the catalog holds.
    pub fn sample<R: Rng + ?Sized>(catalog: &DrugCatalog, rng: &mut R) -> Self {
        let wanted = rng.gen_range(1..=MAX_LINE_ITEMS).min(catalog.len());
        let lines = catalog
            .entries()
            .choose_multiple(rng, wanted)
            .map(LineItem::from_catalog)
            .collect();

        Self {
            patient_name: format!("Patient {}", rng.gen_range(100..=999)),
            prescriber_name: DEFAULT_PRESCRIBER.to_string(),
            date: DEFAULT_PRESCRIPTION_DATE.to_string(),
            lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn posology_template() {
        assert_eq!(posology("gélule", "orale"), "1 gélule, 3 fois par jour (orale)");
    }

    #[test]
    fn sample_draws_distinct_catalog_rows() {
        let catalog = DrugCatalog::fallback();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let doc = SyntheticDocument::sample(&catalog, &mut rng);
            assert!((1..=3).contains(&doc.lines.len()));
            let names: HashSet<_> = doc.lines.iter().map(|l| l.drug_name.as_str()).collect();
            assert_eq!(names.len(), doc.lines.len());
            assert!(doc.lines.iter().all(|l| catalog.contains_drug(&l.drug_name)));
        }
    }

    #[test]
    fn sample_capped_by_catalog_size() {
        let catalog =
            DrugCatalog::from_reader("drug,prod_strength,route,form_rx\nASPIRINE,100mg,PO,\n".as_bytes())
                .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(SyntheticDocument::sample(&catalog, &mut rng).lines.len(), 1);
        }
    }

    #[test]
    fn patient_number_in_range() {
        let mut rng = StdRng::seed_from_u64(11);
        let doc = SyntheticDocument::sample(&DrugCatalog::fallback(), &mut rng);
        let number: u32 = doc.patient_name.strip_prefix("Patient ").unwrap().parse().unwrap();
        assert!((100..=999).contains(&number));
        assert_eq!(doc.prescriber_name, "House");
        assert_eq!(doc.date, "12/12/2024");
    }

    #[test]
    fn same_seed_same_document() {
        let catalog = DrugCatalog::fallback();
        let a = SyntheticDocument::sample(&catalog, &mut StdRng::seed_from_u64(42));
        let b = SyntheticDocument::sample(&catalog, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn line_item_uses_route_phrase() {
        let entry = CatalogEntry::new("VOLTARENE", "1%", "TOPICAL", "gel");
        let line = LineItem::from_catalog(&entry);
        assert_eq!(line.posology, "1 gel, 3 fois par jour (cutanée)");
        assert_eq!(line.strength, "1%");
    }
}
