use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::round2;
use super::similarity::similarity_ratio;
use crate::models::{MedicineEntry, Prescription, StructuredRecord};

/// How repeated drug names are counted when matching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPolicy {
    /// Names are deduplicated on both sides before counting.
    #[default]
    Set,
    /// Each occurrence matches at most one occurrence on the other side.
    Multiset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounts {
    pub ai_count: usize,
    pub human_count: usize,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
}

/// AI vs human comparison for one document. Ratios are rounded to 2 decimals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub similarity_score: f64,
    pub details: MatchCounts,
}

/// Means over validated documents. `NoData` when none qualify, which is
/// not the same as a zero score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AggregateMetrics {
    Scored {
        count: usize,
        avg_precision: f64,
        avg_recall: f64,
        avg_f1: f64,
    },
    NoData,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsEvaluator {
    policy: MatchPolicy,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

fn names(medicines: &[MedicineEntry]) -> Vec<String> {
    medicines.iter().map(|m| normalize(&m.drug_name)).collect()
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl MetricsEvaluator {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }

    fn count_matches(&self, ai: &[String], human: &[String]) -> (usize, usize, usize) {
        match self.policy {
            MatchPolicy::Set => {
                let ai: HashSet<&str> = ai.iter().map(String::as_str).collect();
                let human: HashSet<&str> = human.iter().map(String::as_str).collect();
                let tp = ai.intersection(&human).count();
                (tp, ai.len() - tp, human.len() - tp)
            }
            MatchPolicy::Multiset => {
                let mut remaining: HashMap<&str, usize> = HashMap::new();
                for name in human {
                    *remaining.entry(name.as_str()).or_default() += 1;
                }
                let mut tp = 0;
                for name in ai {
                    if let Some(left) = remaining.get_mut(name.as_str()).filter(|n| **n > 0) {
                        *left -= 1;
                        tp += 1;
                    }
                }
                (tp, ai.len() - tp, human.len() - tp)
            }
        }
    }

    /// Match drug names (trimmed, case-insensitive) between the AI record
    /// and the human one.
    pub fn evaluate(&self, ai: &StructuredRecord, human: &StructuredRecord) -> DocumentMetrics {
        let ai_names = names(&ai.medicines);
        let human_names = names(&human.medicines);
        let (tp, fp, fn_) = self.count_matches(&ai_names, &human_names);

        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        DocumentMetrics {
            precision: round2(precision),
            recall: round2(recall),
            f1_score: round2(f1),
            similarity_score: round2(medicine_list_similarity(&ai.medicines, &human.medicines)),
            details: MatchCounts {
                ai_count: ai.medicines.len(),
                human_count: human.medicines.len(),
                true_positives: tp,
                false_positives: fp,
                false_negatives: fn_,
            },
        }
    }

    /// Average per-document precision, recall and F1 over prescriptions that
    /// are validated and carry an AI record. Others are ignored.
    pub fn aggregate<'a, I>(&self, prescriptions: I) -> AggregateMetrics
    where
        I: IntoIterator<Item = &'a Prescription>,
    {
        let mut count = 0usize;
        let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);

        for prescription in prescriptions {
            if !prescription.is_validated {
                continue;
            }
            let Some(ai) = prescription.ai_structured_json.as_ref() else {
                continue;
            };
            let human = prescription.structured_json.clone().unwrap_or_default();
            let metrics = self.evaluate(ai, &human);
            precision += metrics.precision;
            recall += metrics.recall;
            f1 += metrics.f1_score;
            count += 1;
        }

        if count == 0 {
            return AggregateMetrics::NoData;
        }
        let n = count as f64;
        AggregateMetrics::Scored {
            count,
            avg_precision: round2(precision / n),
            avg_recall: round2(recall / n),
            avg_f1: round2(f1 / n),
        }
    }
}

/// Edit-distance ratio between the JSON serializations of two medicine lists.
fn medicine_list_similarity(ai: &[MedicineEntry], human: &[MedicineEntry]) -> f64 {
    let serialize = |list: &[MedicineEntry]| serde_json::to_string(list).unwrap_or_default();
    similarity_ratio(&serialize(ai), &serialize(human))
}
