use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use super::similarity::similarity_ratio_ignore_case;
use super::{round2, EvaluationError};
use crate::pipeline::extraction::TextExtractor;

pub const REPORT_FILE_NAME: &str = "latest_benchmark.csv";
const SNIPPET_CHARS: usize = 50;
const REPORT_HEADERS: [&str; 6] = [
    "filename",
    "score",
    "truth_length",
    "ocr_length",
    "truth_snippet",
    "ocr_snippet",
];

/// One scored synthetic document. Lengths count characters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkRecord {
    pub filename: String,
    pub score: f64,
    pub truth_length: usize,
    pub ocr_length: usize,
    pub truth_snippet: String,
    pub ocr_snippet: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkSummary {
    pub total_documents: usize,
    pub average_similarity_score: f64,
    pub report_path: PathBuf,
    /// Images left out of the aggregate, with no readable ground truth.
    pub skipped: Vec<String>,
    pub details: Vec<BenchmarkRecord>,
}

#[derive(Deserialize)]
struct TruthSpan {
    #[serde(default)]
    text: Option<String>,
}

/// Expected text of a synthetic document: every entry's `text`, in stored
/// order, newline-joined.
pub fn load_ground_truth_text(path: &Path) -> Result<String, EvaluationError> {
    let raw = std::fs::read_to_string(path)?;
    let spans: Vec<TruthSpan> = serde_json::from_str(&raw)?;
    Ok(spans
        .into_iter()
        .filter_map(|s| s.text)
        .collect::<Vec<_>>()
        .join("\n"))
}

fn snippet(text: &str) -> String {
    text.chars()
        .take(SNIPPET_CHARS)
        .collect::<String>()
        .replace('\n', " ")
}

/// Score one hypothesis against its ground truth. Returns the record and
/// the unrounded score used for the aggregate.
pub fn score_document(filename: &str, truth: &str, hypothesis: &str) -> (BenchmarkRecord, f64) {
    let score = similarity_ratio_ignore_case(truth, hypothesis);
    let record = BenchmarkRecord {
        filename: filename.to_string(),
        score: round2(score),
        truth_length: truth.chars().count(),
        ocr_length: hypothesis.chars().count(),
        truth_snippet: snippet(truth),
        ocr_snippet: snippet(hypothesis),
    };
    (record, score)
}

/// Write a flat CSV table, header included even when empty.
pub fn write_report(path: &Path, records: &[BenchmarkRecord]) -> Result<(), EvaluationError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(REPORT_HEADERS)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Scores OCR output over a directory of synthetic `*.png` + `*.json` pairs.
pub struct BenchmarkRunner {
    extractor: Arc<dyn TextExtractor>,
    synthetic_dir: PathBuf,
    results_dir: PathBuf,
    max_concurrent: usize,
}

impl BenchmarkRunner {
    pub fn new(extractor: Arc<dyn TextExtractor>, synthetic_dir: &Path, results_dir: &Path) -> Self {
        Self {
            extractor,
            synthetic_dir: synthetic_dir.to_path_buf(),
            results_dir: results_dir.to_path_buf(),
            max_concurrent: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    pub fn report_path(&self) -> PathBuf {
        self.results_dir.join(REPORT_FILE_NAME)
    }

    /// Pair every PNG with its sibling JSON. Images without one are
    /// returned as skipped file names.
    fn discover(&self) -> Result<(Vec<(String, PathBuf, PathBuf)>, Vec<String>), EvaluationError> {
        let mut pairs = Vec::new();
        let mut skipped = Vec::new();
        if !self.synthetic_dir.exists() {
            tracing::warn!(dir = %self.synthetic_dir.display(), "Synthetic directory missing");
            return Ok((pairs, skipped));
        }

        for entry in std::fs::read_dir(&self.synthetic_dir)? {
            let path = entry?.path();
            if !path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("png")) {
                continue;
            }
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let truth_path = path.with_extension("json");
            if truth_path.exists() {
                pairs.push((filename, path, truth_path));
            } else {
                tracing::warn!(filename = %filename, "No ground truth, skipping");
                skipped.push(filename);
            }
        }
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        Ok((pairs, skipped))
    }

    /// Score every pair, write the CSV report and return the summary.
    /// Per-document failures are isolated; only report I/O aborts the run.
    pub async fn run(&self) -> Result<BenchmarkSummary, EvaluationError> {
        let (pairs, mut skipped) = self.discover()?;
        tracing::info!(
            documents = pairs.len(),
            dir = %self.synthetic_dir.display(),
            "Benchmark started"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = JoinSet::new();

        for (filename, image_path, truth_path) in pairs {
            let extractor = Arc::clone(&self.extractor);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (filename, None);
                };
                let name = filename.clone();
                let scored = tokio::task::spawn_blocking(move || {
                    evaluate_pair(&name, &image_path, &truth_path, extractor.as_ref())
                })
                .await;
                match scored {
                    Ok(Ok(scored)) => (filename, Some(scored)),
                    Ok(Err(e)) => {
                        tracing::warn!(filename = %filename, error = %e, "Ground truth unreadable, skipping");
                        (filename, None)
                    }
                    Err(e) => {
                        tracing::error!(filename = %filename, error = %e, "Benchmark task failed");
                        (filename, None)
                    }
                }
            });
        }

        let mut details = Vec::new();
        let mut total_score = 0.0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Some((record, score)))) => {
                    total_score += score;
                    details.push(record);
                }
                Ok((filename, None)) => skipped.push(filename),
                Err(e) => tracing::error!(error = %e, "Benchmark task panicked"),
            }
        }
        details.sort_by(|a, b| a.filename.cmp(&b.filename));
        skipped.sort();

        let average = if details.is_empty() {
            0.0
        } else {
            total_score / details.len() as f64
        };

        let report_path = self.report_path();
        write_report(&report_path, &details)?;

        tracing::info!(
            documents = details.len(),
            skipped = skipped.len(),
            average_score = round2(average),
            report = %report_path.display(),
            "Benchmark complete"
        );

        Ok(BenchmarkSummary {
            total_documents: details.len(),
            average_similarity_score: round2(average),
            report_path,
            skipped,
            details,
        })
    }
}

fn evaluate_pair(
    filename: &str,
    image_path: &Path,
    truth_path: &Path,
    extractor: &dyn TextExtractor,
) -> Result<(BenchmarkRecord, f64), EvaluationError> {
    let truth = load_ground_truth_text(truth_path)?;
    let hypothesis = match extractor.extract_file(image_path) {
        Ok(result) => result.full_text,
        Err(e) => {
            tracing::warn!(filename = %filename, error = %e, "OCR failed, scoring empty text");
            String::new()
        }
    };
    let (record, score) = score_document(filename, &truth, &hypothesis);
    tracing::debug!(filename = %filename, score = record.score, "Document scored");
    Ok((record, score))
}
