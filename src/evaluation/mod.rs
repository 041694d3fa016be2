//! Recognition and extraction quality measurement.
//!
//! The benchmark scores OCR text against synthetic ground truth; the
//! metrics evaluator scores AI extraction against the human-corrected
//! record of the same document.

pub mod benchmark;
pub mod metrics;
pub mod similarity;

pub use benchmark::*;
pub use metrics::*;
pub use similarity::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Benchmark report could not be written: {0}")]
    Report(#[from] csv::Error),

    #[error("Ground truth unreadable: {0}")]
    GroundTruth(#[from] serde_json::Error),
}

/// Round to two decimals for reporting.
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
