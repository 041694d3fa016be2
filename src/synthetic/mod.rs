//! Synthetic prescription generation for OCR benchmarking.
//!
//! A `SyntheticGenerator` samples drugs from a `DrugCatalog`, renders a
//! fixed-layout prescription with exact ground-truth boxes, then runs the
//! `DegradationSimulator` over the render before writing the PNG and its
//! ground-truth JSON side by side.

pub mod catalog;
pub mod degrade;
pub mod document;
pub mod generator;
pub mod render;

pub use catalog::*;
pub use degrade::*;
pub use document::*;
pub use generator::*;
pub use render::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyntheticError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog could not be read: {0}")]
    Catalog(#[from] csv::Error),

    #[error("No usable TrueType font: {0}")]
    FontUnavailable(String),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Ground truth serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
