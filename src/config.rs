use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::extraction::PageSegmentation;

/// Application-level constants
pub const APP_NAME: &str = "Ordoscan";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// File name looked up from the working directory upward.
pub const CONFIG_FILE_NAME: &str = "ordoscan.toml";

/// Default tracing filter when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "ordoscan=debug,ordoscan_lib=debug"
    } else {
        "ordoscan=info,ordoscan_lib=info"
    }
}

/// Get the application data directory
/// ~/Ordoscan/ on all platforms, falling back to the working directory
/// when no home directory can be resolved.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid TOML in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Runtime configuration. Every field has a default so an empty
/// `ordoscan.toml` is valid.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for uploads, synthetic data, reports and the database.
    pub data_dir: PathBuf,
    /// Recognition language tag handed to the OCR engine.
    pub ocr_language: String,
    /// Tesseract executable (name on PATH or absolute path).
    pub tesseract_command: String,
    /// Layout hint for the OCR engine: `single_block` or `automatic`.
    pub page_segmentation: PageSegmentation,
    /// DPI used when rasterizing PDF pages.
    pub render_dpi: u32,
    /// Upper bound on concurrently running document pipelines.
    pub max_concurrent_pipelines: usize,
    /// Regular-weight TrueType font for synthetic rendering.
    pub font_regular: Option<PathBuf>,
    /// Bold TrueType font for synthetic rendering.
    pub font_bold: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: app_data_dir(),
            ocr_language: "fra".into(),
            tesseract_command: "tesseract".into(),
            page_segmentation: PageSegmentation::SingleBlock,
            render_dpi: 200,
            max_concurrent_pipelines: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            font_regular: None,
            font_bold: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Discover `ordoscan.toml` in the working directory or its parents.
    pub fn discover() -> Result<Option<Self>, ConfigError> {
        let Ok(mut current) = std::env::current_dir() else {
            return Ok(None);
        };

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.exists() {
                return Self::from_toml_file(&candidate).map(Some);
            }
            if !current.pop() {
                break;
            }
        }

        Ok(None)
    }

    /// Resolve the effective config: explicit file, else discovered file,
    /// else defaults. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match explicit {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::discover()?.unwrap_or_default(),
        };
        Ok(base.with_env_overrides())
    }

    /// Apply `ORDOSCAN_*` environment variables on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("ORDOSCAN_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(lang) = std::env::var("ORDOSCAN_OCR_LANG") {
            self.ocr_language = lang;
        }
        if let Ok(cmd) = std::env::var("ORDOSCAN_TESSERACT") {
            self.tesseract_command = cmd;
        }
        if self.max_concurrent_pipelines == 0 {
            tracing::warn!("max_concurrent_pipelines = 0 is invalid, using 1");
            self.max_concurrent_pipelines = 1;
        }
        self
    }

    /// Uploaded originals, stored under generated names.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Synthetic image + ground truth pairs.
    pub fn synthetic_dir(&self) -> PathBuf {
        self.uploads_dir().join("synthetic")
    }

    /// Benchmark CSV reports.
    pub fn benchmark_results_dir(&self) -> PathBuf {
        self.uploads_dir().join("benchmark_results")
    }

    /// Default drug catalog location for synthetic generation.
    pub fn catalog_path(&self) -> PathBuf {
        self.uploads_dir().join("mimic_prescriptions.csv")
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("ordoscan.db")
    }
}
