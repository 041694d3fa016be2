//! Ordoscan command line.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use ordoscan_lib::config::{self, AppConfig};
use ordoscan_lib::db::repository::list_validated_prescriptions;
use ordoscan_lib::db::{DocumentStore, SqliteDocumentStore};
use ordoscan_lib::evaluation::{BenchmarkRunner, MatchPolicy, MetricsEvaluator};
use ordoscan_lib::models::StructuredRecord;
use ordoscan_lib::pipeline::extraction::VisionExtractor;
use ordoscan_lib::pipeline::fields::PrescriptionParser;
use ordoscan_lib::pipeline::{DocumentProcessor, PipelineQueue};
use ordoscan_lib::synthetic::{DrugCatalog, FontSet, SyntheticGenerator};

#[derive(Parser)]
#[command(name = "ordoscan", version = config::APP_VERSION)]
#[command(about = "Prescription digitization and OCR benchmarking", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ordoscan.toml discovered upward)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate synthetic prescriptions with ground truth
    Generate {
        /// Number of documents
        #[arg(short = 'n', long, default_value = "10")]
        count: usize,

        /// Drug catalog CSV (drug, prod_strength, route, form_rx)
        #[arg(long)]
        catalog: Option<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// RNG seed for a reproducible batch
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Score OCR against synthetic ground truth
    Benchmark {
        /// Directory of synthetic image + JSON pairs
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// Directory for the CSV report
        #[arg(short, long)]
        results: Option<PathBuf>,
    },

    /// Upload a prescription and run the digitization pipeline
    Process {
        file: PathBuf,

        /// Declared MIME type (checked against the file contents)
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Print the structured result of a document
    #[command(name = "result")]
    Show { document_id: Uuid },

    /// Submit a human-corrected record for a document
    Correct {
        document_id: Uuid,

        /// JSON file holding the corrected structured record
        record: PathBuf,
    },

    /// Aggregate AI vs human metrics over validated documents
    Stats {
        /// Count repeated drug names separately
        #[arg(long)]
        multiset: bool,
    },
}

fn open_processor(config: &AppConfig) -> Result<DocumentProcessor> {
    let store = SqliteDocumentStore::open(&config.database_path())
        .with_context(|| format!("opening {}", config.database_path().display()))?;
    let store: Arc<dyn DocumentStore> = Arc::new(store);
    Ok(DocumentProcessor::new(
        store,
        Box::new(VisionExtractor::from_config(config)),
        PrescriptionParser::french(),
        &config.uploads_dir(),
    ))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    ordoscan_lib::init_tracing();

    let config = AppConfig::load(cli.config.as_deref())?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Configuration loaded");

    match cli.command {
        Commands::Generate {
            count,
            catalog,
            out,
            seed,
        } => {
            let catalog_path = catalog.unwrap_or_else(|| config.catalog_path());
            let catalog = DrugCatalog::load_or_fallback(Some(&catalog_path));
            let fonts = FontSet::load(config.font_regular.as_deref(), config.font_bold.as_deref())?;
            let out = out.unwrap_or_else(|| config.synthetic_dir());

            let generator = SyntheticGenerator::new(&out, fonts).with_seed(seed);
            let generated =
                tokio::task::spawn_blocking(move || generator.generate_batch(count, &catalog))
                    .await??;

            let names: Vec<String> = generated.iter().map(|d| d.base_name.clone()).collect();
            print_json(&serde_json::json!({
                "status": "success",
                "output_dir": out,
                "generated": names,
            }))
        }

        Commands::Benchmark { dir, results } => {
            let dir = dir.unwrap_or_else(|| config.synthetic_dir());
            let results = results.unwrap_or_else(|| config.benchmark_results_dir());
            let extractor = Arc::new(VisionExtractor::from_config(&config));

            let runner = BenchmarkRunner::new(extractor, &dir, &results)
                .with_max_concurrent(config.max_concurrent_pipelines);
            let summary = runner.run().await?;
            if summary.total_documents == 0 && summary.skipped.is_empty() {
                eprintln!("No synthetic data found in {}. Run `ordoscan generate` first.", dir.display());
            }
            print_json(&summary)
        }

        Commands::Process { file, content_type } => {
            let bytes = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload".into());

            let processor = Arc::new(open_processor(&config)?);
            let document = processor.register_upload(&filename, content_type.as_deref(), &bytes)?;
            let queue = PipelineQueue::new(Arc::clone(&processor), config.max_concurrent_pipelines);

            let outcome = queue.submit(document.id).wait().await?;
            let report = processor.report(outcome)?;
            print_json(&report)?;
            if !report.outcome.is_completed() {
                bail!("document {} failed", document.id);
            }
            Ok(())
        }

        Commands::Show { document_id } => {
            let processor = open_processor(&config)?;
            print_json(&processor.fetch_result(&document_id)?)
        }

        Commands::Correct { document_id, record } => {
            let raw = std::fs::read_to_string(&record)
                .with_context(|| format!("reading {}", record.display()))?;
            let correction: StructuredRecord =
                serde_json::from_str(&raw).context("correction is not a structured record")?;
            let processor = open_processor(&config)?;
            print_json(&processor.submit_correction(&document_id, &correction)?)
        }

        Commands::Stats { multiset } => {
            let store = SqliteDocumentStore::open(&config.database_path())?;
            let validated = list_validated_prescriptions(&*store.connection()?)?;
            let policy = if multiset {
                MatchPolicy::Multiset
            } else {
                MatchPolicy::Set
            };
            print_json(&MetricsEvaluator::new(policy).aggregate(&validated))
        }
    }
}
