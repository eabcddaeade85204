//! Laudo command-line front end.
//!
//! Every subcommand prints its result as pretty JSON on stdout; logs go to
//! stderr.

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use laudo::config::{self, AppConfig};
use laudo::pipeline::extraction::OcrBackendKind;
use laudo::pipeline::processor::DocumentProcessor;
use laudo::pipeline::structuring::{BatchAggregator, ExtractionService, OllamaClient};
use laudo::pipeline::workflow::StageLayout;
use laudo::review::{save_corrections, OcrCorrection};

#[derive(Parser)]
#[command(name = "laudo")]
#[command(about = "Digitize scanned medical reports: OCR, review stages and field extraction")]
#[command(version)]
struct Cli {
    /// Workflow root directory (overrides LAUDO_WORKFLOW_DIR)
    #[arg(long, global = true)]
    workflow_dir: Option<PathBuf>,

    /// OCR backend: tesseract, docling or textract (overrides LAUDO_OCR_BACKEND)
    #[arg(long, global = true)]
    backend: Option<OcrBackendKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Clean the stages, then OCR every given image or PDF
    Process {
        /// Files to process; unsupported types are skipped
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Extract clinical fields from text and save them as CSV
    Structure(StructureArgs),

    /// Extract fields from every confirmed OCR document
    Batch,

    /// Delete the files in every workflow stage
    Cleanup,

    /// Store a corrected OCR document (JSON) in the confirmed stage
    SaveCorrections {
        /// JSON file with filename, page, text, word_objects, mean_confidence
        file: PathBuf,
    },

    /// Print the effective configuration (credentials omitted)
    Config,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct StructureArgs {
    /// Text to analyze
    #[arg(long)]
    text: Option<String>,

    /// Read the text from a file
    #[arg(long)]
    file: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::from_env().context("invalid configuration")?;
    if let Some(dir) = cli.workflow_dir {
        config.workflow_dir = dir;
    }
    if let Some(backend) = cli.backend {
        config.ocr.backend = backend;
    }

    tracing::debug!("{} v{}", config::APP_NAME, config::APP_VERSION);
    let layout = StageLayout::new(&config.workflow_dir);

    match cli.command {
        Command::Process { files } => {
            let processor = DocumentProcessor::from_config(&config, layout)?;
            let report = processor.process_batch(&files)?;
            print_json(&report)
        }
        Command::Structure(args) => {
            let text = match (args.text, args.file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                (None, None) => bail!("either --text or --file is required"),
            };
            let service = extraction_service(&config, layout)?;
            print_json(&service.extract_and_save(&text)?)
        }
        Command::Batch => {
            let service = extraction_service(&config, layout)?;
            let run = BatchAggregator::new(&service).run()?;
            print_json(&run.result)
        }
        Command::Cleanup => {
            let removed = layout.cleanup();
            print_json(&serde_json::json!({ "success": true, "removed": removed }))
        }
        Command::SaveCorrections { file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("cannot read {}", file.display()))?;
            let correction: OcrCorrection =
                serde_json::from_str(&raw).context("malformed correction document")?;
            let path = save_corrections(&layout, &correction)?;
            print_json(&serde_json::json!({ "success": true, "path": path }))
        }
        Command::Config => print_json(&config),
    }
}

fn extraction_service(config: &AppConfig, layout: StageLayout) -> anyhow::Result<ExtractionService> {
    let client = OllamaClient::new(&config.llm, &config.retry)?;
    Ok(ExtractionService::new(
        Box::new(client),
        config.extraction_variables.clone(),
        layout,
    ))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
