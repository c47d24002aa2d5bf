//! snaplist CLI
//!
//! Command-line interface for turning photos of lists into tasks:
//! Capture -> Preprocess & Recognize -> Import

mod store;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use core_pipeline::preprocess::{enhance, normalize};
use core_pipeline::threshold::binarize;
use core_pipeline::{
    parse_list, ImportCoordinator, ImportOutcome, OcrEngine, PipelineConfig, ProgressUpdate,
    RawImage, Rotation, TesseractEngine,
};
use llm_bridge::{
    OllamaClient, OllamaConfig, VisionOcrEngine, DEFAULT_NOMINAL_CONFIDENCE, DEFAULT_VISION_MODEL,
};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use store::TaskStore;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (commit ",
    env!("BUILT_GIT_COMMIT_HASH"),
    ", built ",
    env!("BUILT_TIME_UTC"),
    " on ",
    env!("BUILT_HOST"),
    ")"
);

#[derive(Parser)]
#[command(name = "snaplist")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Turn a photo of a list into tasks: Capture -> Recognize -> Import", long_about = None)]
struct Cli {
    /// JSON file overriding pipeline defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum EngineKind {
    /// Local Tesseract via leptess
    Tesseract,
    /// Vision model served by Ollama
    Ollama,
}

#[derive(Subcommand)]
enum Commands {
    /// Recognize a photo and add its items to the task list
    Import {
        /// Image file, or raw RGBA frame dump when --frame is given
        #[arg(short, long)]
        input: PathBuf,

        /// Treat the input as a raw RGBA frame of WIDTHxHEIGHT
        #[arg(long, value_parser = parse_frame_size)]
        frame: Option<(u32, u32)>,

        /// Clockwise rotation in degrees (multiple of 90)
        #[arg(short, long, default_value = "0", allow_negative_numbers = true, value_parser = parse_rotation)]
        rotate: Rotation,

        /// Task list file
        #[arg(short, long, default_value = "tasks.json")]
        store: PathBuf,

        /// OCR engine
        #[arg(short, long, value_enum, default_value_t = EngineKind::Tesseract)]
        engine: EngineKind,

        /// Vision model name for the ollama engine
        #[arg(long, default_value = DEFAULT_VISION_MODEL)]
        model: String,

        /// Confidence (0-100) attached to vision model transcriptions
        #[arg(long, default_value_t = DEFAULT_NOMINAL_CONFIDENCE)]
        nominal_confidence: f32,

        /// Directory containing tessdata
        #[arg(long)]
        tessdata: Option<String>,

        /// Print the items without touching the task list
        #[arg(long)]
        dry_run: bool,
    },

    /// Split already recognized text into items
    Parse {
        /// Text file, or "-" for stdin
        #[arg(short, long, default_value = "-")]
        input: String,
    },

    /// Write the intermediate images the recognizer sees
    Preprocess {
        /// Image file
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Clockwise rotation in degrees (multiple of 90)
        #[arg(short, long, default_value = "0", allow_negative_numbers = true, value_parser = parse_rotation)]
        rotate: Rotation,
    },

    /// List tasks in the task file
    Tasks {
        /// Task list file
        #[arg(short, long, default_value = "tasks.json")]
        store: PathBuf,
    },
}

fn parse_rotation(value: &str) -> Result<Rotation, String> {
    let degrees: i32 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{value}' is not a number of degrees"))?;
    Rotation::from_degrees(degrees).ok_or_else(|| format!("{degrees} is not a multiple of 90"))
}

fn parse_frame_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("'{value}' is not WIDTHxHEIGHT"))?;
    let width = w.trim().parse().map_err(|_| format!("bad width '{w}'"))?;
    let height = h.trim().parse().map_err(|_| format!("bad height '{h}'"))?;
    Ok((width, height))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn build_engine(
    kind: EngineKind,
    model: String,
    nominal_confidence: f32,
    tessdata: Option<String>,
) -> Result<Arc<dyn OcrEngine>> {
    Ok(match kind {
        EngineKind::Tesseract => Arc::new(TesseractEngine::new(tessdata)),
        EngineKind::Ollama => {
            let client = OllamaClient::new(OllamaConfig::from_env())?;
            Arc::new(
                VisionOcrEngine::new(client, model).with_nominal_confidence(nominal_confidence),
            )
        }
    })
}

fn load_source(input: &Path, frame: Option<(u32, u32)>) -> Result<RawImage> {
    let source = match frame {
        Some((width, height)) => {
            let rgba = std::fs::read(input)
                .with_context(|| format!("Failed to read frame {}", input.display()))?;
            RawImage::from_frame(width, height, rgba)?
        }
        None => RawImage::from_path(input)?,
    };
    Ok(source)
}

fn report_progress(update: ProgressUpdate) {
    eprintln!("{} ({}%)", update.stage, update.percent);
}

async fn run_import(
    config: PipelineConfig,
    engine: Arc<dyn OcrEngine>,
    input: &Path,
    frame: Option<(u32, u32)>,
    rotate: Rotation,
    store_path: &Path,
    dry_run: bool,
) -> Result<()> {
    let coordinator = ImportCoordinator::new(engine, config);
    let source = load_source(input, frame)?;

    let outcome = match coordinator
        .import_image(&source, rotate, &report_progress)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            eprintln!("{}", e.user_message());
            return Err(e.into());
        }
    };

    let report = match outcome {
        ImportOutcome::Completed(report) => report,
        ImportOutcome::Superseded { sequence } => {
            tracing::warn!("import {} was superseded", sequence);
            return Ok(());
        }
    };

    if dry_run {
        for item in &report.items {
            println!("{}", item);
        }
        return Ok(());
    }

    let mut store = TaskStore::open(store_path)?;
    let added = store.import_items(&report.items);
    store.save()?;
    println!("Imported {} tasks into {}", added, store_path.display());
    Ok(())
}

fn run_parse(input: &str) -> Result<()> {
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read stdin")?;
        text
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };

    for item in parse_list(&text) {
        println!("{}", item);
    }
    Ok(())
}

fn run_preprocess(config: &PipelineConfig, input: &Path, output: &Path, rotate: Rotation) -> Result<()> {
    let source = RawImage::from_path(input)?;
    let normalized = normalize(&source, rotate, &config.normalize)?;
    let enhanced = enhance(&normalized, &config.enhance)?;
    let binarized = binarize(&enhanced);

    std::fs::create_dir_all(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    normalized.save(output.join("normalized.png"))?;
    enhanced.save(output.join("enhanced.png"))?;
    binarized.image.save(output.join("binarized.png"))?;

    println!(
        "{}x{} image, Otsu threshold {}, written to {}",
        normalized.width(),
        normalized.height(),
        binarized.threshold,
        output.display()
    );
    Ok(())
}

fn run_tasks(store_path: &Path) -> Result<()> {
    let store = TaskStore::open(store_path)?;
    if store.tasks().is_empty() {
        println!("No tasks");
        return Ok(());
    }
    for task in store.tasks() {
        let mark = if task.completed { "x" } else { " " };
        println!("[{}] {}", mark, task.name);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing; stdout carries command output
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Import {
            input,
            frame,
            rotate,
            store,
            engine,
            model,
            nominal_confidence,
            tessdata,
            dry_run,
        } => {
            let engine = build_engine(engine, model, nominal_confidence, tessdata)?;
            run_import(config, engine, &input, frame, rotate, &store, dry_run).await
        }
        Commands::Parse { input } => run_parse(&input),
        Commands::Preprocess {
            input,
            output,
            rotate,
        } => run_preprocess(&config, &input, &output, rotate),
        Commands::Tasks { store } => run_tasks(&store),
    }
}
