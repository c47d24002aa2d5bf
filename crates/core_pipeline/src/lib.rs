//! Core pipeline for snaplist
//!
//! Turns a photo of a hand-written or printed list into task names:
//! normalize the image, boost contrast, binarize with Otsu's method, run OCR
//! over several variants, keep the best transcription and split it into
//! deduplicated items.

pub mod config;
pub mod error;
pub mod import;
pub mod ocr;
pub mod parser;
pub mod preprocess;
pub mod progress;
pub mod recognize;
pub mod threshold;
pub mod types;

pub use config::{EnhanceConfig, NormalizeConfig, PipelineConfig};
pub use error::{ImportError, OcrError};
pub use import::{ImportCoordinator, ImportOutcome, ImportReport};
pub use ocr::{OcrEngine, OcrOutput, PageSegMode, RecognitionConfig, TesseractEngine};
pub use parser::parse_list;
pub use progress::{NoProgress, ProgressSink, ProgressUpdate, Stage};
pub use recognize::{Orchestrator, RecognitionPolicy, RecognitionResult};
pub use types::*;
