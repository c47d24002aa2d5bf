//! Import coordinator
//!
//! Drives normalize -> enhance -> binarize -> recognize -> parse for one
//! source and decides what the caller gets back. Every request is stamped
//! with a sequence number; a request that finishes after a newer one was
//! issued is reported as superseded and its result dropped.

use crate::config::PipelineConfig;
use crate::error::ImportError;
use crate::ocr::OcrEngine;
use crate::parser::parse_list;
use crate::preprocess::{enhance, normalize};
use crate::progress::{ProgressSink, ProgressUpdate, Stage};
use crate::recognize::Orchestrator;
use crate::threshold::binarize;
use crate::types::{CaptureSession, RawImage, Rotation};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Items recognized by a completed import
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportReport {
    pub sequence: u64,
    /// Item names in the order they appeared
    pub items: Vec<String>,
    /// Index of the winning recognition variant
    pub variant: usize,
    pub confidence: f32,
    pub score: f32,
}

/// What happened to an import request
#[derive(Debug, Clone, PartialEq)]
pub enum ImportOutcome {
    Completed(ImportReport),
    /// A newer request was issued before this one finished
    Superseded { sequence: u64 },
}

/// Runs imports against one OCR engine, latest request wins
pub struct ImportCoordinator {
    engine: Arc<dyn OcrEngine>,
    config: PipelineConfig,
    latest: AtomicU64,
}

impl ImportCoordinator {
    pub fn new(engine: Arc<dyn OcrEngine>, config: PipelineConfig) -> Self {
        Self {
            engine,
            config,
            latest: AtomicU64::new(0),
        }
    }

    /// Stamp a new request; earlier requests stop being current
    pub fn issue(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, sequence: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == sequence
    }

    /// Import a decoded file or bitmap
    pub async fn import_image(
        &self,
        source: &RawImage,
        rotation: Rotation,
        progress: &dyn ProgressSink,
    ) -> Result<ImportOutcome, ImportError> {
        let sequence = self.issue();
        debug!("import {} started", sequence);

        let result = self.run(sequence, source, rotation, progress).await;
        if !self.is_current(sequence) {
            debug!("import {} superseded, dropping its result", sequence);
            return Ok(ImportOutcome::Superseded { sequence });
        }

        let report = result?;
        info!("import {} produced {} items", sequence, report.items.len());
        Ok(ImportOutcome::Completed(report))
    }

    /// Import a frame captured with the given camera session
    pub async fn import_frame(
        &self,
        session: &CaptureSession,
        frame: &RawImage,
        progress: &dyn ProgressSink,
    ) -> Result<ImportOutcome, ImportError> {
        self.import_image(frame, session.rotation, progress).await
    }

    async fn run(
        &self,
        sequence: u64,
        source: &RawImage,
        rotation: Rotation,
        progress: &dyn ProgressSink,
    ) -> Result<ImportReport, ImportError> {
        progress.report(ProgressUpdate::new(Stage::Preprocessing, 0));
        let normalized = normalize(source, rotation, &self.config.normalize)?;
        let enhanced = enhance(&normalized, &self.config.enhance)?;
        let binarized = binarize(&enhanced);
        progress.report(ProgressUpdate::new(Stage::Preprocessing, 100));

        let recognized = Orchestrator::new(self.engine.as_ref(), &self.config.recognition)
            .recognize(&enhanced, &binarized.image, progress)
            .await?;

        progress.report(ProgressUpdate::new(Stage::Parsing, 0));
        let items = parse_list(&recognized.text);
        progress.report(ProgressUpdate::new(Stage::Parsing, 100));
        if items.is_empty() {
            return Err(ImportError::NoUsableText);
        }

        progress.report(ProgressUpdate::new(Stage::Done, 100));
        Ok(ImportReport {
            sequence,
            items,
            variant: recognized.variant,
            confidence: recognized.confidence,
            score: recognized.score,
        })
    }
}
