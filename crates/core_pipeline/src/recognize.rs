//! Recognition orchestrator
//!
//! Runs the OCR engine over a fixed, ordered list of image/configuration
//! variants, scores each transcription and keeps the best one. Calls are made
//! one at a time; progress for a call is reported before the next one starts.

use crate::error::{ImportError, OcrError};
use crate::ocr::{encode_png, OcrEngine, OcrOutput, PageSegMode, RecognitionConfig};
use crate::parser::parse_list;
use crate::progress::{ProgressSink, ProgressUpdate, Stage};
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Which preprocessed buffer a variant feeds to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariantSource {
    Binarized,
    Enhanced,
}

/// One image/configuration combination to try
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    pub source: VariantSource,
    pub config: RecognitionConfig,
}

impl Variant {
    pub fn new(source: VariantSource, page_seg_mode: PageSegMode) -> Self {
        Self {
            source,
            config: RecognitionConfig::with_mode(page_seg_mode),
        }
    }
}

/// Weights of `items * item_weight + confidence / confidence_divisor + min(length_cap, chars / length_divisor)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub item_weight: f32,
    pub confidence_divisor: f32,
    pub length_divisor: f32,
    pub length_cap: f32,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            item_weight: 2.0,
            confidence_divisor: 10.0,
            length_divisor: 10.0,
            length_cap: 30.0,
        }
    }
}

/// A candidate good enough to stop trying further variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyExit {
    /// At least this many parsed items
    pub min_items: usize,
    /// Confidence strictly above this
    pub min_confidence: f32,
}

impl Default for EarlyExit {
    fn default() -> Self {
        Self {
            min_items: 5,
            min_confidence: 70.0,
        }
    }
}

impl EarlyExit {
    pub fn is_met(&self, item_count: usize, confidence: f32) -> bool {
        item_count >= self.min_items && confidence > self.min_confidence
    }
}

/// Ordered variants plus the rules for picking a winner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionPolicy {
    pub variants: Vec<Variant>,
    pub scoring: ScoringWeights,
    pub early_exit: EarlyExit,
}

impl Default for RecognitionPolicy {
    fn default() -> Self {
        Self {
            variants: vec![
                Variant::new(VariantSource::Binarized, PageSegMode::SINGLE_BLOCK),
                Variant::new(VariantSource::Enhanced, PageSegMode::SINGLE_BLOCK),
                Variant::new(VariantSource::Binarized, PageSegMode::SINGLE_COLUMN),
                Variant::new(VariantSource::Enhanced, PageSegMode::SINGLE_COLUMN),
            ],
            scoring: ScoringWeights::default(),
            early_exit: EarlyExit::default(),
        }
    }
}

/// The transcription selected by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognitionResult {
    pub text: String,
    pub confidence: f32,
    pub item_count: usize,
    pub score: f32,
    /// Index into the policy's variant list
    pub variant: usize,
}

/// Heuristic quality of one transcription
pub fn score(output: &OcrOutput, item_count: usize, weights: &ScoringWeights) -> f32 {
    let length = output.text.chars().count() as f32;
    item_count as f32 * weights.item_weight
        + output.confidence / weights.confidence_divisor
        + (length / weights.length_divisor).min(weights.length_cap)
}

/// Runs an engine across the policy's variants
pub struct Orchestrator<'a> {
    engine: &'a dyn OcrEngine,
    policy: &'a RecognitionPolicy,
}

impl<'a> Orchestrator<'a> {
    pub fn new(engine: &'a dyn OcrEngine, policy: &'a RecognitionPolicy) -> Self {
        Self { engine, policy }
    }

    /// Recognize the best transcription from two buffers of the same frame
    ///
    /// Individual variant failures are logged and skipped. Only when every
    /// variant fails is `RecognitionUnavailable` returned, carrying the last
    /// engine error.
    pub async fn recognize(
        &self,
        enhanced: &GrayImage,
        binarized: &GrayImage,
        progress: &dyn ProgressSink,
    ) -> Result<RecognitionResult, ImportError> {
        let enhanced_png = encode_png(enhanced).map_err(ImportError::Encode)?;
        let binarized_png = encode_png(binarized).map_err(ImportError::Encode)?;

        let total = self.policy.variants.len();
        let mut best: Option<RecognitionResult> = None;
        let mut last_error = OcrError::NoVariants;

        for (index, variant) in self.policy.variants.iter().enumerate() {
            let stage = Stage::Recognizing {
                variant: index + 1,
                of: total,
            };
            progress.report(ProgressUpdate::new(stage, 0));

            let png = match variant.source {
                VariantSource::Binarized => &binarized_png,
                VariantSource::Enhanced => &enhanced_png,
            };
            let report = |fraction: f32| progress.report(ProgressUpdate::from_fraction(stage, fraction));

            let output = match self.engine.recognize(png, &variant.config, &report).await {
                Ok(output) => output,
                Err(e) => {
                    warn!(
                        "{} variant {}/{} ({:?}, psm {}) failed: {}",
                        self.engine.name(),
                        index + 1,
                        total,
                        variant.source,
                        variant.config.page_seg_mode.0,
                        e
                    );
                    progress.report(ProgressUpdate::new(stage, 100));
                    last_error = e;
                    continue;
                }
            };
            progress.report(ProgressUpdate::new(stage, 100));

            let item_count = parse_list(&output.text).len();
            let candidate = RecognitionResult {
                score: score(&output, item_count, &self.policy.scoring),
                text: output.text,
                confidence: output.confidence,
                item_count,
                variant: index,
            };
            debug!(
                "variant {}/{}: {} items, confidence {:.1}, score {:.2}",
                index + 1,
                total,
                candidate.item_count,
                candidate.confidence,
                candidate.score
            );

            if self
                .policy
                .early_exit
                .is_met(candidate.item_count, candidate.confidence)
            {
                info!("variant {}/{} accepted early", index + 1, total);
                return Ok(candidate);
            }

            if best.as_ref().map_or(true, |b| candidate.score > b.score) {
                best = Some(candidate);
            }
        }

        match best {
            Some(result) => {
                info!(
                    "selected variant {}/{} with score {:.2}",
                    result.variant + 1,
                    total,
                    result.score
                );
                Ok(result)
            }
            None => Err(ImportError::RecognitionUnavailable(last_error)),
        }
    }
}
