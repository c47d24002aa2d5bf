//! OCR module
//!
//! Defines the seam to an OCR capability (`OcrEngine`) and the local
//! Tesseract implementation (via leptess). Engines receive lossless PNG
//! bytes plus a `RecognitionConfig` and return text with a 0-100 confidence.

use crate::error::OcrError;
use async_trait::async_trait;
use image::{GrayImage, ImageError};
use leptess::{LepTess, Variable};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tracing::debug;

/// Tesseract page segmentation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageSegMode(pub u8);

impl PageSegMode {
    /// Single column of text of variable sizes
    pub const SINGLE_COLUMN: PageSegMode = PageSegMode(4);
    /// Single uniform block of text
    pub const SINGLE_BLOCK: PageSegMode = PageSegMode(6);
}

/// Per-call engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Tesseract language string, `+`-separated (default: "spa+eng")
    pub languages: String,
    pub page_seg_mode: PageSegMode,
    /// Restrict recognition to these characters
    pub char_whitelist: Option<String>,
    /// Resolution hint for the engine (default: 300)
    pub dpi: Option<u32>,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            languages: "spa+eng".to_string(),
            page_seg_mode: PageSegMode::SINGLE_BLOCK,
            char_whitelist: None,
            dpi: Some(300),
        }
    }
}

impl RecognitionConfig {
    pub fn with_mode(page_seg_mode: PageSegMode) -> Self {
        Self {
            page_seg_mode,
            ..Self::default()
        }
    }
}

/// Text and mean confidence returned by an engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    pub text: String,
    /// 0.0..=100.0
    pub confidence: f32,
}

/// Callback receiving an engine's progress as a 0.0..=1.0 fraction
pub type EngineProgress<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// An OCR capability
///
/// Calls for one import are made strictly one after another; implementations
/// need not support concurrent use from a single caller.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    /// Recognize text in a PNG-encoded image
    async fn recognize(
        &self,
        png: &[u8],
        config: &RecognitionConfig,
        progress: EngineProgress<'_>,
    ) -> Result<OcrOutput, OcrError>;
}

/// Encode a grayscale buffer as PNG for an engine
pub fn encode_png(image: &GrayImage) -> Result<Vec<u8>, ImageError> {
    let mut png_bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut png_bytes), image::ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Local Tesseract engine
#[derive(Debug, Clone, Default)]
pub struct TesseractEngine {
    /// Directory holding `tessdata`; `None` uses the system default
    data_path: Option<String>,
}

impl TesseractEngine {
    pub fn new(data_path: Option<String>) -> Self {
        Self { data_path }
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(
        &self,
        png: &[u8],
        config: &RecognitionConfig,
        progress: EngineProgress<'_>,
    ) -> Result<OcrOutput, OcrError> {
        progress(0.0);
        let data_path = self.data_path.clone();
        let png = png.to_vec();
        let config = config.clone();

        // leptess is blocking and its handle is not Send; build it on the blocking pool
        let output = tokio::task::spawn_blocking(move || {
            run_tesseract(data_path.as_deref(), &png, &config)
        })
        .await
        .map_err(|e| OcrError::Recognition(format!("tesseract task failed: {e}")))??;

        progress(1.0);
        Ok(output)
    }
}

fn run_tesseract(
    data_path: Option<&str>,
    png: &[u8],
    config: &RecognitionConfig,
) -> Result<OcrOutput, OcrError> {
    let mut tesseract = LepTess::new(data_path, &config.languages)
        .map_err(|e| OcrError::Init(format!("{e}. Is Tesseract installed?")))?;

    tesseract
        .set_variable(
            Variable::TesseditPagesegMode,
            &config.page_seg_mode.0.to_string(),
        )
        .map_err(|e| OcrError::Init(e.to_string()))?;
    if let Some(whitelist) = &config.char_whitelist {
        tesseract
            .set_variable(Variable::TesseditCharWhitelist, whitelist)
            .map_err(|e| OcrError::Init(e.to_string()))?;
    }

    tesseract
        .set_image_from_mem(png)
        .map_err(|e| OcrError::Image(e.to_string()))?;
    if let Some(dpi) = config.dpi {
        tesseract.set_source_resolution(dpi as i32);
    }

    let text = tesseract
        .get_utf8_text()
        .map_err(|e| OcrError::Recognition(e.to_string()))?;
    let confidence = tesseract.mean_text_conf().clamp(0, 100) as f32;

    debug!(
        "tesseract psm {} read {} chars at confidence {}",
        config.page_seg_mode.0,
        text.len(),
        confidence
    );
    Ok(OcrOutput { text, confidence })
}
