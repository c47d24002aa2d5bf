//! Vision model used as an OCR engine

use crate::ollama::{ChatMessage, ChatRequest, OllamaClient};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use core_pipeline::ocr::EngineProgress;
use core_pipeline::{OcrEngine, OcrError, OcrOutput, PageSegMode, RecognitionConfig};
use tracing::debug;

/// Confidence reported for vision-model transcriptions (they carry none)
pub const DEFAULT_NOMINAL_CONFIDENCE: f32 = 60.0;

/// Vision model pulled by default
pub const DEFAULT_VISION_MODEL: &str = "qwen2.5vl:7b";

/// Vision model reading list photos through Ollama
pub struct VisionOcrEngine {
    client: OllamaClient,
    model_name: String,
    nominal_confidence: f32,
}

impl VisionOcrEngine {
    /// Create a new vision engine
    pub fn new(client: OllamaClient, model_name: String) -> Self {
        Self {
            client,
            model_name,
            nominal_confidence: DEFAULT_NOMINAL_CONFIDENCE,
        }
    }

    /// Override the confidence attached to every transcription
    pub fn with_nominal_confidence(mut self, confidence: f32) -> Self {
        self.nominal_confidence = confidence.clamp(0.0, 100.0);
        self
    }

    fn build_request(&self, png: &[u8], config: &RecognitionConfig) -> ChatRequest {
        let image_b64 = general_purpose::STANDARD.encode(png);

        let layout = if config.page_seg_mode == PageSegMode::SINGLE_COLUMN {
            "The text is a single column of entries of varying size."
        } else {
            "The text is a single uniform block."
        };
        let mut prompt = format!(
            "Transcribe the handwritten or printed list in this image.\n\
             Languages (Tesseract codes): {}.\n\
             {}\n\
             Return one entry per line exactly as written, with no commentary.",
            config.languages, layout
        );
        if let Some(whitelist) = &config.char_whitelist {
            prompt.push_str(&format!("\nUse only these characters: {whitelist}"));
        }

        ChatRequest {
            model: self.model_name.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt,
                images: Some(vec![image_b64]),
            }],
            stream: Some(false),
        }
    }
}

/// Remove Markdown code fences a model may wrap its answer in
fn strip_fences(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[async_trait]
impl OcrEngine for VisionOcrEngine {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn recognize(
        &self,
        png: &[u8],
        config: &RecognitionConfig,
        progress: EngineProgress<'_>,
    ) -> Result<OcrOutput, OcrError> {
        progress(0.0);
        let request = self.build_request(png, config);
        let response = self
            .client
            .chat(request)
            .await
            .map_err(|e| OcrError::Backend(format!("{e:#}")))?;
        progress(1.0);

        let text = strip_fences(&response.message.content);
        debug!("{} returned {} chars", self.model_name, text.len());
        Ok(OcrOutput {
            text,
            confidence: self.nominal_confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ollama::OllamaConfig;

    fn engine() -> VisionOcrEngine {
        let client = OllamaClient::new(OllamaConfig::default()).unwrap();
        VisionOcrEngine::new(client, DEFAULT_VISION_MODEL.to_string())
    }

    #[test]
    fn test_request_carries_image_and_layout() {
        let config = RecognitionConfig::with_mode(PageSegMode::SINGLE_COLUMN);
        let request = engine().build_request(b"png-bytes", &config);

        assert_eq!(request.model, "qwen2.5vl:7b");
        let message = &request.messages[0];
        assert!(message.content.contains("single column"));
        assert!(message.content.contains("spa+eng"));
        let images = message.images.as_ref().unwrap();
        assert_eq!(images[0], general_purpose::STANDARD.encode(b"png-bytes"));
    }

    #[test]
    fn test_request_mentions_whitelist() {
        let config = RecognitionConfig {
            char_whitelist: Some("ABC".to_string()),
            ..RecognitionConfig::default()
        };
        let request = engine().build_request(b"x", &config);
        assert!(request.messages[0].content.contains("only these characters: ABC"));
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```\nLeche\nPan\n```"), "Leche\nPan");
        assert_eq!(strip_fences("  Leche  "), "Leche");
    }

    #[test]
    fn test_nominal_confidence_is_clamped() {
        let engine = engine().with_nominal_confidence(150.0);
        assert_eq!(engine.nominal_confidence, 100.0);
        assert_eq!(engine.name(), "ollama");
    }
}
