//! LLM Bridge for Ollama integration
//!
//! Provides a second OCR capability for snaplist: a local vision model
//! served by Ollama reads the list instead of Tesseract. It plugs into the
//! same `OcrEngine` seam, so the orchestrator treats both alike.

pub mod ollama;
pub mod vision;

pub use ollama::{OllamaClient, OllamaConfig};
pub use vision::{VisionOcrEngine, DEFAULT_NOMINAL_CONFIDENCE, DEFAULT_VISION_MODEL};
