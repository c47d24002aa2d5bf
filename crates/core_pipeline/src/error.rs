//! Error types for the import pipeline
//!
//! `ImportError` is what callers of the pipeline see. `OcrError` describes a
//! single failed engine call and only escapes the orchestrator when every
//! configured variant failed.

use thiserror::Error;

/// Failure of one OCR engine call
#[derive(Debug, Error)]
pub enum OcrError {
    /// The engine could not be initialized (missing language data, library, ...)
    #[error("OCR engine initialization failed: {0}")]
    Init(String),

    /// The engine rejected the image
    #[error("OCR engine could not load image: {0}")]
    Image(String),

    /// Recognition itself failed
    #[error("OCR recognition failed: {0}")]
    Recognition(String),

    /// A remote engine could not be reached or answered with an error
    #[error("OCR backend unavailable: {0}")]
    Backend(String),

    /// The recognition policy contained no variants to try
    #[error("no recognition variants configured")]
    NoVariants,
}

/// Terminal outcome of an import operation that produced no items
#[derive(Debug, Error)]
pub enum ImportError {
    /// The image or frame has no usable dimensions
    #[error("source not ready: image has no usable dimensions ({width}x{height})")]
    SourceUnavailable { width: u32, height: u32 },

    /// The file could not be decoded as an image
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    /// A processed buffer could not be encoded for the OCR engine
    #[error("could not encode image for recognition: {0}")]
    Encode(image::ImageError),

    /// Every recognition variant failed at the OCR layer
    #[error("could not read image")]
    RecognitionUnavailable(#[source] OcrError),

    /// Recognition succeeded but nothing usable was parsed from the text
    #[error("no usable text detected")]
    NoUsableText,
}

impl ImportError {
    /// Message suitable for showing to the person who took the picture
    pub fn user_message(&self) -> &'static str {
        match self {
            ImportError::SourceUnavailable { .. } => "Source not ready. Try again in a moment.",
            ImportError::Decode(_) | ImportError::Encode(_) | ImportError::RecognitionUnavailable(_) => {
                "Could not read the image."
            }
            ImportError::NoUsableText => {
                "No usable text detected. Move closer and use good light."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_recognition_unavailable_keeps_source() {
        let err = ImportError::RecognitionUnavailable(OcrError::Recognition("boom".into()));
        let source = err.source().expect("source should be kept");
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn test_user_messages_are_distinct() {
        let not_ready = ImportError::SourceUnavailable { width: 0, height: 0 };
        let empty = ImportError::NoUsableText;
        let failed = ImportError::RecognitionUnavailable(OcrError::NoVariants);
        assert_ne!(not_ready.user_message(), empty.user_message());
        assert_ne!(empty.user_message(), failed.user_message());
        assert!(empty.user_message().contains("Move closer"));
    }
}
