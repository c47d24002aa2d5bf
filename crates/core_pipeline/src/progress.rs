//! Progress reporting
//!
//! Sinks are fire-and-forget: the pipeline never waits on them.

use serde::Serialize;
use std::fmt;

/// Pipeline stage a progress update refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Preprocessing,
    /// Recognition of variant `variant` (1-based) out of `of`
    Recognizing { variant: usize, of: usize },
    Parsing,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Preprocessing => write!(f, "preprocessing"),
            Stage::Recognizing { variant, of } => write!(f, "reading text ({variant}/{of})"),
            Stage::Parsing => write!(f, "parsing"),
            Stage::Done => write!(f, "done"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    #[serde(flatten)]
    pub stage: Stage,
    /// 0..=100 within the stage
    pub percent: u8,
}

impl ProgressUpdate {
    pub fn new(stage: Stage, percent: u8) -> Self {
        Self {
            stage,
            percent: percent.min(100),
        }
    }

    /// Convert an engine's 0.0..=1.0 progress fraction
    pub fn from_fraction(stage: Stage, fraction: f32) -> Self {
        Self::new(stage, (fraction.clamp(0.0, 1.0) * 100.0).round() as u8)
    }
}

/// Receiver of progress updates
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update)
    }
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _update: ProgressUpdate) {}
}
