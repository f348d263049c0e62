//! Backend abstraction for gesture recognition.
//!
//! The HTTP layer depends on the [`Recognizer`] trait instead of a concrete
//! implementation, which keeps request handling decoupled from the
//! recognition code.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::config::{AppConfig, RecognizerKind};
use crate::error::AppError;
use crate::video::{SampledFrame, VideoInfo};

pub mod crop_stub;

/// Input payload consumed by a recognition backend.
#[derive(Debug, Clone)]
pub struct RecognizeRequest {
    /// Container-level facts about the uploaded video.
    pub info: VideoInfo,
    /// Sampled frame features in track order.
    pub frames: Vec<SampledFrame>,
}

/// Per-frame classification outcome, serialized into result documents.
#[derive(Debug, Clone, Serialize)]
pub struct FrameObservation {
    /// Zero-based frame index within the track.
    pub frame_index: u64,
    /// Classified fingerspelling letter.
    pub letter: char,
    /// Classifier confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    /// Whether a hand was located in the frame.
    pub hand_detected: bool,
}

/// Full recognition result for one video.
#[derive(Debug, Clone)]
pub struct RecognitionResult {
    /// Recognized fingerspelling sequence.
    pub sequence: String,
    /// Per-frame observations backing the sequence.
    pub observations: Vec<FrameObservation>,
}

impl RecognitionResult {
    /// Mean per-frame confidence, zero when no frames were observed.
    pub fn mean_confidence(&self) -> f32 {
        if self.observations.is_empty() {
            return 0.0;
        }
        self.observations.iter().map(|o| o.confidence).sum::<f32>()
            / self.observations.len() as f32
    }
}

/// Backend contract implemented by gesture-recognition engines.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Runs recognition over sampled frames and returns a letter sequence.
    async fn recognize(&self, req: RecognizeRequest) -> Result<RecognitionResult, AppError>;
}

/// Builds the configured recognition backend.
pub fn build_recognizer(cfg: &AppConfig) -> Result<Arc<dyn Recognizer>, AppError> {
    match cfg.recognizer_kind {
        RecognizerKind::CropStub => Ok(Arc::new(crop_stub::CropStubRecognizer::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_confidence_averages_observations() {
        let result = RecognitionResult {
            sequence: "HI".to_string(),
            observations: vec![
                FrameObservation {
                    frame_index: 0,
                    letter: 'H',
                    confidence: 0.8,
                    hand_detected: true,
                },
                FrameObservation {
                    frame_index: 5,
                    letter: 'I',
                    confidence: 0.9,
                    hand_detected: true,
                },
            ],
        };
        assert!((result.mean_confidence() - 0.85).abs() < 1e-6);
    }

    #[test]
    fn mean_confidence_of_empty_result_is_zero() {
        let result = RecognitionResult {
            sequence: String::new(),
            observations: Vec::new(),
        };
        assert_eq!(result.mean_confidence(), 0.0);
    }
}
