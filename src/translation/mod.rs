//! Backend abstraction for letters-to-English translation.
//!
//! Translation is a direct call into a pretrained encoder-decoder language
//! model; the trait exists so the HTTP layer and tests never depend on the
//! concrete runtime.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AppConfig, TranslatorKind};
use crate::error::AppError;

pub mod t5_onnx;

/// Number of alternative decodes returned alongside a translation.
pub const SUGGESTION_COUNT: usize = 3;

/// One finished translation.
#[derive(Debug, Clone)]
pub struct Translation {
    /// Final post-processed English sentence.
    pub text: String,
    /// Heuristic confidence in `[0.0, 1.0]`.
    pub confidence: f32,
    /// The normalized letter sequence actually fed to the model.
    pub prepared_input: String,
}

/// Backend contract implemented by translation engines.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translates one fingerspelled sequence into an English sentence.
    async fn translate(&self, letters: &str) -> Result<Translation, AppError>;

    /// Produces up to `count` alternative decodes for the same sequence.
    ///
    /// Returns an empty list when the sequence normalizes to nothing.
    async fn suggestions(&self, letters: &str, count: usize) -> Result<Vec<String>, AppError>;
}

/// Builds the configured translation backend.
pub fn build_translator(cfg: &AppConfig) -> Result<Arc<dyn Translator>, AppError> {
    match cfg.translator_kind {
        TranslatorKind::T5Onnx => Ok(Arc::new(t5_onnx::T5OnnxTranslator::new(cfg)?)),
    }
}
