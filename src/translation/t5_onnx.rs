//! T5 encoder-decoder backend running on ONNX Runtime.
//!
//! This backend keeps a pool of session pairs in memory and runs the
//! autoregressive decode loop on blocking worker threads. Decoding is a
//! greedy loop with bigram no-repeat masking; suggestions use temperature
//! sampling over the same masked logits.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::{Array2, ArrayD, IxDyn};
use ort::execution_providers::CPU as CPUExecutionProvider;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use rand::Rng;
use tokenizers::Tokenizer;
use tokio::task;
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;
use crate::sequence;
use crate::translation::{Translation, Translator};

/// Sampling temperature used for alternative decodes.
const SAMPLING_TEMPERATURE: f32 = 0.8;

/// Token-selection strategy for one decode.
#[derive(Debug, Clone, Copy)]
enum DecodeStrategy {
    Greedy,
    Sample { temperature: f32 },
}

/// Encoder and decoder sessions used together for one generation.
struct T5Context {
    encoder: Session,
    decoder: Session,
}

/// Translation backend powered by an ONNX export of T5.
pub struct T5OnnxTranslator {
    contexts: Vec<Arc<Mutex<T5Context>>>,
    next_context_idx: AtomicUsize,
    tokenizer: Arc<Tokenizer>,
    max_new_tokens: usize,
    decoder_start_id: u32,
    eos_id: u32,
}

impl T5OnnxTranslator {
    /// Loads the tokenizer and prepares reusable session pairs.
    pub fn new(cfg: &AppConfig) -> Result<Self, AppError> {
        let encoder_path = cfg.t5_encoder_path();
        let decoder_path = cfg.t5_decoder_path();
        let tokenizer_path = cfg.t5_tokenizer_path();

        for path in [&encoder_path, &decoder_path, &tokenizer_path] {
            if !path.is_file() {
                return Err(AppError::backend(format!(
                    "model file not found at {:?}; enable ASL_T5_AUTO_DOWNLOAD or point ASL_T5_CACHE_DIR at an existing export",
                    path
                )));
            }
        }

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|err| {
            AppError::backend(format!(
                "failed to load tokenizer from {:?}: {err}",
                tokenizer_path
            ))
        })?;
        let decoder_start_id = tokenizer.token_to_id("<pad>").unwrap_or(0);
        let eos_id = tokenizer.token_to_id("</s>").unwrap_or(1);

        let mut contexts = Vec::with_capacity(cfg.t5_parallelism);
        for worker_idx in 0..cfg.t5_parallelism {
            let encoder = build_session(&encoder_path).map_err(|err| {
                AppError::backend(format!("worker {}: {err}", worker_idx + 1))
            })?;
            let decoder = build_session(&decoder_path).map_err(|err| {
                AppError::backend(format!("worker {}: {err}", worker_idx + 1))
            })?;
            contexts.push(Arc::new(Mutex::new(T5Context { encoder, decoder })));
        }

        info!(
            vocab_size = tokenizer.get_vocab_size(true),
            parallelism = cfg.t5_parallelism,
            max_new_tokens = cfg.t5_max_new_tokens,
            "initialized t5-onnx translation backend"
        );

        Ok(Self {
            contexts,
            next_context_idx: AtomicUsize::new(0),
            tokenizer: Arc::new(tokenizer),
            max_new_tokens: cfg.t5_max_new_tokens,
            decoder_start_id,
            eos_id,
        })
    }

    fn next_context(&self) -> Arc<Mutex<T5Context>> {
        let idx = self.next_context_idx.fetch_add(1, Ordering::Relaxed) % self.contexts.len();
        Arc::clone(&self.contexts[idx])
    }
}

#[async_trait]
impl Translator for T5OnnxTranslator {
    async fn translate(&self, letters: &str) -> Result<Translation, AppError> {
        let prepared = sequence::prepare_letters(letters);
        if prepared.is_empty() {
            return Err(AppError::invalid_request(
                "ASL sequence is empty after normalization",
                Some("asl_text"),
                Some("empty_sequence"),
            ));
        }

        let prompt = sequence::translation_prompt(&prepared);
        let context = self.next_context();
        let tokenizer = Arc::clone(&self.tokenizer);
        let max_new_tokens = self.max_new_tokens;
        let decoder_start_id = self.decoder_start_id;
        let eos_id = self.eos_id;

        let raw = task::spawn_blocking(move || {
            run_generation(
                &context,
                &tokenizer,
                &prompt,
                max_new_tokens,
                decoder_start_id,
                eos_id,
                DecodeStrategy::Greedy,
            )
        })
        .await
        .map_err(|err| AppError::backend(format!("translation worker task failed: {err}")))??;

        Ok(Translation {
            text: sequence::finish_sentence(&raw),
            confidence: sequence::confidence_for(&prepared),
            prepared_input: prepared,
        })
    }

    async fn suggestions(&self, letters: &str, count: usize) -> Result<Vec<String>, AppError> {
        let prepared = sequence::prepare_letters(letters);
        if prepared.is_empty() || count == 0 {
            return Ok(Vec::new());
        }

        let prompt = sequence::translation_prompt(&prepared);
        let context = self.next_context();
        let tokenizer = Arc::clone(&self.tokenizer);
        let max_new_tokens = self.max_new_tokens;
        let decoder_start_id = self.decoder_start_id;
        let eos_id = self.eos_id;

        task::spawn_blocking(move || {
            let mut suggestions = Vec::with_capacity(count);
            for _ in 0..count {
                let raw = run_generation(
                    &context,
                    &tokenizer,
                    &prompt,
                    max_new_tokens,
                    decoder_start_id,
                    eos_id,
                    DecodeStrategy::Sample {
                        temperature: SAMPLING_TEMPERATURE,
                    },
                )?;
                suggestions.push(sequence::finish_sentence(&raw));
            }
            Ok(suggestions)
        })
        .await
        .map_err(|err| AppError::backend(format!("translation worker task failed: {err}")))?
    }
}

fn build_session(path: &Path) -> Result<Session, AppError> {
    Session::builder()
        .map_err(|err| AppError::backend(format!("failed to create session builder: {err}")))?
        .with_execution_providers([CPUExecutionProvider::default().build()])
        .map_err(|err| AppError::backend(format!("failed to set execution provider: {err}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|err| AppError::backend(format!("failed to set optimization level: {err}")))?
        .with_intra_threads(4)
        .map_err(|err| AppError::backend(format!("failed to set intra threads: {err}")))?
        .commit_from_file(path)
        .map_err(|err| AppError::backend(format!("failed to load model at {:?}: {err}", path)))
}

/// Runs one encode plus an autoregressive decode and returns the raw text.
fn run_generation(
    context: &Arc<Mutex<T5Context>>,
    tokenizer: &Tokenizer,
    prompt: &str,
    max_new_tokens: usize,
    decoder_start_id: u32,
    eos_id: u32,
    strategy: DecodeStrategy,
) -> Result<String, AppError> {
    let mut guard = context
        .lock()
        .map_err(|_| AppError::backend("failed to lock translation context"))?;
    let ctx = &mut *guard;

    let encoding = tokenizer
        .encode(prompt, true)
        .map_err(|err| AppError::backend(format!("failed to tokenize prompt: {err}")))?;
    let input_ids: Vec<i64> = encoding.get_ids().iter().map(|&id| id as i64).collect();
    let src_len = input_ids.len();
    if src_len == 0 {
        return Err(AppError::backend("tokenizer produced an empty encoding"));
    }

    let input_array = Array2::<i64>::from_shape_vec((1, src_len), input_ids)
        .map_err(|err| AppError::backend(format!("failed to shape input ids: {err}")))?;
    let attention_mask = Array2::<i64>::ones((1, src_len));

    let input_value = Value::from_array(input_array)
        .map_err(|err| AppError::backend(format!("failed to create input tensor: {err}")))?;
    let mask_value = Value::from_array(attention_mask.clone())
        .map_err(|err| AppError::backend(format!("failed to create mask tensor: {err}")))?;

    let encoder_hidden: ArrayD<f32> = {
        let outputs = ctx
            .encoder
            .run(ort::inputs![
                "input_ids" => input_value,
                "attention_mask" => mask_value
            ])
            .map_err(|err| AppError::backend(format!("encoder inference failed: {err}")))?;
        outputs[0]
            .try_extract_array::<f32>()
            .map_err(|err| AppError::backend(format!("failed to extract encoder output: {err}")))?
            .to_owned()
    };

    let mut generated: Vec<u32> = vec![decoder_start_id];
    let mut rng = rand::thread_rng();

    for _ in 0..max_new_tokens {
        let decoder_ids = Array2::<i64>::from_shape_vec(
            (1, generated.len()),
            generated.iter().map(|&t| t as i64).collect(),
        )
        .map_err(|err| AppError::backend(format!("failed to shape decoder ids: {err}")))?;

        let decoder_ids_value = Value::from_array(decoder_ids)
            .map_err(|err| AppError::backend(format!("failed to create decoder tensor: {err}")))?;
        let hidden_value = Value::from_array(encoder_hidden.clone())
            .map_err(|err| AppError::backend(format!("failed to create hidden tensor: {err}")))?;
        let mask_value = Value::from_array(attention_mask.clone())
            .map_err(|err| AppError::backend(format!("failed to create mask tensor: {err}")))?;

        let mut last_logits = {
            let outputs = ctx
                .decoder
                .run(ort::inputs![
                    "input_ids" => decoder_ids_value,
                    "encoder_attention_mask" => mask_value,
                    "encoder_hidden_states" => hidden_value
                ])
                .map_err(|err| AppError::backend(format!("decoder inference failed: {err}")))?;
            let logits = outputs[0].try_extract_array::<f32>().map_err(|err| {
                AppError::backend(format!("failed to extract decoder logits: {err}"))
            })?;

            let shape = logits.shape().to_vec();
            let vocab_size = *shape
                .last()
                .ok_or_else(|| AppError::backend("decoder produced scalar logits"))?;
            let last_pos = generated.len() - 1;
            let mut row = vec![0.0f32; vocab_size];
            for (v, slot) in row.iter_mut().enumerate() {
                *slot = logits[IxDyn(&[0, last_pos, v])];
            }
            row
        };

        for banned in banned_bigram_tokens(&generated) {
            if let Some(slot) = last_logits.get_mut(banned as usize) {
                *slot = f32::NEG_INFINITY;
            }
        }

        let next = match strategy {
            DecodeStrategy::Greedy => argmax(&last_logits) as u32,
            DecodeStrategy::Sample { temperature } => {
                softmax_sample(&last_logits, temperature, rng.gen::<f32>()) as u32
            }
        };

        if next == eos_id {
            break;
        }
        generated.push(next);
    }

    tokenizer
        .decode(&generated[1..], true)
        .map_err(|err| AppError::backend(format!("failed to decode generated tokens: {err}")))
}

/// Tokens that would repeat an already-seen bigram after the last token.
fn banned_bigram_tokens(generated: &[u32]) -> Vec<u32> {
    let Some(&last) = generated.last() else {
        return Vec::new();
    };
    let mut banned = Vec::new();
    for window in generated.windows(2) {
        if window[0] == last {
            banned.push(window[1]);
        }
    }
    banned
}

fn argmax(logits: &[f32]) -> usize {
    logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Samples an index from `softmax(logits / temperature)` given a uniform
/// draw `r` in `[0, 1)`.
fn softmax_sample(logits: &[f32], temperature: f32, r: f32) -> usize {
    let temperature = temperature.max(f32::EPSILON);
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return 0;
    }

    let weights: Vec<f32> = logits
        .iter()
        .map(|&l| ((l - max) / temperature).exp())
        .collect();
    let total: f32 = weights.iter().sum();
    let target = r * total;

    let mut acc = 0.0;
    for (idx, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        acc += weight;
        if acc >= target {
            return idx;
        }
    }
    argmax(logits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    fn missing_model_cfg() -> AppConfig {
        let mut cfg = test_base_cfg();
        cfg.t5_cache_dir = "/nonexistent/asl-models".to_string();
        cfg
    }

    fn test_base_cfg() -> AppConfig {
        use crate::config::{RecognizerKind, TranslatorKind};
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
            api_key: None,
            upload_dir: "uploads".to_string(),
            max_upload_bytes: 1024,
            frame_sample_rate: 5,
            t5_auto_download: false,
            t5_hf_repo: "Xenova/t5-base".to_string(),
            t5_encoder_filename: "onnx/encoder_model.onnx".to_string(),
            t5_decoder_filename: "onnx/decoder_model.onnx".to_string(),
            t5_tokenizer_filename: "tokenizer.json".to_string(),
            t5_cache_dir: "/tmp".to_string(),
            hf_token: None,
            t5_max_new_tokens: 128,
            t5_parallelism: 1,
            recognizer_kind: RecognizerKind::CropStub,
            translator_kind: TranslatorKind::T5Onnx,
        }
    }

    #[test]
    fn new_reports_missing_model_files() {
        let err = T5OnnxTranslator::new(&missing_model_cfg()).expect_err("must fail");
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn bigram_mask_bans_seen_successors() {
        // After ...2, token 3 is banned because the bigram (2, 3) was seen.
        assert_eq!(banned_bigram_tokens(&[1, 2, 3, 2]), vec![3]);
        assert!(banned_bigram_tokens(&[1, 2, 3]).is_empty());
        assert!(banned_bigram_tokens(&[]).is_empty());
    }

    #[test]
    fn argmax_picks_highest_logit() {
        assert_eq!(argmax(&[0.1, 0.5, 0.3, 0.9, 0.2]), 3);
        assert_eq!(argmax(&[-0.5, -0.1, -0.3]), 1);
    }

    #[test]
    fn softmax_sample_walks_cumulative_weights() {
        let logits = [0.0, 0.0];
        assert_eq!(softmax_sample(&logits, 1.0, 0.4), 0);
        assert_eq!(softmax_sample(&logits, 1.0, 0.9), 1);
    }

    #[test]
    fn softmax_sample_skips_masked_tokens() {
        let logits = [f32::NEG_INFINITY, 0.0];
        assert_eq!(softmax_sample(&logits, 1.0, 0.0), 1);
        assert_eq!(softmax_sample(&logits, 1.0, 0.99), 1);
    }

    #[test]
    fn softmax_sample_of_fully_masked_logits_is_stable() {
        let logits = [f32::NEG_INFINITY, f32::NEG_INFINITY];
        assert_eq!(softmax_sample(&logits, 1.0, 0.5), 0);
    }
}
