//! Configuration loading from environment variables.
//!
//! Values are intentionally validated early so startup fails fast with
//! actionable errors.

use std::env;
use std::path::{Path, PathBuf};

use crate::error::AppError;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_FRAME_SAMPLE_RATE: usize = 5;
pub const MAX_FRAME_SAMPLE_RATE: usize = 120;
pub const DEFAULT_T5_MAX_NEW_TOKENS: usize = 128;
pub const MAX_T5_MAX_NEW_TOKENS: usize = 512;
pub const DEFAULT_T5_PARALLELISM: usize = 1;
pub const MAX_T5_PARALLELISM: usize = 8;

/// Supported gesture-recognition implementations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum RecognizerKind {
    /// Center-window frame sampler emitting placeholder letters.
    CropStub,
}

impl RecognizerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CropStub => "crop-stub",
        }
    }
}

/// Supported letters-to-English translation implementations.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TranslatorKind {
    /// T5 encoder-decoder exported to ONNX, run via `ort`.
    T5Onnx,
}

impl TranslatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::T5Onnx => "t5-onnx",
        }
    }
}

/// Runtime configuration for the HTTP server, upload store, and both
/// inference pipelines.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host interface to bind, for example `127.0.0.1`.
    pub host: String,
    /// TCP port to bind.
    pub port: u16,
    /// Optional bearer token required by all endpoints.
    pub api_key: Option<String>,
    /// Directory holding uploaded videos and their result documents.
    pub upload_dir: String,
    /// Maximum accepted upload size in bytes.
    pub max_upload_bytes: u64,
    /// Every Nth demuxed video packet becomes a recognition observation.
    pub frame_sample_rate: usize,
    /// Enables startup download when T5 model files are missing.
    pub t5_auto_download: bool,
    /// Hugging Face repository holding the ONNX export of the T5 model.
    pub t5_hf_repo: String,
    /// Encoder model filename within the repository and cache directory.
    pub t5_encoder_filename: String,
    /// Decoder model filename within the repository and cache directory.
    pub t5_decoder_filename: String,
    /// Tokenizer filename within the repository and cache directory.
    pub t5_tokenizer_filename: String,
    /// Local cache directory for downloaded model files.
    pub t5_cache_dir: String,
    /// Optional Hugging Face token for authenticated model downloads.
    pub hf_token: Option<String>,
    /// Maximum number of tokens generated per translation.
    pub t5_max_new_tokens: usize,
    /// Number of parallel ONNX session pairs.
    pub t5_parallelism: usize,
    /// Selected recognition implementation.
    pub recognizer_kind: RecognizerKind,
    /// Selected translation implementation.
    pub translator_kind: TranslatorKind,
}

impl AppConfig {
    /// Builds configuration from environment variables.
    ///
    /// Variables:
    /// - `HOST` (default `127.0.0.1`)
    /// - `PORT` (default `8000`)
    /// - `API_KEY` (optional)
    /// - `ASL_UPLOAD_DIR` (default `uploads`)
    /// - `ASL_MAX_UPLOAD_BYTES` (default 100 MiB)
    /// - `ASL_FRAME_SAMPLE_RATE` (default `5`, min `1`, max `120`)
    /// - `ASL_T5_AUTO_DOWNLOAD` (default `true`)
    /// - `ASL_T5_HF_REPO` (default `Xenova/t5-base`)
    /// - `ASL_T5_ENCODER_FILENAME` (default `onnx/encoder_model.onnx`)
    /// - `ASL_T5_DECODER_FILENAME` (default `onnx/decoder_model.onnx`)
    /// - `ASL_T5_TOKENIZER_FILENAME` (default `tokenizer.json`)
    /// - `ASL_T5_CACHE_DIR` (default `$HOME/.cache/asl-translate/models`)
    /// - `HF_TOKEN` (optional Hugging Face token)
    /// - `ASL_T5_MAX_NEW_TOKENS` (default `128`, min `1`, max `512`)
    /// - `ASL_T5_PARALLELISM` (default `1`, min `1`, max `8`)
    /// - `ASL_RECOGNIZER` (only `crop-stub` is currently supported)
    /// - `ASL_TRANSLATOR` (only `t5-onnx` is currently supported)
    pub fn from_env() -> Result<Self, AppError> {
        let host = env_str("HOST", "127.0.0.1");
        let port = env_u16("PORT", 8000)?;
        let upload_dir = env_str("ASL_UPLOAD_DIR", "uploads");
        let max_upload_bytes = env_u64("ASL_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;
        let frame_sample_rate = env_usize_bounded(
            "ASL_FRAME_SAMPLE_RATE",
            DEFAULT_FRAME_SAMPLE_RATE,
            1,
            MAX_FRAME_SAMPLE_RATE,
        )?;
        let t5_auto_download = env_bool("ASL_T5_AUTO_DOWNLOAD", true)?;
        let t5_hf_repo = env_str("ASL_T5_HF_REPO", "Xenova/t5-base");
        let t5_encoder_filename = env_str("ASL_T5_ENCODER_FILENAME", "onnx/encoder_model.onnx");
        let t5_decoder_filename = env_str("ASL_T5_DECODER_FILENAME", "onnx/decoder_model.onnx");
        let t5_tokenizer_filename = env_str("ASL_T5_TOKENIZER_FILENAME", "tokenizer.json");
        let t5_cache_dir = env_str("ASL_T5_CACHE_DIR", &default_t5_cache_dir());
        let t5_max_new_tokens = env_usize_bounded(
            "ASL_T5_MAX_NEW_TOKENS",
            DEFAULT_T5_MAX_NEW_TOKENS,
            1,
            MAX_T5_MAX_NEW_TOKENS,
        )?;
        let t5_parallelism = env_usize_bounded(
            "ASL_T5_PARALLELISM",
            DEFAULT_T5_PARALLELISM,
            1,
            MAX_T5_PARALLELISM,
        )?;

        let recognizer_kind = match env_str("ASL_RECOGNIZER", "crop-stub").as_str() {
            "crop-stub" => RecognizerKind::CropStub,
            other => {
                return Err(AppError::internal(format!(
                    "invalid ASL_RECOGNIZER={other:?}; expected crop-stub"
                )));
            }
        };
        let translator_kind = match env_str("ASL_TRANSLATOR", "t5-onnx").as_str() {
            "t5-onnx" => TranslatorKind::T5Onnx,
            other => {
                return Err(AppError::internal(format!(
                    "invalid ASL_TRANSLATOR={other:?}; expected t5-onnx"
                )));
            }
        };

        Ok(Self {
            host,
            port,
            api_key: env_opt("API_KEY"),
            upload_dir,
            max_upload_bytes,
            frame_sample_rate,
            t5_auto_download,
            t5_hf_repo,
            t5_encoder_filename,
            t5_decoder_filename,
            t5_tokenizer_filename,
            t5_cache_dir,
            hf_token: env_opt("HF_TOKEN"),
            t5_max_new_tokens,
            t5_parallelism,
            recognizer_kind,
            translator_kind,
        })
    }

    /// Local path of the T5 encoder model file.
    pub fn t5_encoder_path(&self) -> PathBuf {
        Path::new(&self.t5_cache_dir).join(&self.t5_encoder_filename)
    }

    /// Local path of the T5 decoder model file.
    pub fn t5_decoder_path(&self) -> PathBuf {
        Path::new(&self.t5_cache_dir).join(&self.t5_decoder_filename)
    }

    /// Local path of the tokenizer file.
    pub fn t5_tokenizer_path(&self) -> PathBuf {
        Path::new(&self.t5_cache_dir).join(&self.t5_tokenizer_filename)
    }
}

fn default_t5_cache_dir() -> String {
    format!(
        "{}/.cache/asl-translate/models",
        std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
    )
}

fn env_str(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                default.to_string()
            } else {
                trimmed.to_string()
            }
        }
        Err(_) => default.to_string(),
    }
}

fn env_opt(name: &str) -> Option<String> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Err(_) => None,
    }
}

fn env_u16(name: &str, default: u16) -> Result<u16, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw.trim().parse::<u16>().map_err(|_| {
        AppError::internal(format!("invalid {name}={raw:?}; expected integer 1-65535"))
    })?;
    if parsed == 0 {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}

fn env_u64(name: &str, default: u64) -> Result<u64, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| AppError::internal(format!("invalid {name}={raw:?}; expected integer")))?;
    if parsed == 0 {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected > 0"
        )));
    }
    Ok(parsed)
}

fn env_bool(name: &str, default: bool) -> Result<bool, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    let normalized = raw.trim().to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected true/false"
        ))),
    }
}

fn env_usize_bounded(
    name: &str,
    default: usize,
    min: usize,
    max: usize,
) -> Result<usize, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    parse_usize_bounded(name, &raw, min, max)
}

fn parse_usize_bounded(name: &str, raw: &str, min: usize, max: usize) -> Result<usize, AppError> {
    let trimmed = raw.trim();
    let parsed = trimmed.parse::<usize>().map_err(|_| {
        AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        ))
    })?;
    if parsed < min || parsed > max {
        return Err(AppError::internal(format!(
            "invalid {name}={raw:?}; expected integer in range [{min}, {max}]"
        )));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::parse_usize_bounded;

    #[test]
    fn parse_usize_bounded_accepts_in_range_values() {
        assert_eq!(
            parse_usize_bounded("ASL_T5_PARALLELISM", "1", 1, 8).unwrap(),
            1
        );
        assert_eq!(
            parse_usize_bounded("ASL_T5_PARALLELISM", "8", 1, 8).unwrap(),
            8
        );
    }

    #[test]
    fn parse_usize_bounded_rejects_non_numeric_value() {
        assert!(parse_usize_bounded("ASL_T5_PARALLELISM", "abc", 1, 8).is_err());
    }

    #[test]
    fn parse_usize_bounded_rejects_out_of_range_values() {
        assert!(parse_usize_bounded("ASL_FRAME_SAMPLE_RATE", "0", 1, 120).is_err());
        assert!(parse_usize_bounded("ASL_T5_PARALLELISM", "9", 1, 8).is_err());
    }
}
