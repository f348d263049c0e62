//! Model file resolution and optional Hugging Face download support.
//!
//! This module guarantees that the T5 encoder, decoder, and tokenizer files
//! exist locally before backend initialization. Downloads are lockfile
//! guarded so concurrent server starts fetch each artifact once.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use tracing::info;

use crate::config::AppConfig;
use crate::error::AppError;

const LOCK_TIMEOUT: Duration = Duration::from_secs(120);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Ensures every translation model artifact exists, downloading missing
/// ones from Hugging Face when auto-download is enabled.
pub fn ensure_models_ready(cfg: &AppConfig) -> Result<(), AppError> {
    let artifacts = [
        (cfg.t5_encoder_filename.as_str(), cfg.t5_encoder_path()),
        (cfg.t5_decoder_filename.as_str(), cfg.t5_decoder_path()),
        (cfg.t5_tokenizer_filename.as_str(), cfg.t5_tokenizer_path()),
    ];

    for (remote_name, target_path) in artifacts {
        if file_exists(&target_path) {
            continue;
        }

        if !cfg.t5_auto_download {
            return Err(AppError::internal(format!(
                "model file not found at {:?}; place the artifact there or enable ASL_T5_AUTO_DOWNLOAD",
                target_path
            )));
        }

        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                AppError::internal(format!(
                    "failed to create model cache directory {:?}: {err}",
                    parent
                ))
            })?;
        }

        let lock_path = lock_path_for(&target_path);
        let _guard = acquire_lock(&lock_path)?;

        // Another process may have completed the download while we waited.
        if file_exists(&target_path) {
            continue;
        }

        info!(repo = %cfg.t5_hf_repo, artifact = remote_name, "downloading model artifact");
        download_to_path(cfg, remote_name, &target_path)?;
    }

    Ok(())
}

fn file_exists(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.len() > 0)
        .unwrap_or(false)
}

fn lock_path_for(target_path: &Path) -> PathBuf {
    let lock_name = format!(
        "{}.lock",
        target_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("model")
    );
    target_path.with_file_name(lock_name)
}

fn acquire_lock(path: &Path) -> Result<LockGuard, AppError> {
    let start = Instant::now();
    loop {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let _ = writeln!(file, "pid={}", std::process::id());
                return Ok(LockGuard {
                    path: path.to_path_buf(),
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                if start.elapsed() >= LOCK_TIMEOUT {
                    return Err(AppError::internal(format!(
                        "timed out waiting for model download lock at {:?}",
                        path
                    )));
                }
                thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(err) => {
                return Err(AppError::internal(format!(
                    "failed to acquire model download lock at {:?}: {err}",
                    path
                )));
            }
        }
    }
}

fn download_to_path(cfg: &AppConfig, remote_name: &str, target_path: &Path) -> Result<(), AppError> {
    let url = hf_resolve_url(&cfg.t5_hf_repo, remote_name);
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|err| AppError::internal(format!("failed to create HTTP client: {err}")))?;

    let mut request = client.get(&url);
    if let Some(token) = cfg.hf_token.as_deref() {
        request = request.bearer_auth(token);
    }

    let mut response = request.send().map_err(|err| {
        AppError::internal(format!(
            "failed to download model from {url}: {err}; check network connectivity"
        ))
    })?;

    if !response.status().is_success() {
        return match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(AppError::internal(format!(
                "Hugging Face rejected model download from {url} with {}; set HF_TOKEN for authenticated access",
                response.status()
            ))),
            StatusCode::NOT_FOUND => Err(AppError::internal(format!(
                "model not found at {url}; verify ASL_T5_HF_REPO and the artifact filenames"
            ))),
            status => Err(AppError::internal(format!(
                "model download failed from {url} with HTTP status {status}"
            ))),
        };
    }

    let tmp_path = target_path.with_extension("part");
    let mut out = File::create(&tmp_path).map_err(|err| {
        AppError::internal(format!(
            "failed to create temporary model file {:?}: {err}",
            tmp_path
        ))
    })?;
    std::io::copy(&mut response, &mut out).map_err(|err| {
        AppError::internal(format!(
            "failed writing downloaded model to {:?}: {err}",
            tmp_path
        ))
    })?;
    out.flush().map_err(|err| {
        AppError::internal(format!(
            "failed to flush downloaded model file {:?}: {err}",
            tmp_path
        ))
    })?;

    let size = out.metadata().map(|m| m.len()).unwrap_or_default();
    if size == 0 {
        let _ = fs::remove_file(&tmp_path);
        return Err(AppError::internal(format!(
            "downloaded empty model file from {url}; refusing to continue"
        )));
    }

    fs::rename(&tmp_path, target_path).map_err(|err| {
        AppError::internal(format!(
            "failed to move model from {:?} to {:?}: {err}",
            tmp_path, target_path
        ))
    })?;

    Ok(())
}

fn hf_resolve_url(repo: &str, filename: &str) -> String {
    format!(
        "https://huggingface.co/{}/resolve/main/{}",
        repo.trim_matches('/'),
        filename.trim_matches('/')
    )
}

struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::{hf_resolve_url, lock_path_for};
    use std::path::Path;

    #[test]
    fn resolve_url_normalizes_edges() {
        assert_eq!(
            hf_resolve_url("/Xenova/t5-base/", "/onnx/encoder_model.onnx/"),
            "https://huggingface.co/Xenova/t5-base/resolve/main/onnx/encoder_model.onnx"
        );
    }

    #[test]
    fn lock_path_uses_sibling_file() {
        let path = Path::new("/tmp/encoder_model.onnx");
        assert_eq!(
            lock_path_for(path).to_string_lossy(),
            "/tmp/encoder_model.onnx.lock"
        );
    }
}
