mod api;
mod config;
mod error;
mod model_store;
mod recognition;
mod sequence;
mod store;
mod translation;
mod video;

use std::sync::Arc;

use tracing::info;

use crate::api::{build_router, AppState};
use crate::config::AppConfig;
use crate::recognition::build_recognizer;
use crate::store::UploadStore;
use crate::translation::build_translator;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "asl_translate_server=info,axum=info".into()),
        )
        .compact()
        .init();

    let cfg = AppConfig::from_env()?;

    // The blocking download client must stay off the async runtime threads.
    let download_cfg = cfg.clone();
    tokio::task::spawn_blocking(move || model_store::ensure_models_ready(&download_cfg)).await??;

    let store = Arc::new(UploadStore::open(&cfg.upload_dir)?);
    let recognizer = build_recognizer(&cfg)?;
    let translator = build_translator(&cfg)?;
    let state = Arc::new(AppState::new(cfg.clone(), store, recognizer, translator));

    let app = build_router(state);

    let addr = format!("{}:{}", cfg.host, cfg.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        host = %cfg.host,
        port = cfg.port,
        upload_dir = %cfg.upload_dir,
        recognizer = ?cfg.recognizer_kind,
        translator = ?cfg.translator_kind,
        "starting asl-translate-rs"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
            let _ = sigterm.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
