//! HTTP server binary for kannada-pdf2word.
//!
//! Configuration comes from the environment (and a `.env` file if present):
//! `PDF2WORD_HOST`, `PDF2WORD_PORT`, `PDF2WORD_CORS_ORIGINS` for the
//! listener, plus every `PDF2WORD_*` conversion setting read by
//! `ConversionConfig::from_env`.

use anyhow::{Context, Result};
use kannada_pdf2word::server::{self, ServerConfig};
use kannada_pdf2word::{ConversionConfig, Converter};
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("kannada_pdf2word=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConversionConfig::from_env().context("Invalid conversion configuration")?;
    let server_config = ServerConfig::from_env().context("Invalid server configuration")?;

    tracing::info!(
        "Max upload {} bytes, OCR engine {}, storage {}",
        config.max_upload_bytes,
        config.ocr.engine,
        config.storage_dir.display()
    );

    let converter = Arc::new(Converter::with_pdfium(config).context("Failed to initialise converter")?);

    server::serve(converter, &server_config, shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
