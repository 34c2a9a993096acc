//! HTTP API for PDF conversion.
//!
//! # Endpoints
//!
//! - `POST /api/v1/convert` - convert an uploaded PDF, respond with the artifact
//! - `POST /api/v1/analyze` - classify an uploaded PDF's text layer
//! - `GET /health` - liveness check
//!
//! `convert` takes multipart form data:
//!
//! | Field | Required | Values |
//! |-------|----------|--------|
//! | `file` | yes | the PDF |
//! | `mode` | no | `digital` (default), `scanned` |
//! | `format` | no | `docx` (default), `text` |
//! | `title`, `author` | no | written into the `.docx` core properties |
//! | `password` | no | for encrypted PDFs |
//!
//! Success is `200` with the artifact as an attachment. Failure is a JSON
//! body `{"error": "...", "code": "..."}` and no download.
//!
//! # cURL Examples
//!
//! ```bash
//! curl -F "file=@kathe.pdf" -F mode=digital -F format=docx \
//!      -o kathe.docx http://localhost:8000/api/v1/convert
//!
//! curl -F "file=@scan.pdf" http://localhost:8000/api/v1/analyze
//! ```

mod error;
mod handlers;

pub use error::ApiError;

use crate::convert::Converter;
use crate::error::ConversionError;
use axum::extract::DefaultBodyLimit;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Room for multipart boundaries and the small form fields on top of the
/// file itself.
pub const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub converter: Arc<Converter>,
}

/// Listener and CORS settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. `None` allows any origin.
    pub cors_origins: Option<Vec<String>>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: None,
        }
    }
}

impl ServerConfig {
    /// Read `PDF2WORD_HOST`, `PDF2WORD_PORT` and `PDF2WORD_CORS_ORIGINS`
    /// (comma-separated).
    pub fn from_env() -> Result<Self, ConversionError> {
        let mut config = Self::default();
        if let Ok(host) = std::env::var("PDF2WORD_HOST") {
            if !host.trim().is_empty() {
                config.host = host.trim().to_string();
            }
        }
        if let Ok(port) = std::env::var("PDF2WORD_PORT") {
            config.port = port
                .trim()
                .parse()
                .map_err(|e| ConversionError::InvalidConfig(format!("PDF2WORD_PORT={port:?}: {e}")))?;
        }
        if let Ok(origins) = std::env::var("PDF2WORD_CORS_ORIGINS") {
            let list: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !list.is_empty() {
                config.cors_origins = Some(list);
            }
        }
        Ok(config)
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConversionError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| ConversionError::InvalidConfig(format!("bind address {}:{}: {e}", self.host, self.port)))
    }
}

/// Build the API router around a converter.
///
/// The transport body limit is the converter's `max_upload_bytes` plus
/// [`MULTIPART_OVERHEAD_BYTES`]; the exact per-file limit is enforced by
/// upload validation.
pub fn create_router(converter: Arc<Converter>, server: &ServerConfig) -> Router {
    let body_limit = converter
        .config()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    let cors_layer = match &server.cors_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
            tracing::info!("CORS configured with {} allowed origin(s)", origins.len());
            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods(Any)
                .allow_headers(Any)
        }
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/api/v1/convert", post(handlers::convert_handler))
        .route("/api/v1/analyze", post(handlers::analyze_handler))
        .route("/health", get(handlers::health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(cors_layer)
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { converter })
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve<F>(converter: Arc<Converter>, server: &ServerConfig, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = server
        .socket_addr()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()))?;
    let app = create_router(converter, server);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("pdf2word server listening on {}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_bind_address() {
        let addr = ServerConfig::default().socket_addr().unwrap();
        assert_eq!(addr.port(), 8000);
    }

    #[test]
    fn bad_host_is_config_error() {
        let config = ServerConfig {
            host: "not a host".into(),
            ..ServerConfig::default()
        };
        assert!(matches!(config.socket_addr(), Err(ConversionError::InvalidConfig(_))));
    }
}
