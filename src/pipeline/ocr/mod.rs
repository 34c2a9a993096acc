//! OCR service adapters and the per-page call policy.
//!
//! [`OcrClient`] is the seam between the scanned pipeline and whatever
//! engine does the recognition. Two adapters ship:
//!
//! * [`vision::GoogleVisionClient`] - Google Cloud Vision REST,
//!   `DOCUMENT_TEXT_DETECTION` with Kannada/English language hints.
//! * [`tesseract::TesseractClient`] - the local `tesseract` binary with the
//!   `kan` language pack.
//!
//! Credentials are loaded once by [`build_client`] and handed to the
//! adapter; nothing in the pipeline reads the environment.
//!
//! [`recognize_page`] wraps a single client call with the configured
//! deadline and, when enabled, exponential-backoff retries
//! (`retry_backoff_ms * 2^(attempt-1)`, saturating).
//!
//! [`recognize_with_fallback`] adds the optional second engine: pages past
//! `primary_page_limit` go straight to it, and a page whose primary call
//! fails (timeout included) is retried there once.

pub mod tesseract;
pub mod vision;

use crate::config::{OcrEngine, OcrSettings};
use crate::error::{ConversionError, OcrError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

pub use tesseract::TesseractClient;
pub use vision::{GoogleVisionClient, OcrCredentials};

/// Recognises the text on one page image.
#[async_trait]
pub trait OcrClient: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Recognise `png`, the rendered image of page `page_num` (1-indexed).
    async fn recognize(&self, page_num: usize, png: &[u8]) -> Result<String, OcrError>;
}

/// Construct the configured OCR client, loading credentials if the engine
/// needs them.
pub fn build_client(settings: &OcrSettings) -> Result<Arc<dyn OcrClient>, ConversionError> {
    build_engine(settings.engine, settings)
}

/// Construct the fallback engine, if one is configured.
pub fn build_fallback_client(
    settings: &OcrSettings,
) -> Result<Option<Arc<dyn OcrClient>>, ConversionError> {
    settings
        .fallback_engine
        .map(|engine| build_engine(engine, settings))
        .transpose()
}

fn build_engine(
    engine: OcrEngine,
    settings: &OcrSettings,
) -> Result<Arc<dyn OcrClient>, ConversionError> {
    match engine {
        OcrEngine::GoogleVision => {
            let path = settings.credentials_path.as_ref().ok_or_else(|| {
                ConversionError::InvalidConfig(format!(
                    "Google Vision OCR needs credentials; set {} to a credentials file",
                    crate::config::CREDENTIALS_ENV
                ))
            })?;
            let credentials = OcrCredentials::from_file(path)
                .map_err(|e| ConversionError::InvalidConfig(e.to_string()))?;
            let client = GoogleVisionClient::new(credentials, settings)
                .map_err(|e| ConversionError::InvalidConfig(e.to_string()))?;
            Ok(Arc::new(client))
        }
        OcrEngine::Tesseract => Ok(Arc::new(TesseractClient::new(&settings.tesseract_lang))),
    }
}

/// Stand-in used when no OCR engine is configured. Digital conversions
/// work; every scanned page fails with [`OcrError::Credentials`].
#[derive(Debug, Clone)]
pub struct UnconfiguredOcr {
    reason: String,
}

impl UnconfiguredOcr {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl OcrClient for UnconfiguredOcr {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn recognize(&self, _page_num: usize, _png: &[u8]) -> Result<String, OcrError> {
        Err(OcrError::Credentials(self.reason.clone()))
    }
}

/// Call `client` for one page under the configured deadline and retry policy.
///
/// Every attempt increments `calls`. Only transient failures
/// ([`OcrError::is_transient`]) are retried.
pub async fn recognize_page(
    client: &dyn OcrClient,
    page_num: usize,
    png: &[u8],
    settings: &OcrSettings,
    calls: &AtomicUsize,
) -> Result<String, ConversionError> {
    let deadline = Duration::from_secs(settings.timeout_secs);
    let mut last_err: Option<OcrError> = None;

    for attempt in 0..=settings.max_retries {
        if attempt > 0 {
            let backoff = backoff_ms(settings.retry_backoff_ms, attempt);
            warn!(
                "Page {}: OCR retry {}/{} after {}ms",
                page_num, attempt, settings.max_retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        calls.fetch_add(1, Ordering::SeqCst);
        let outcome = match timeout(deadline, client.recognize(page_num, png)).await {
            Ok(result) => result,
            Err(_) => Err(OcrError::Timeout {
                secs: settings.timeout_secs,
            }),
        };

        match outcome {
            Ok(text) => {
                debug!(
                    "Page {}: {} recognised {} chars",
                    page_num,
                    client.name(),
                    text.chars().count()
                );
                return Ok(text);
            }
            Err(e) => {
                warn!("Page {}: OCR attempt {} failed: {}", page_num, attempt + 1, e);
                let transient = e.is_transient();
                last_err = Some(e);
                if !transient {
                    break;
                }
            }
        }
    }

    Err(ConversionError::OcrServiceError {
        page: page_num,
        source: last_err.unwrap_or_else(|| OcrError::Unavailable("no attempt made".into())),
    })
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt-1)`, pinned
/// at `u64::MAX` instead of overflowing.
fn backoff_ms(base: u64, attempt: u32) -> u64 {
    base.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Whether `page_num` is within the primary engine's page budget.
fn primary_covers(settings: &OcrSettings, page_num: usize) -> bool {
    settings
        .primary_page_limit
        .map_or(true, |limit| page_num <= limit)
}

/// [`recognize_page`] on the primary engine, falling back to `fallback`
/// for pages over the primary's limit or when the primary fails.
///
/// Without a fallback this is exactly [`recognize_page`] on `primary`. When
/// both engines fail, the fallback's error is returned.
pub async fn recognize_with_fallback(
    primary: &dyn OcrClient,
    fallback: Option<&dyn OcrClient>,
    page_num: usize,
    png: &[u8],
    settings: &OcrSettings,
    calls: &AtomicUsize,
) -> Result<String, ConversionError> {
    let Some(fallback) = fallback else {
        return recognize_page(primary, page_num, png, settings, calls).await;
    };
    if !primary_covers(settings, page_num) {
        debug!("Page {}: over the primary page limit, using {}", page_num, fallback.name());
        return recognize_page(fallback, page_num, png, settings, calls).await;
    }

    match recognize_page(primary, page_num, png, settings, calls).await {
        Ok(text) => Ok(text),
        Err(e) => {
            warn!(
                "Page {}: {} failed, falling back to {}: {}",
                page_num,
                primary.name(),
                fallback.name(),
                e
            );
            recognize_page(fallback, page_num, png, settings, calls).await
        }
    }
}
