//! Digital mode: read the embedded text layer.

use super::pdf::{run_blocking, PdfBackend};
use super::{SourceOutput, StagedPdf, TextSource};
use crate::error::ConversionError;
use crate::output::{RecognizedText, TextOrigin};
use crate::progress::ProgressCallback;
use crate::request::ConversionMode;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

pub struct DigitalPdfExtractor {
    backend: Arc<dyn PdfBackend>,
    progress: Option<ProgressCallback>,
}

impl DigitalPdfExtractor {
    pub fn new(backend: Arc<dyn PdfBackend>, progress: Option<ProgressCallback>) -> Self {
        Self { backend, progress }
    }
}

#[async_trait]
impl TextSource for DigitalPdfExtractor {
    fn mode(&self) -> ConversionMode {
        ConversionMode::Digital
    }

    async fn produce(&self, pdf: &StagedPdf) -> Result<SourceOutput, ConversionError> {
        let path = pdf.path.clone();
        let password = pdf.password.clone();
        let pages = run_blocking(Arc::clone(&self.backend), move |b| {
            b.page_texts(&path, password.as_deref())
        })
        .await?;

        if pages.len() != pdf.page_count {
            return Err(ConversionError::Internal(format!(
                "text layer has {} pages, document reports {}",
                pages.len(),
                pdf.page_count
            )));
        }

        let text = RecognizedText::from_ordered(pages, TextOrigin::Embedded);
        if let Some(cb) = &self.progress {
            let total = text.len();
            for page in text.pages() {
                cb.on_page_complete(page.page_num, total, page.text.len());
            }
        }

        if !text.has_content() {
            warn!("No page has an extractable text layer");
            return Err(ConversionError::UnparsablePdf {
                detail: "no extractable text layer; the PDF looks scanned, convert it in scanned (OCR) mode"
                    .into(),
            });
        }

        let with_text = text.pages().iter().filter(|p| !p.text.trim().is_empty()).count();
        info!("Extracted text from {}/{} pages", with_text, text.len());
        Ok(SourceOutput { text, ocr_calls: 0 })
    }
}
