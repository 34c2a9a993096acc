//! Scanned mode: rasterise every page, OCR each image, reassemble in order.
//!
//! ## Lifecycle of a page image
//!
//! 1. pdfium renders the page (blocking pool, one page at a time)
//! 2. the render is grayscaled, bounded to `ocr_max_edge`, cleaned up per
//!    [`ImageCleanup`], PNG-encoded and written into the request workspace
//!    as a [`PageImage`]
//! 3. the OCR task reads the file, calls the service, then drops the
//!    [`PageImage`], which deletes the file
//!
//! OCR tasks run concurrently (`buffer_unordered`), so they finish in any
//! order; results carry their page index and are sorted before returning.
//! The first failure aborts the run; the unstarted page images are dropped
//! with the stream and their files removed.

use super::encode::{encode_png, prepare_for_ocr};
use super::ocr::{recognize_with_fallback, OcrClient};
use super::pdf::{run_blocking, PdfBackend, RenderOptions};
use super::workspace::RequestWorkspace;
use super::{SourceOutput, StagedPdf, TextSource};
use crate::config::{ConversionConfig, ImageCleanup, OcrSettings};
use crate::error::ConversionError;
use crate::output::{RecognizedText, TextOrigin};
use crate::progress::ProgressCallback;
use crate::request::ConversionMode;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use image::DynamicImage;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempPath;
use tracing::{debug, info};

/// One rasterised page on disk. The file is deleted when this is dropped.
#[derive(Debug)]
pub struct PageImage {
    /// 0-based page index.
    pub page_index: usize,
    pub width: u32,
    pub height: u32,
    path: TempPath,
}

impl PageImage {
    pub fn page_num(&self) -> usize {
        self.page_index + 1
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub struct ScannedPdfPipeline {
    backend: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrClient>,
    fallback: Option<Arc<dyn OcrClient>>,
    settings: OcrSettings,
    render: RenderOptions,
    ocr_max_edge: u32,
    cleanup: ImageCleanup,
    progress: Option<ProgressCallback>,
}

impl ScannedPdfPipeline {
    pub fn new(
        backend: Arc<dyn PdfBackend>,
        ocr: Arc<dyn OcrClient>,
        config: &ConversionConfig,
    ) -> Self {
        Self {
            backend,
            ocr,
            fallback: None,
            settings: config.ocr.clone(),
            render: RenderOptions {
                dpi: config.dpi,
                max_pixels: config.max_rendered_pixels,
            },
            ocr_max_edge: config.ocr_max_edge,
            cleanup: config.ocr_cleanup,
            progress: config.progress_callback.clone(),
        }
    }

    /// Route failed pages, and pages past `primary_page_limit`, to `fallback`.
    pub fn with_fallback(mut self, fallback: Arc<dyn OcrClient>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Render every page into a PNG file under `pdf.scratch_dir/pages`.
    pub async fn rasterize(&self, pdf: &StagedPdf) -> Result<Vec<PageImage>, ConversionError> {
        let pages_dir = pdf.scratch_dir.join("pages");
        tokio::fs::create_dir_all(&pages_dir)
            .await
            .map_err(|e| ConversionError::Internal(format!("cannot create page directory: {e}")))?;

        let path = pdf.path.clone();
        let password = pdf.password.clone();
        let options = self.render;
        let max_edge = self.ocr_max_edge;
        let cleanup = self.cleanup;

        run_blocking(Arc::clone(&self.backend), move |backend| {
            let mut images = Vec::new();
            let mut sink = |idx: usize, img: DynamicImage| -> Result<(), ConversionError> {
                let img = prepare_for_ocr(img, max_edge, &cleanup);
                let fail = |detail: String| ConversionError::RasterizationFailure {
                    page: idx + 1,
                    detail,
                };
                let png = encode_png(&img).map_err(|e| fail(format!("PNG encoding failed: {e}")))?;
                let file = RequestWorkspace::write_page_image(&pages_dir, idx + 1, &png)
                    .map_err(|e| fail(format!("cannot write page image: {e}")))?;
                images.push(PageImage {
                    page_index: idx,
                    width: img.width(),
                    height: img.height(),
                    path: file,
                });
                Ok(())
            };
            backend.render_pages(&path, password.as_deref(), &options, &mut sink)?;
            drop(sink);
            Ok(images)
        })
        .await
    }

    /// OCR every image concurrently. Returns `(page_index, text)` pairs in
    /// completion order plus the number of OCR requests made.
    async fn recognize_all(
        &self,
        images: Vec<PageImage>,
    ) -> Result<(Vec<(usize, String)>, usize), ConversionError> {
        let total = images.len();
        let calls = AtomicUsize::new(0);
        let calls_ref = &calls;
        let settings = &self.settings;
        let ocr = self.ocr.as_ref();
        let fallback = self.fallback.as_deref();
        let progress = self.progress.as_ref();

        let results: Vec<(usize, String)> = stream::iter(images.into_iter().map(|image| async move {
            let page_num = image.page_num();
            if let Some(cb) = progress {
                cb.on_page_start(page_num, total);
            }

            let result = match tokio::fs::read(image.path()).await {
                Ok(png) => {
                    recognize_with_fallback(ocr, fallback, page_num, &png, settings, calls_ref).await
                }
                Err(e) => Err(ConversionError::Internal(format!(
                    "page {page_num}: cannot read page image: {e}"
                ))),
            };
            let page_index = image.page_index;
            drop(image);
            debug!("Page {}: image released", page_num);

            match result {
                Ok(text) => {
                    if let Some(cb) = progress {
                        cb.on_page_complete(page_num, total, text.len());
                    }
                    Ok((page_index, text))
                }
                Err(e) => {
                    if let Some(cb) = progress {
                        cb.on_page_error(page_num, total, &e.to_string());
                    }
                    Err(e)
                }
            }
        }))
        .buffer_unordered(settings.concurrency)
        .try_collect()
        .await?;

        Ok((results, calls.load(Ordering::SeqCst)))
    }
}

#[async_trait]
impl TextSource for ScannedPdfPipeline {
    fn mode(&self) -> ConversionMode {
        ConversionMode::Scanned
    }

    async fn produce(&self, pdf: &StagedPdf) -> Result<SourceOutput, ConversionError> {
        let render_start = Instant::now();
        let images = self.rasterize(pdf).await?;
        info!(
            "Rendered {} pages in {}ms",
            images.len(),
            render_start.elapsed().as_millis()
        );
        if images.len() != pdf.page_count {
            return Err(ConversionError::Internal(format!(
                "rendered {} pages, document reports {}",
                images.len(),
                pdf.page_count
            )));
        }

        let ocr_start = Instant::now();
        let (results, ocr_calls) = self.recognize_all(images).await?;
        info!(
            "{} recognised {} pages in {}ms ({} requests)",
            self.ocr.name(),
            results.len(),
            ocr_start.elapsed().as_millis(),
            ocr_calls
        );

        let text = RecognizedText::from_indexed(results, pdf.page_count, TextOrigin::Ocr)
            .ok_or_else(|| ConversionError::Internal("OCR results do not cover every page".into()))?;
        Ok(SourceOutput { text, ocr_calls })
    }
}
