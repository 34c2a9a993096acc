//! PDF engine access: page text, page rasterisation, document metadata.
//!
//! Everything the pipeline needs from a PDF library goes through the
//! blocking [`PdfBackend`] trait. [`PdfiumBackend`] is the production
//! implementation; tests substitute an in-memory backend so orchestration
//! can be exercised without a pdfium shared library.
//!
//! Backend calls are CPU-bound and must not run on Tokio worker threads;
//! [`run_blocking`] moves them onto the blocking pool.

use crate::error::ConversionError;
use crate::output::DocumentMetadata;
use image::DynamicImage;
use once_cell::sync::Lazy;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Environment variable pointing at a pdfium library file or directory.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Rasterisation parameters.
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub dpi: u32,
    /// Cap on either rendered dimension.
    pub max_pixels: u32,
}

/// Receives each rendered page as `(0-based index, image)`, in page order.
pub type PageSink<'a> = dyn FnMut(usize, DynamicImage) -> Result<(), ConversionError> + 'a;

/// Blocking access to a PDF engine.
pub trait PdfBackend: Send + Sync {
    /// Read the document info dictionary and page count.
    fn metadata(
        &self,
        pdf: &Path,
        password: Option<&str>,
    ) -> Result<DocumentMetadata, ConversionError>;

    /// Embedded text of every page, in page order, one entry per page.
    fn page_texts(&self, pdf: &Path, password: Option<&str>)
        -> Result<Vec<String>, ConversionError>;

    /// Rasterise every page in order, handing each image to `sink` as soon
    /// as it is rendered. Returns the number of pages rendered.
    fn render_pages(
        &self,
        pdf: &Path,
        password: Option<&str>,
        options: &RenderOptions,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, ConversionError>;
}

/// Run a backend call on the blocking thread pool.
pub async fn run_blocking<T, F>(backend: Arc<dyn PdfBackend>, f: F) -> Result<T, ConversionError>
where
    T: Send + 'static,
    F: FnOnce(&dyn PdfBackend) -> Result<T, ConversionError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(backend.as_ref()))
        .await
        .map_err(|e| ConversionError::Internal(format!("PDF task panicked: {}", e)))?
}

// ── pdfium ───────────────────────────────────────────────────────────────

/// One pdfium instance may exist at a time: `Pdfium::new` initialises the
/// library globally and dropping it tears the library down.
static PDFIUM_LOCK: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

/// [`PdfBackend`] backed by the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library: Option<PathBuf>,
}

impl PdfiumBackend {
    /// Locate pdfium and verify it can be bound.
    ///
    /// Search order: `PDFIUM_LIB_PATH` (file or directory), the working
    /// directory, then the system library path.
    pub fn new() -> Result<Self, ConversionError> {
        let library = std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from);
        Self::with_library(library)
    }

    /// Bind to an explicit library file or directory (or the default search
    /// when `None`).
    pub fn with_library(library: Option<PathBuf>) -> Result<Self, ConversionError> {
        let backend = Self { library };
        let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        backend.bind()?;
        info!("pdfium bound ({})", backend.describe());
        Ok(backend)
    }

    fn describe(&self) -> String {
        match &self.library {
            Some(p) => p.display().to_string(),
            None => "default search path".to_string(),
        }
    }

    fn bind(&self) -> Result<Pdfium, ConversionError> {
        let bindings = match &self.library {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| ConversionError::PdfiumBindingFailed(format!("{:?}", e)))?;
        Ok(Pdfium::new(bindings))
    }

    /// Bind, open `pdf`, and run `f` while holding the pdfium lock.
    fn with_document<T>(
        &self,
        pdf: &Path,
        password: Option<&str>,
        f: impl FnOnce(&PdfDocument<'_>) -> Result<T, ConversionError>,
    ) -> Result<T, ConversionError> {
        let _guard = PDFIUM_LOCK.lock().unwrap_or_else(|p| p.into_inner());
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, password)
            .map_err(|e| load_error(e, password.is_some()))?;
        f(&document)
    }
}

fn load_error(err: PdfiumError, had_password: bool) -> ConversionError {
    let err_str = format!("{:?}", err);
    let detail = if err_str.contains("Password") || err_str.contains("password") {
        if had_password {
            "wrong password for encrypted PDF".to_string()
        } else {
            "PDF is encrypted and requires a password".to_string()
        }
    } else {
        format!("corrupt or unsupported PDF ({})", err_str)
    };
    ConversionError::UnparsablePdf { detail }
}

impl PdfBackend for PdfiumBackend {
    fn metadata(
        &self,
        pdf: &Path,
        password: Option<&str>,
    ) -> Result<DocumentMetadata, ConversionError> {
        self.with_document(pdf, password, |document| {
            let metadata = document.metadata();
            let get_meta = |tag: PdfDocumentMetadataTagType| -> Option<String> {
                metadata.get(tag).and_then(|t| {
                    let v = t.value().trim().to_string();
                    if v.is_empty() {
                        None
                    } else {
                        Some(v)
                    }
                })
            };

            Ok(DocumentMetadata {
                title: get_meta(PdfDocumentMetadataTagType::Title),
                author: get_meta(PdfDocumentMetadataTagType::Author),
                subject: get_meta(PdfDocumentMetadataTagType::Subject),
                creator: get_meta(PdfDocumentMetadataTagType::Creator),
                producer: get_meta(PdfDocumentMetadataTagType::Producer),
                creation_date: get_meta(PdfDocumentMetadataTagType::CreationDate),
                modification_date: get_meta(PdfDocumentMetadataTagType::ModificationDate),
                page_count: document.pages().len() as usize,
                pdf_version: format!("{:?}", document.version()),
            })
        })
    }

    fn page_texts(
        &self,
        pdf: &Path,
        password: Option<&str>,
    ) -> Result<Vec<String>, ConversionError> {
        self.with_document(pdf, password, |document| {
            let mut texts = Vec::with_capacity(document.pages().len() as usize);
            for (idx, page) in document.pages().iter().enumerate() {
                let text = page.text().map_err(|e| ConversionError::UnparsablePdf {
                    detail: format!("page {}: text layer unreadable ({:?})", idx + 1, e),
                })?;
                let all = text.all();
                debug!("Page {} text layer: {} chars", idx + 1, all.chars().count());
                texts.push(all);
            }
            Ok(texts)
        })
    }

    fn render_pages(
        &self,
        pdf: &Path,
        password: Option<&str>,
        options: &RenderOptions,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, ConversionError> {
        self.with_document(pdf, password, |document| {
            let mut rendered = 0;
            for (idx, page) in document.pages().iter().enumerate() {
                let target_width = target_width_px(page.width().value, options);
                let render_config = PdfRenderConfig::new()
                    .set_target_width(target_width)
                    .set_maximum_height(options.max_pixels as i32);

                let bitmap = page.render_with_config(&render_config).map_err(|e| {
                    ConversionError::RasterizationFailure {
                        page: idx + 1,
                        detail: format!("{:?}", e),
                    }
                })?;

                let image = bitmap.as_image();
                debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    image.width(),
                    image.height()
                );
                sink(idx, image)?;
                rendered += 1;
            }
            Ok(rendered)
        })
    }
}

/// Pixel width for a page `width_pt` points wide at the requested DPI,
/// capped at `max_pixels`.
fn target_width_px(width_pt: f32, options: &RenderOptions) -> i32 {
    let px = (width_pt * options.dpi as f32 / 72.0).round() as i64;
    px.clamp(1, options.max_pixels as i64) as i32
}
