//! Shared fixtures for the integration tests: an in-memory PDF backend,
//! scripted OCR clients and a `.docx` text reader.

#![allow(dead_code)]

use async_trait::async_trait;
use image::DynamicImage;
use kannada_pdf2word::pipeline::pdf::{PageSink, RenderOptions};
use kannada_pdf2word::{
    ConversionConfig, ConversionError, ConversionMode, ConversionRequest, Converter,
    DocumentMetadata, OcrClient, OcrError, OutputFormat, PdfBackend, UploadedFile,
};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Smallest byte string that passes upload validation.
pub const PDF_BYTES: &[u8] = b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n1 0 obj\n<<>>\nendobj\n%%EOF\n";

pub fn pdf_upload(name: &str) -> UploadedFile {
    UploadedFile::new(PDF_BYTES.to_vec(), name, "application/pdf")
}

pub fn request(mode: ConversionMode, format: OutputFormat) -> ConversionRequest {
    ConversionRequest::new(pdf_upload("kathe.pdf"), mode, format)
}

// ── PDF backend ──────────────────────────────────────────────────────────────

/// In-memory document: one text-layer string per page. Rendered pages are
/// blank images whose width encodes the page index.
pub struct MemoryPdf {
    pub pages: Vec<String>,
    pub title: Option<String>,
}

impl MemoryPdf {
    pub fn new(pages: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            pages: pages.iter().map(|s| s.to_string()).collect(),
            title: None,
        })
    }

    /// `n` pages with an empty text layer, as a scanner produces.
    pub fn blank(n: usize) -> Arc<Self> {
        Arc::new(Self {
            pages: vec![String::new(); n],
            title: None,
        })
    }
}

impl PdfBackend for MemoryPdf {
    fn metadata(&self, _: &Path, _: Option<&str>) -> Result<DocumentMetadata, ConversionError> {
        Ok(DocumentMetadata {
            title: self.title.clone(),
            page_count: self.pages.len(),
            pdf_version: "Pdf1_7".into(),
            ..DocumentMetadata::default()
        })
    }

    fn page_texts(&self, _: &Path, _: Option<&str>) -> Result<Vec<String>, ConversionError> {
        Ok(self.pages.clone())
    }

    fn render_pages(
        &self,
        _: &Path,
        _: Option<&str>,
        _: &RenderOptions,
        sink: &mut PageSink<'_>,
    ) -> Result<usize, ConversionError> {
        for idx in 0..self.pages.len() {
            sink(idx, DynamicImage::new_rgb8(32 + idx as u32, 32))?;
        }
        Ok(self.pages.len())
    }
}

// ── OCR clients ──────────────────────────────────────────────────────────────

/// Returns a fixed Kannada line per page and records every call.
#[derive(Default)]
pub struct RecordingOcr {
    pub calls: AtomicUsize,
    pub pages_seen: Mutex<Vec<usize>>,
    /// Delay page `n` by `(total - n) * 10ms` so completions arrive in
    /// reverse order.
    pub reverse_delay_total: Option<usize>,
}

impl RecordingOcr {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reversed(total: usize) -> Arc<Self> {
        Arc::new(Self {
            reverse_delay_total: Some(total),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn line_for(page_num: usize) -> String {
        format!("ಕನ್ನಡ ಪುಟ {page_num}")
    }
}

#[async_trait]
impl OcrClient for RecordingOcr {
    fn name(&self) -> &str {
        "recording"
    }

    async fn recognize(&self, page_num: usize, png: &[u8]) -> Result<String, OcrError> {
        assert!(png.starts_with(b"\x89PNG"), "OCR input must be PNG");
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.pages_seen.lock() {
            seen.push(page_num);
        }
        if let Some(total) = self.reverse_delay_total {
            let wait = (total.saturating_sub(page_num) as u64) * 10;
            tokio::time::sleep(Duration::from_millis(wait)).await;
        }
        Ok(Self::line_for(page_num))
    }
}

/// Never answers within any sane deadline.
pub struct StalledOcr;

#[async_trait]
impl OcrClient for StalledOcr {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn recognize(&self, _page_num: usize, _png: &[u8]) -> Result<String, OcrError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(String::new())
    }
}

/// Fails one page with a permanent service error.
pub struct FailingOcr {
    pub fail_page: usize,
}

#[async_trait]
impl OcrClient for FailingOcr {
    fn name(&self) -> &str {
        "failing"
    }

    async fn recognize(&self, page_num: usize, _png: &[u8]) -> Result<String, OcrError> {
        if page_num == self.fail_page {
            Err(OcrError::Service {
                status: 400,
                message: "bad image".into(),
            })
        } else {
            Ok(RecordingOcr::line_for(page_num))
        }
    }
}

/// Panics on the first call it receives, then behaves like [`RecordingOcr`].
#[derive(Default)]
pub struct PanicOnceOcr {
    pub panicked: AtomicBool,
}

impl PanicOnceOcr {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl OcrClient for PanicOnceOcr {
    fn name(&self) -> &str {
        "panic-once"
    }

    async fn recognize(&self, page_num: usize, _png: &[u8]) -> Result<String, OcrError> {
        if !self.panicked.swap(true, Ordering::SeqCst) {
            panic!("OCR engine crashed on page {page_num}");
        }
        Ok(RecordingOcr::line_for(page_num))
    }
}

// ── Converter wiring ─────────────────────────────────────────────────────────

/// A config whose workspaces land in `storage`.
pub fn config_in(storage: &Path) -> ConversionConfig {
    ConversionConfig::builder()
        .storage_dir(storage)
        .max_upload_bytes(1024 * 1024)
        .build()
        .unwrap()
}

pub fn converter(
    config: ConversionConfig,
    pdf: Arc<dyn PdfBackend>,
    ocr: Arc<dyn OcrClient>,
) -> Converter {
    Converter::new(config, pdf, ocr)
}

/// Number of entries left in a storage directory.
pub fn leftover_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}

// ── .docx inspection ─────────────────────────────────────────────────────────

static TEXT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"<w:t[^>]*>([^<]*)</w:t>").unwrap());

/// Read one part of a `.docx` package as a string.
pub fn docx_part(bytes: &[u8], name: &str) -> String {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut part = archive.by_name(name).unwrap();
    let mut xml = String::new();
    part.read_to_string(&mut xml).unwrap();
    xml
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Non-empty paragraph texts of `word/document.xml`, in document order.
pub fn docx_lines(bytes: &[u8]) -> Vec<String> {
    let xml = docx_part(bytes, "word/document.xml");
    xml.split("</w:p>")
        .map(|p| {
            TEXT_RUN
                .captures_iter(p)
                .map(|c| unescape(&c[1]))
                .collect::<String>()
        })
        .filter(|line| !line.is_empty())
        .collect()
}
