//! Output types: per-page text, the finished artifact, and run statistics.

use crate::request::OutputFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a page's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextOrigin {
    /// The PDF's embedded text layer.
    Embedded,
    /// OCR of the rasterised page.
    Ocr,
}

/// Text of one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageText {
    /// 1-indexed page number.
    pub page_num: usize,
    pub text: String,
    pub origin: TextOrigin,
}

/// Per-page text for a whole document, in PDF page order.
///
/// Construction goes through [`RecognizedText::from_ordered`] or
/// [`RecognizedText::from_indexed`], both of which guarantee entry `i` holds
/// page `i + 1`: nothing reordered, nothing dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognizedText {
    pages: Vec<PageText>,
}

impl RecognizedText {
    /// Wrap page strings that are already in page order.
    pub fn from_ordered(pages: Vec<String>, origin: TextOrigin) -> Self {
        Self {
            pages: pages
                .into_iter()
                .enumerate()
                .map(|(i, text)| PageText {
                    page_num: i + 1,
                    text,
                    origin,
                })
                .collect(),
        }
    }

    /// Build from `(0-based page index, text)` pairs arriving in any order.
    ///
    /// Returns `None` unless the indices are exactly `0..expected`, each once.
    pub fn from_indexed(
        mut pages: Vec<(usize, String)>,
        expected: usize,
        origin: TextOrigin,
    ) -> Option<Self> {
        pages.sort_by_key(|(idx, _)| *idx);
        if pages.len() != expected || pages.iter().enumerate().any(|(i, (idx, _))| i != *idx) {
            return None;
        }
        Some(Self::from_ordered(
            pages.into_iter().map(|(_, text)| text).collect(),
            origin,
        ))
    }

    pub fn pages(&self) -> &[PageText] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Whether at least one page has non-whitespace text.
    pub fn has_content(&self) -> bool {
        self.pages.iter().any(|p| !p.text.trim().is_empty())
    }

    pub fn total_chars(&self) -> usize {
        self.pages.iter().map(|p| p.text.chars().count()).sum()
    }

    /// Rewrite every page's text in place, keeping order and page numbers.
    pub fn map_text(mut self, f: impl Fn(&str) -> String) -> Self {
        for page in &mut self.pages {
            page.text = f(&page.text);
        }
        self
    }
}

/// Stages a conversion moves through. Any stage can end in failure, which
/// is reported as the `Err` of [`crate::Converter::convert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionStage {
    Received,
    Validated,
    /// Digital mode: text layer read.
    Extracted,
    /// Scanned mode: every page recognised.
    Recognized,
    Built,
    Delivered,
}

impl ConversionStage {
    /// Whether `next` is a legal successor of `self`.
    pub fn can_advance_to(self, next: ConversionStage) -> bool {
        use ConversionStage::*;
        matches!(
            (self, next),
            (Received, Validated)
                | (Validated, Extracted)
                | (Validated, Recognized)
                | (Extracted, Built)
                | (Recognized, Built)
                | (Built, Delivered)
        )
    }
}

impl fmt::Display for ConversionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::Validated => "validated",
            Self::Extracted => "extracted",
            Self::Recognized => "recognized",
            Self::Built => "built",
            Self::Delivered => "delivered",
        };
        f.write_str(s)
    }
}

/// PDF document metadata (pdfium info dictionary).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub creation_date: Option<String>,
    pub modification_date: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Statistics for one conversion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversionStats {
    pub total_pages: usize,
    /// Pages with at least one non-whitespace character.
    pub pages_with_text: usize,
    /// OCR requests issued, retries included. Zero in digital mode.
    pub ocr_calls: usize,
    pub total_chars: usize,
    pub artifact_bytes: usize,
    pub total_duration_ms: u64,
    /// Time spent producing text (extraction or rasterise + OCR).
    pub text_duration_ms: u64,
    pub build_duration_ms: u64,
    pub stages: Vec<ConversionStage>,
}

/// A finished conversion: the artifact and how it was made.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConversionResult {
    #[serde(skip)]
    pub artifact_bytes: Vec<u8>,
    pub artifact_filename: String,
    pub format: OutputFormat,
    pub metadata: DocumentMetadata,
    pub stats: ConversionStats,
}

impl ConversionResult {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

impl fmt::Debug for ConversionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionResult")
            .field("artifact_filename", &self.artifact_filename)
            .field("format", &self.format)
            .field("artifact_len", &self.artifact_bytes.len())
            .field("stats", &self.stats)
            .finish()
    }
}
