//! Text-layer analysis: does this PDF need OCR?
//!
//! Scanned PDFs often ship with an invisible text layer left behind by the
//! scanner's own OCR. That layer is usually garbage for Kannada, so "has a
//! text layer" is not enough to pick digital mode. The analyzer samples a
//! handful of pages, scores the quality of what it finds, and recommends a
//! [`ConversionMode`].
//!
//! ```text
//! score = 0.4  text is mostly Kannada
//!       + 0.2  more than 100 characters
//!       + 0.3  fewer than 10% artifacts
//!       + 0.1  more than 10 Kannada words
//! ```

use crate::kannada::{self, count_kannada_words, is_artifact_char, is_kannada_text};
use crate::output::DocumentMetadata;
use crate::request::ConversionMode;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

static LATIN_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{20,}").unwrap());

/// Creator/producer substrings that identify scanning software.
const SCANNER_SOFTWARE: &[&str] = &["scan", "camscanner", "genius scan", "adobe scan"];

const SAMPLE_TEXT_CHARS: usize = 200;

/// What kind of PDF this looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdfKind {
    /// Usable Kannada text layer.
    Digital,
    /// No text layer, or text on too few pages.
    Scanned,
    /// A text layer exists but is not trustworthy.
    Hybrid,
    /// No pages at all.
    Empty,
}

impl fmt::Display for PdfKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Digital => "digital",
            Self::Scanned => "scanned",
            Self::Hybrid => "hybrid",
            Self::Empty => "empty",
        })
    }
}

/// Result of [`TextLayerAnalyzer::analyze`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLayerAnalysis {
    pub kind: PdfKind,
    pub recommended_mode: ConversionMode,
    /// 0.0–1.0
    pub confidence: f64,
    /// 0.0–1.0, see module docs.
    pub quality_score: f64,
    pub has_text_layer: bool,
    pub kannada_detected: bool,
    pub total_pages: usize,
    /// 1-based page numbers that were examined.
    pub sampled_pages: Vec<usize>,
    /// Sampled pages with at least `min_text_length` characters.
    pub pages_with_text: usize,
    pub sample_text: String,
    pub notes: Vec<String>,
}

/// Thresholds for classification.
#[derive(Debug, Clone)]
pub struct TextLayerAnalyzer {
    pub min_quality: f64,
    pub min_text_length: usize,
    pub max_sample_pages: usize,
}

impl Default for TextLayerAnalyzer {
    fn default() -> Self {
        Self {
            min_quality: 0.3,
            min_text_length: 10,
            max_sample_pages: 5,
        }
    }
}

impl TextLayerAnalyzer {
    /// Classify a document from its metadata and per-page text layer.
    pub fn analyze(&self, metadata: &DocumentMetadata, page_texts: &[String]) -> TextLayerAnalysis {
        let total_pages = page_texts.len();
        let mut notes = scanner_notes(metadata);

        if total_pages == 0 {
            notes.push("Document has no pages".to_string());
            return TextLayerAnalysis {
                kind: PdfKind::Empty,
                recommended_mode: ConversionMode::Digital,
                confidence: 1.0,
                quality_score: 0.0,
                has_text_layer: false,
                kannada_detected: false,
                total_pages,
                sampled_pages: Vec::new(),
                pages_with_text: 0,
                sample_text: String::new(),
                notes,
            };
        }

        let indices = sample_page_indices(total_pages, self.max_sample_pages);
        let sampled: Vec<&str> = indices.iter().map(|&i| page_texts[i].as_str()).collect();
        let has_text_layer = sampled.iter().any(|t| !t.trim().is_empty());
        let pages_with_text = sampled
            .iter()
            .filter(|t| t.trim().chars().count() >= self.min_text_length)
            .count();

        let combined = sampled.join("\n");
        let quality = score_text(&combined);
        notes.extend(quality.notes);

        let (kind, confidence, note) = if !has_text_layer {
            (PdfKind::Scanned, 0.9, "No text layer detected")
        } else if quality.score >= self.min_quality {
            if quality.kannada {
                (PdfKind::Digital, quality.score, "Good quality Kannada text layer")
            } else {
                (
                    PdfKind::Hybrid,
                    0.6,
                    "Text layer has no Kannada content, likely scanner OCR output",
                )
            }
        } else if (pages_with_text as f64 / indices.len() as f64) < 0.3 {
            (PdfKind::Scanned, 0.8, "Poor text coverage, likely scanned")
        } else {
            (
                PdfKind::Hybrid,
                0.7,
                "Poor quality text on most pages, likely scanned with a bad text layer",
            )
        };
        notes.push(note.to_string());

        let recommended_mode = match kind {
            PdfKind::Digital | PdfKind::Empty => ConversionMode::Digital,
            PdfKind::Scanned | PdfKind::Hybrid => ConversionMode::Scanned,
        };
        debug!(
            "Analysis: {} (quality {:.2}, confidence {:.2})",
            kind, quality.score, confidence
        );

        TextLayerAnalysis {
            kind,
            recommended_mode,
            confidence,
            quality_score: quality.score,
            has_text_layer,
            kannada_detected: quality.kannada,
            total_pages,
            sampled_pages: indices.iter().map(|i| i + 1).collect(),
            pages_with_text,
            sample_text: quality.sample,
            notes,
        }
    }
}

/// Spread `count` 0-based page indices over a document: first, last,
/// middle, then evenly spaced. Sorted, no duplicates.
pub fn sample_page_indices(total: usize, count: usize) -> Vec<usize> {
    if total <= count {
        return (0..total).collect();
    }
    let mut indices = Vec::with_capacity(count);
    for idx in [0, total - 1, total / 2].into_iter().take(count) {
        if !indices.contains(&idx) {
            indices.push(idx);
        }
    }
    let remaining = count.saturating_sub(indices.len());
    if remaining > 0 {
        let step = total / (remaining + 1);
        for i in 1..=remaining {
            let idx = i * step;
            if idx < total && !indices.contains(&idx) {
                indices.push(idx);
            }
        }
    }
    indices.sort_unstable();
    indices
}

struct TextQuality {
    score: f64,
    kannada: bool,
    sample: String,
    notes: Vec<String>,
}

fn score_text(text: &str) -> TextQuality {
    if text.trim().is_empty() {
        return TextQuality {
            score: 0.0,
            kannada: false,
            sample: String::new(),
            notes: vec!["No text extracted".to_string()],
        };
    }

    let normalized = kannada::normalize_unicode(text);
    let mut notes = Vec::new();
    let mut score = 0.0;

    let kannada = is_kannada_text(&normalized);
    if kannada {
        score += 0.4;
        notes.push("Kannada text detected".to_string());
    } else {
        notes.push("No Kannada text detected".to_string());
    }

    let length = normalized.trim().chars().count();
    if length > 100 {
        score += 0.2;
    }

    let ratio = artifact_count(&normalized) as f64 / length.max(1) as f64;
    if ratio < 0.1 {
        score += 0.3;
    } else {
        notes.push(format!("High artifact ratio: {:.2}", ratio));
    }

    let words = count_kannada_words(&normalized);
    if words > 10 {
        score += 0.1;
        notes.push(format!("Found {} Kannada words", words));
    }

    TextQuality {
        score: f64::min(score, 1.0),
        kannada,
        sample: normalized.trim().chars().take(SAMPLE_TEXT_CHARS).collect(),
        notes,
    }
}

/// Stray symbols, long runs of one character, symbol-only lines and long
/// Latin runs. Each occurrence counts once.
fn artifact_count(text: &str) -> usize {
    let stray = text.chars().filter(|&c| is_artifact_char(c)).count();
    let symbol_lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && l.chars().all(|c| !c.is_alphanumeric() && !c.is_whitespace()))
        .count();
    stray + repeated_runs(text, 5) + symbol_lines + LATIN_RUN.find_iter(text).count()
}

/// Runs of `min` or more identical alphanumeric characters.
fn repeated_runs(text: &str, min: usize) -> usize {
    let mut runs = 0;
    let mut prev = None;
    let mut len = 0;
    for c in text.chars() {
        if Some(c) == prev {
            len += 1;
        } else {
            prev = Some(c);
            len = 1;
        }
        if len == min && c.is_alphanumeric() {
            runs += 1;
        }
    }
    runs
}

fn scanner_notes(metadata: &DocumentMetadata) -> Vec<String> {
    [&metadata.creator, &metadata.producer]
        .into_iter()
        .flatten()
        .find(|v| {
            let lower = v.to_lowercase();
            SCANNER_SOFTWARE.iter().any(|s| lower.contains(s))
        })
        .map(|v| vec![format!("Scanner software detected: {}", v)])
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    const KANNADA_PAGE: &str = "ಕನ್ನಡ ಭಾರತದ ದ್ರಾವಿಡ ಭಾಷೆಗಳಲ್ಲಿ ಒಂದು. ಕರ್ನಾಟಕ ರಾಜ್ಯದ ಆಡಳಿತ ಭಾಷೆ ಕನ್ನಡ. \
        ಕನ್ನಡ ಸಾಹಿತ್ಯಕ್ಕೆ ಎಂಟು ಜ್ಞಾನಪೀಠ ಪ್ರಶಸ್ತಿಗಳು ದೊರೆತಿವೆ. ಕನ್ನಡ ಲಿಪಿ ಕದಂಬ ಲಿಪಿಯಿಂದ ಬೆಳೆದಿದೆ.";

    fn meta() -> DocumentMetadata {
        DocumentMetadata::default()
    }

    fn texts(pages: &[&str]) -> Vec<String> {
        pages.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn sampling_small_documents_takes_every_page() {
        assert_eq!(sample_page_indices(3, 5), vec![0, 1, 2]);
        assert_eq!(sample_page_indices(0, 5), Vec::<usize>::new());
    }

    #[test]
    fn sampling_spreads_over_large_documents() {
        assert_eq!(sample_page_indices(100, 5), vec![0, 33, 50, 66, 99]);
        assert_eq!(sample_page_indices(10, 2), vec![0, 9]);
    }

    #[test]
    fn good_kannada_layer_is_digital() {
        let analysis = TextLayerAnalyzer::default().analyze(&meta(), &texts(&[KANNADA_PAGE, KANNADA_PAGE]));
        assert_eq!(analysis.kind, PdfKind::Digital);
        assert_eq!(analysis.recommended_mode, ConversionMode::Digital);
        assert!(analysis.kannada_detected);
        assert!((analysis.quality_score - 1.0).abs() < 1e-9);
        assert_eq!(analysis.pages_with_text, 2);
        assert!(analysis.sample_text.starts_with("ಕನ್ನಡ"));
    }

    #[test]
    fn no_text_layer_is_scanned() {
        let analysis = TextLayerAnalyzer::default().analyze(&meta(), &texts(&["", " \n", ""]));
        assert_eq!(analysis.kind, PdfKind::Scanned);
        assert_eq!(analysis.recommended_mode, ConversionMode::Scanned);
        assert!(!analysis.has_text_layer);
        assert!((analysis.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn latin_only_layer_is_hybrid() {
        let english = "This page came out of a scanner and its hidden text layer holds \
                       only English words that were guessed by the scanner firmware.";
        let analysis = TextLayerAnalyzer::default().analyze(&meta(), &texts(&[english]));
        assert_eq!(analysis.kind, PdfKind::Hybrid);
        assert_eq!(analysis.recommended_mode, ConversionMode::Scanned);
        assert!(!analysis.kannada_detected);
    }

    #[test]
    fn garbage_layer_is_not_digital() {
        let garbage = "□□□□ ▯▯▯▯ ◊◊◊◊ ■■■■■\n§§§§§§§§§§§§";
        let analysis = TextLayerAnalyzer::default().analyze(&meta(), &texts(&[garbage, garbage]));
        assert!(analysis.quality_score < 0.3);
        assert_eq!(analysis.kind, PdfKind::Hybrid);
        assert!(analysis.notes.iter().any(|n| n.contains("artifact")));
    }

    #[test]
    fn sparse_text_is_scanned() {
        let mut pages = vec![String::new(); 10];
        pages[0] = "□□".to_string();
        let analysis = TextLayerAnalyzer::default().analyze(&meta(), &pages);
        assert_eq!(analysis.kind, PdfKind::Scanned);
        assert!((analysis.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn empty_document() {
        let analysis = TextLayerAnalyzer::default().analyze(&meta(), &[]);
        assert_eq!(analysis.kind, PdfKind::Empty);
        assert!(analysis.sampled_pages.is_empty());
    }

    #[test]
    fn scanner_software_is_noted() {
        let metadata = DocumentMetadata {
            producer: Some("CamScanner 6.2".into()),
            ..DocumentMetadata::default()
        };
        let analysis = TextLayerAnalyzer::default().analyze(&metadata, &texts(&[KANNADA_PAGE]));
        assert!(analysis.notes.iter().any(|n| n == "Scanner software detected: CamScanner 6.2"));
    }

    #[test]
    fn repeated_runs_count_once_per_run() {
        assert_eq!(repeated_runs("aaaaaaaa bbbbb cccc", 5), 2);
        assert_eq!(repeated_runs("     ", 5), 0);
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&PdfKind::Hybrid).unwrap(), "\"hybrid\"");
    }
}
