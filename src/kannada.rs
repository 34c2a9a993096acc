//! Kannada script helpers.
//!
//! * Script detection ([`is_kannada_char`], [`kannada_ratio`], [`is_kannada_text`]).
//! * Unicode cleanup ([`normalize_unicode`]): NFC plus removal of stray Latin
//!   combining marks that OCR engines attach to Kannada glyphs.
//! * Legacy font repair ([`detect_legacy_encoding`], [`convert_legacy_to_unicode`]):
//!   PDFs typeset with Nudi/Baraha/KGP-era fonts store Kannada as Latin-1
//!   glyph codes (`ªÀ£ÀPÀ` …). Their text layer extracts as mojibake; the
//!   mapping table below turns the common sequences back into Unicode.
//! * Quality check ([`validate_kannada_output`]).

use once_cell::sync::Lazy;
use unicode_normalization::UnicodeNormalization;

/// Kannada block.
const KANNADA_BLOCK: std::ops::RangeInclusive<u32> = 0x0C80..=0x0CFF;

/// ZWNJ and ZWJ. They control conjunct formation in Kannada and count as
/// script characters.
const JOINERS: std::ops::RangeInclusive<u32> = 0x200C..=0x200D;

/// Share of script characters above which text counts as Kannada.
const KANNADA_THRESHOLD: f64 = 0.3;

pub fn is_kannada_char(c: char) -> bool {
    let cp = c as u32;
    KANNADA_BLOCK.contains(&cp) || JOINERS.contains(&cp)
}

/// Letters outside the Kannada block that still count as "in script"
/// for word-level checks (digits, basic punctuation).
fn is_neutral(c: char) -> bool {
    c.is_whitespace() || matches!(c, '.' | ',' | '!' | '?' | ';' | ':')
}

/// Fraction of non-space, non-punctuation characters that are Kannada.
pub fn kannada_ratio(text: &str) -> f64 {
    let mut total = 0usize;
    let mut kannada = 0usize;
    for c in text.chars().filter(|c| !is_neutral(*c)) {
        total += 1;
        if is_kannada_char(c) {
            kannada += 1;
        }
    }
    if total == 0 {
        0.0
    } else {
        kannada as f64 / total as f64
    }
}

/// Whether more than 30% of the meaningful characters are Kannada.
pub fn is_kannada_text(text: &str) -> bool {
    !text.trim().is_empty() && kannada_ratio(text) > KANNADA_THRESHOLD
}

/// Whitespace-separated words made only of Kannada characters.
pub fn count_kannada_words(text: &str) -> usize {
    text.split_whitespace()
        .filter(|w| w.chars().all(is_kannada_char))
        .count()
}

fn is_stray_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x1DC0..=0x1DFF)
}

/// NFC-normalise and drop combining diacritics that do not belong to the
/// Kannada script.
pub fn normalize_unicode(text: &str) -> String {
    text.nfc().filter(|c| !is_stray_combining_mark(*c)).collect()
}

// ── Legacy encodings ─────────────────────────────────────────────────────

/// Legacy glyph-code sequences and their Unicode equivalents.
const LEGACY_TO_UNICODE: &[(&str, &str)] = &[
    // Vowels
    ("AiÀÄ", "ಆ"),
    ("ªÀ", "ಅ"),
    ("EgÀ", "ಇ"),
    ("EgÀÄ", "ಈ"),
    ("GvÀÛ", "ಉ"),
    ("GvÀÛÄ", "ಊ"),
    ("F", "ಎ"),
    ("¥À", "ಏ"),
    ("AiÉÆ", "ಐ"),
    ("AiÀiÁ", "ಒ"),
    ("AiÀiÁÄ", "ಓ"),
    ("AiÀiï", "ಔ"),
    // Consonants
    ("£À", "ನ"),
    ("PÀ", "ಡ"),
    ("gÀ", "ಗ"),
    ("µÀ", "ಮ"),
    ("zÀ", "ಜ"),
    ("dÄ", "ತ"),
    ("¸À", "ಸ"),
    ("¨sÀ", "ಹ"),
    ("®", "ಕ"),
    ("C", "ಚ"),
    ("r", "ರ"),
    ("¯À", "ಪ"),
    ("§", "ಲ"),
    ("ªÀiÁ", "ಯ"),
    ("ªÀÄ", "ವ"),
    ("²", "ಬ"),
    ("¢", "ಖ"),
    // Vowel signs
    ("À", "ಾ"),
    ("Ä", "ೀ"),
    ("Æ", "ು"),
    ("Ã", "ೂ"),
    ("É", "ೆ"),
    ("Ê", "ೇ"),
    ("Ë", "ೈ"),
    ("Ì", "ೊ"),
    ("Í", "ೋ"),
    ("Î", "ೌ"),
    ("Ï", "್"),
    // Residue left next to already-converted signs
    ("ಾÛ", "ಾ"),
    ("ೀÛ", "ೀ"),
    ("ೀß", "ೀ"),
    ("ೆU", "ೆ"),
    ("ೆV", "ೆ"),
    ("ೂ¹", "ೂ"),
    ("ಾ½", "ಾ"),
    ("ಜÝ", "ಜ್ಞ"),
];

/// [`LEGACY_TO_UNICODE`] ordered longest pattern first, so `AiÀÄ` wins over
/// `À`. Ties keep table order.
static LEGACY_SORTED: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    let mut table = LEGACY_TO_UNICODE.to_vec();
    table.sort_by_key(|(legacy, _)| std::cmp::Reverse(legacy.chars().count()));
    table
});

/// Sequences that practically only occur in legacy-encoded Kannada.
const LEGACY_INDICATORS: &[&str] = &["AiÀÄ", "ªÀ", "£À", "PÀ", "gÀ", "µÀ", "Á", "À", "Ä"];

/// Whether `text` looks like legacy font-encoded Kannada.
///
/// Requires at least two legacy indicator hits and that the text is not
/// already Kannada by script ratio, so ordinary Latin text with an accented
/// capital is not misdetected.
pub fn detect_legacy_encoding(text: &str) -> bool {
    if text.trim().is_empty() || is_kannada_text(text) {
        return false;
    }
    let hits: usize = LEGACY_INDICATORS
        .iter()
        .map(|ind| text.matches(ind).count())
        .sum();
    hits >= 2
}

/// Replace legacy glyph sequences with Unicode Kannada, longest first.
pub fn convert_legacy_to_unicode(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    LEGACY_SORTED
        .iter()
        .fold(text.to_string(), |acc, (legacy, unicode)| {
            if acc.contains(legacy) {
                acc.replace(legacy, unicode)
            } else {
                acc
            }
        })
}

/// Problems found by [`validate_kannada_output`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KannadaIssue {
    Empty,
    NoKannada,
    /// Characters outside Kannada, ASCII, Latin-1 and common punctuation.
    Artifacts,
    ExcessivePunctuation,
    NotNormalized,
}

/// Heuristic quality check of recognised Kannada text. Empty result means
/// no issues.
pub fn validate_kannada_output(text: &str) -> Vec<KannadaIssue> {
    let mut issues = Vec::new();
    if text.trim().is_empty() {
        issues.push(KannadaIssue::Empty);
        return issues;
    }
    if !is_kannada_text(text) {
        issues.push(KannadaIssue::NoKannada);
    }
    if text.chars().any(is_artifact_char) {
        issues.push(KannadaIssue::Artifacts);
    }
    let total = text.chars().count();
    let punct = text
        .chars()
        .filter(|c| matches!(c, '.' | ',' | '!' | '?' | ';' | ':'))
        .count();
    if punct as f64 / total as f64 > 0.3 {
        issues.push(KannadaIssue::ExcessivePunctuation);
    }
    if !unicode_normalization::is_nfc(text) {
        issues.push(KannadaIssue::NotNormalized);
    }
    issues
}

/// Character outside Kannada, ASCII, Latin-1, general punctuation and whitespace.
pub(crate) fn is_artifact_char(c: char) -> bool {
    let cp = c as u32;
    !(is_kannada_char(c)
        || c.is_whitespace()
        || (0x20..=0x7E).contains(&cp)
        || (0xA0..=0xFF).contains(&cp)
        || (0x2010..=0x2027).contains(&cp))
}
