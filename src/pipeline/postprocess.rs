//! Post-processing: deterministic cleanup of extracted and recognised text.
//!
//! Text-layer extraction and OCR both produce quirks that are not content:
//! `\r\n` line endings from pdfium, zero-width spaces and BOMs from OCR,
//! trailing blanks, runs of empty lines, decomposed vowel signs, and in old
//! PDFs Kannada stored in legacy glyph encodings. Each rule below is a pure
//! `&str → String` pass with its own test.
//!
//! ZWNJ (U+200C) and ZWJ (U+200D) are deliberately *not* stripped: in
//! Kannada they select between a conjunct and an explicit virama form.

use crate::kannada;
use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all post-processing rules to one page of text.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF / CR → LF)
/// 2. Strip control characters other than `\n` and `\t`
/// 3. Strip invisible Unicode (ZWSP, BOM, soft hyphen, word joiner)
/// 4. Convert legacy font-encoded Kannada (only when `legacy_font_fix` is
///    set and legacy sequences are detected)
/// 5. Unicode NFC and removal of stray Latin combining marks
/// 6. Trim trailing whitespace per line
/// 7. Collapse 3+ consecutive newlines to one blank line
/// 8. Trim leading and trailing blank lines
pub fn clean_text(input: &str, legacy_font_fix: bool) -> String {
    let s = normalise_line_endings(input);
    let s = remove_control_chars(&s);
    let s = remove_invisible_chars(&s);
    let s = if legacy_font_fix {
        repair_legacy_encoding(&s)
    } else {
        s
    };
    let s = kannada::normalize_unicode(&s);
    let s = trim_trailing_whitespace(&s);
    let s = collapse_blank_lines(&s);
    trim_blank_edges(&s)
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Strip control characters ─────────────────────────────────────────

/// C0/C1 controls are illegal in XML 1.0 and meaningless in plain text.
fn remove_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect()
}

// ── Rule 3: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200B}' | '\u{FEFF}' | '\u{00AD}' | '\u{2060}'))
        .collect()
}

// ── Rule 4: Legacy encodings ─────────────────────────────────────────────────

fn repair_legacy_encoding(input: &str) -> String {
    if kannada::detect_legacy_encoding(input) {
        tracing::debug!("Legacy Kannada encoding detected; converting to Unicode");
        kannada::convert_legacy_to_unicode(input)
    } else {
        input.to_string()
    }
}

// ── Rule 6: Trim trailing whitespace per line ────────────────────────────────

fn trim_trailing_whitespace(input: &str) -> String {
    input
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ── Rule 7: Collapse excessive blank lines ───────────────────────────────────

static RE_BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

fn collapse_blank_lines(input: &str) -> String {
    RE_BLANK_LINES.replace_all(input, "\n\n").to_string()
}

// ── Rule 8: Trim leading/trailing blank lines ────────────────────────────────

fn trim_blank_edges(input: &str) -> String {
    input.trim_matches('\n').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_endings() {
        assert_eq!(normalise_line_endings("a\r\nb\rc"), "a\nb\nc");
    }

    #[test]
    fn test_control_chars_removed() {
        assert_eq!(remove_control_chars("ಕ\u{0002}ನ\tx\n\u{007F}"), "ಕನ\tx\n");
    }

    #[test]
    fn test_invisible_chars_removed_but_joiners_kept() {
        let input = "\u{FEFF}ಕ\u{200B}ನ್\u{200C}ನ\u{200D}ಡ\u{00AD}\u{2060}";
        assert_eq!(remove_invisible_chars(input), "ಕನ್\u{200C}ನ\u{200D}ಡ");
    }

    #[test]
    fn test_trailing_whitespace() {
        assert_eq!(trim_trailing_whitespace("ಕನ್ನಡ   \nline\t"), "ಕನ್ನಡ\nline");
    }

    #[test]
    fn test_collapse_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn test_trim_blank_edges() {
        assert_eq!(trim_blank_edges("\n\nಪುಟ\n\n"), "ಪುಟ");
    }

    #[test]
    fn test_legacy_only_when_enabled() {
        assert_eq!(clean_text("ªÀ£ÀPÀAiÀÄ", true), "ಅನಡಆ");
        assert_eq!(clean_text("ªÀ£ÀPÀAiÀÄ", false), "ªÀ£ÀPÀAiÀÄ");
    }

    #[test]
    fn test_kannada_passes_unchanged() {
        assert_eq!(clean_text("ಕನ್ನಡ", false), "ಕನ್ನಡ");
        assert_eq!(clean_text("ಕನ್ನಡ", true), "ಕನ್ನಡ");
    }

    #[test]
    fn test_full_pipeline() {
        let raw = "\u{FEFF}ಕನ್ನಡ ಸಾಹಿತ್ಯ  \r\n\r\n\r\n\r\nಎರಡನೇ ಸಾಲು\r\n";
        assert_eq!(clean_text(raw, false), "ಕನ್ನಡ ಸಾಹಿತ್ಯ\n\nಎರಡನೇ ಸಾಲು");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(clean_text("", false), "");
        assert_eq!(clean_text(" \r\n \n", false), "");
    }
}
