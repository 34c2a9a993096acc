//! Artifact assembly: turn per-page text into a `.docx` or `.txt` file.

use super::docx::{write_docx, DocxOptions};
use crate::config::{ConversionConfig, PageSeparator};
use crate::error::ConversionError;
use crate::output::RecognizedText;
use crate::request::OutputFormat;
use tracing::debug;

/// Stem used when the upload name has nothing usable left after sanitising.
pub const FALLBACK_STEM: &str = "converted";

/// An assembled artifact, held in memory until delivered.
#[derive(Debug, Clone)]
pub struct BuiltArtifact {
    pub bytes: Vec<u8>,
    pub filename: String,
}

/// Document properties carried from the request into the artifact.
#[derive(Debug, Clone, Default)]
pub struct DocumentProperties {
    pub title: Option<String>,
    pub author: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    font_family: String,
    font_size_pt: u32,
    separator: PageSeparator,
}

impl DocumentBuilder {
    pub fn new(config: &ConversionConfig) -> Self {
        Self {
            font_family: config.font_family.clone(),
            font_size_pt: config.font_size_pt,
            separator: config.page_separator.clone(),
        }
    }

    pub fn build(
        &self,
        text: &RecognizedText,
        format: OutputFormat,
        source_filename: &str,
        properties: DocumentProperties,
    ) -> Result<BuiltArtifact, ConversionError> {
        let bytes = match format {
            OutputFormat::Text => render_text(text, &self.separator).into_bytes(),
            OutputFormat::Docx => write_docx(
                text,
                &DocxOptions {
                    font_family: self.font_family.clone(),
                    font_size_pt: self.font_size_pt,
                    title: properties.title,
                    author: properties.author,
                },
            )?,
        };
        let filename = artifact_filename(source_filename, format);
        debug!("Built {} ({} bytes)", filename, bytes.len());
        Ok(BuiltArtifact { bytes, filename })
    }
}

/// Join pages with `separator` and end with exactly one newline.
pub fn render_text(text: &RecognizedText, separator: &PageSeparator) -> String {
    let mut out = String::with_capacity(text.total_chars() + text.len() * 4);
    for (i, page) in text.pages().iter().enumerate() {
        if i > 0 {
            out.push_str(&separator.render(page.page_num));
        }
        out.push_str(&page.text);
    }
    let trimmed_len = out.trim_end_matches('\n').len();
    out.truncate(trimmed_len);
    out.push('\n');
    out
}

/// Download name for the artifact: the upload's stem, stripped of path
/// components and characters that are unsafe in filenames, plus the
/// format's extension.
pub fn artifact_filename(source: &str, format: OutputFormat) -> String {
    format!("{}.{}", sanitize_stem(source), format.extension())
}

fn sanitize_stem(source: &str) -> String {
    let base = source.rsplit(['/', '\\']).next().unwrap_or(source);
    let stem = match base.rfind('.') {
        Some(idx) => &base[..idx],
        None => base,
    };
    let cleaned: String = stem
        .chars()
        .filter(|&c| !c.is_control() && !matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .collect();
    let cleaned = cleaned.trim().trim_matches('.').trim();
    if cleaned.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        cleaned.to_string()
    }
}
