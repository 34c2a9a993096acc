//! Request types: the uploaded file and what to do with it.

use crate::error::{ConversionError, UploadRejection};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A file exactly as it arrived: raw bytes plus the client's claims about it.
///
/// Nothing here is trusted until [`crate::pipeline::validate::validate_upload`]
/// has looked at it.
#[derive(Clone)]
pub struct UploadedFile {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

impl UploadedFile {
    pub fn new(
        bytes: impl Into<Vec<u8>>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
            content_type: content_type.into(),
        }
    }

    /// Read a local file, declaring `application/pdf` when the extension
    /// says so and `application/octet-stream` otherwise.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ConversionError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            ConversionError::InvalidUpload(UploadRejection::Unreadable(format!(
                "{}: {e}",
                path.display()
            )))
        })?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let content_type = if has_pdf_extension(&filename) {
            "application/pdf"
        } else {
            "application/octet-stream"
        };
        Ok(Self::new(bytes, filename, content_type))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for UploadedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadedFile")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

pub(crate) fn has_pdf_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// How text is obtained from the PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversionMode {
    /// Read the embedded text layer. (default)
    #[default]
    Digital,
    /// Rasterise every page and send it to OCR.
    Scanned,
}

impl FromStr for ConversionMode {
    type Err = UploadRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "digital" => Ok(Self::Digital),
            "scanned" | "ocr" => Ok(Self::Scanned),
            _ => Err(UploadRejection::InvalidField {
                field: "mode".into(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ConversionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Digital => f.write_str("digital"),
            Self::Scanned => f.write_str("scanned"),
        }
    }
}

/// Artifact format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Office Open XML word-processing document. (default)
    #[default]
    Docx,
    /// UTF-8 plain text.
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Docx => "docx",
            Self::Text => "txt",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Self::Text => "text/plain; charset=utf-8",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = UploadRejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docx" | "word" => Ok(Self::Docx),
            "text" | "txt" => Ok(Self::Text),
            _ => Err(UploadRejection::InvalidField {
                field: "format".into(),
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// One conversion job. Built once, then handed to
/// [`crate::Converter::convert`] by value.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub file: UploadedFile,
    pub mode: ConversionMode,
    pub output_format: OutputFormat,
    /// Document title written into `.docx` core properties. Defaults to the
    /// upload's file stem.
    pub title: Option<String>,
    pub author: Option<String>,
    /// User password for encrypted PDFs.
    pub password: Option<String>,
}

impl ConversionRequest {
    pub fn new(file: UploadedFile, mode: ConversionMode, output_format: OutputFormat) -> Self {
        Self {
            file,
            mode,
            output_format,
            title: None,
            author: None,
            password: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}
