//! Configuration types for PDF-to-Word conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`] or read from the environment with
//! [`ConversionConfig::from_env`]. OCR-engine settings live in the nested
//! [`OcrSettings`]; the credentials they point at are loaded once, when the
//! OCR client is constructed, never inside the pipeline.

use crate::error::ConversionError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable naming the OCR credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Default Kannada-capable font declared in generated `.docx` files.
pub const DEFAULT_FONT_FAMILY: &str = "Noto Sans Kannada";

/// Configuration for a PDF-to-Word conversion.
///
/// # Example
/// ```rust
/// use kannada_pdf2word::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .dpi(300)
///     .max_upload_bytes(20 * 1024 * 1024)
///     .ocr_timeout_secs(45)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Largest accepted upload in bytes. Default: 50 MiB.
    pub max_upload_bytes: usize,

    /// Directory under which per-request workspaces are created. Default:
    /// the system temp directory.
    ///
    /// Each conversion gets its own subdirectory here (staged upload copy,
    /// rasterised pages). The subdirectory is removed when the conversion
    /// ends, successfully or not.
    pub storage_dir: PathBuf,

    /// Directory the CLI writes finished artifacts into when no explicit
    /// output path is given. Default: `./converted`.
    pub output_dir: PathBuf,

    /// Rendering DPI used when rasterising scanned pages. Range: 72–600. Default: 200.
    pub dpi: u32,

    /// Maximum rendered image dimension in pixels. Default: 4000.
    ///
    /// Caps either dimension of the pdfium render, scaling the other
    /// proportionally, so an oversized page cannot exhaust memory.
    pub max_rendered_pixels: u32,

    /// Longest edge, in pixels, of the image sent to OCR. Default: 2500.
    ///
    /// Larger renders are downscaled (and always converted to grayscale)
    /// before encoding.
    pub ocr_max_edge: u32,

    /// Clean-up applied to page images before OCR. Default: off.
    pub ocr_cleanup: ImageCleanup,

    /// OCR engine settings.
    pub ocr: OcrSettings,

    /// Font family declared for every run in generated `.docx` files.
    /// Default: [`DEFAULT_FONT_FAMILY`].
    pub font_family: String,

    /// Body text size in points. Default: 12.
    pub font_size_pt: u32,

    /// Separator between pages in `.txt` output.
    pub page_separator: PageSeparator,

    /// Convert legacy (Nudi/Baraha-style) font-encoded Kannada to Unicode
    /// when legacy byte sequences are detected. Default: false.
    pub legacy_font_fix: bool,

    /// Receives stage and per-page events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: 50 * 1024 * 1024,
            storage_dir: std::env::temp_dir(),
            output_dir: PathBuf::from("converted"),
            dpi: 200,
            max_rendered_pixels: 4000,
            ocr_max_edge: 2500,
            ocr_cleanup: ImageCleanup::default(),
            ocr: OcrSettings::default(),
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            font_size_pt: 12,
            page_separator: PageSeparator::default(),
            legacy_font_fix: false,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("storage_dir", &self.storage_dir)
            .field("output_dir", &self.output_dir)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("ocr_max_edge", &self.ocr_max_edge)
            .field("ocr_cleanup", &self.ocr_cleanup)
            .field("ocr", &self.ocr)
            .field("font_family", &self.font_family)
            .field("font_size_pt", &self.font_size_pt)
            .field("page_separator", &self.page_separator)
            .field("legacy_font_fix", &self.legacy_font_fix)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read configuration from `PDF2WORD_*` environment variables, falling
    /// back to defaults for anything unset.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `PDF2WORD_MAX_UPLOAD_BYTES` | `max_upload_bytes` |
    /// | `PDF2WORD_STORAGE_DIR` | `storage_dir` |
    /// | `PDF2WORD_OUTPUT_DIR` | `output_dir` |
    /// | `PDF2WORD_DPI` | `dpi` |
    /// | `PDF2WORD_FONT` | `font_family` |
    /// | `PDF2WORD_LEGACY_FONT_FIX` | `legacy_font_fix` |
    /// | `PDF2WORD_OCR_ENGINE` | `ocr.engine` (`vision` / `tesseract`) |
    /// | `PDF2WORD_OCR_TIMEOUT_SECS` | `ocr.timeout_secs` |
    /// | `PDF2WORD_OCR_RETRIES` | `ocr.max_retries` |
    /// | `PDF2WORD_OCR_CONCURRENCY` | `ocr.concurrency` |
    /// | `PDF2WORD_OCR_FALLBACK` | `ocr.fallback_engine` |
    /// | `PDF2WORD_OCR_PRIMARY_PAGE_LIMIT` | `ocr.primary_page_limit` |
    /// | `PDF2WORD_OCR_CLEANUP` | `ocr_cleanup` (`off` / `standard` / `otsu`) |
    /// | `GOOGLE_APPLICATION_CREDENTIALS` | `ocr.credentials_path` |
    pub fn from_env() -> Result<Self, ConversionError> {
        let mut b = Self::builder();
        if let Some(v) = env_parse::<usize>("PDF2WORD_MAX_UPLOAD_BYTES")? {
            b = b.max_upload_bytes(v);
        }
        if let Some(v) = env_string("PDF2WORD_STORAGE_DIR") {
            b = b.storage_dir(v);
        }
        if let Some(v) = env_string("PDF2WORD_OUTPUT_DIR") {
            b = b.output_dir(v);
        }
        if let Some(v) = env_parse::<u32>("PDF2WORD_DPI")? {
            b = b.dpi(v);
        }
        if let Some(v) = env_string("PDF2WORD_FONT") {
            b = b.font_family(v);
        }
        if let Some(v) = env_parse::<bool>("PDF2WORD_LEGACY_FONT_FIX")? {
            b = b.legacy_font_fix(v);
        }
        if let Some(v) = env_parse::<OcrEngine>("PDF2WORD_OCR_ENGINE")? {
            b = b.ocr_engine(v);
        }
        if let Some(v) = env_parse::<u64>("PDF2WORD_OCR_TIMEOUT_SECS")? {
            b = b.ocr_timeout_secs(v);
        }
        if let Some(v) = env_parse::<u32>("PDF2WORD_OCR_RETRIES")? {
            b = b.ocr_max_retries(v);
        }
        if let Some(v) = env_parse::<usize>("PDF2WORD_OCR_CONCURRENCY")? {
            b = b.ocr_concurrency(v);
        }
        if let Some(v) = env_parse::<OcrEngine>("PDF2WORD_OCR_FALLBACK")? {
            b = b.ocr_fallback_engine(v);
        }
        if let Some(v) = env_parse::<usize>("PDF2WORD_OCR_PRIMARY_PAGE_LIMIT")? {
            b = b.ocr_primary_page_limit(v);
        }
        if let Some(v) = env_parse::<ImageCleanup>("PDF2WORD_OCR_CLEANUP")? {
            b = b.ocr_cleanup(v);
        }
        if let Some(v) = env_string(CREDENTIALS_ENV) {
            b = b.credentials_path(v);
        }
        b.build()
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>, ConversionError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env_string(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConversionError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn max_upload_bytes(mut self, bytes: usize) -> Self {
        self.config.max_upload_bytes = bytes;
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.storage_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn ocr_max_edge(mut self, px: u32) -> Self {
        self.config.ocr_max_edge = px.max(100);
        self
    }

    pub fn ocr_cleanup(mut self, cleanup: ImageCleanup) -> Self {
        self.config.ocr_cleanup = cleanup;
        self
    }

    pub fn ocr(mut self, settings: OcrSettings) -> Self {
        self.config.ocr = settings;
        self
    }

    pub fn ocr_engine(mut self, engine: OcrEngine) -> Self {
        self.config.ocr.engine = engine;
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ocr.credentials_path = Some(path.into());
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr.timeout_secs = secs;
        self
    }

    pub fn ocr_max_retries(mut self, n: u32) -> Self {
        self.config.ocr.max_retries = n;
        self
    }

    pub fn ocr_retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.ocr.retry_backoff_ms = ms;
        self
    }

    /// Second engine for pages the primary fails on or is not allowed to see.
    pub fn ocr_fallback_engine(mut self, engine: OcrEngine) -> Self {
        self.config.ocr.fallback_engine = Some(engine);
        self
    }

    /// Send only pages `1..=n` to the primary engine; later pages go to the
    /// fallback.
    pub fn ocr_primary_page_limit(mut self, n: usize) -> Self {
        self.config.ocr.primary_page_limit = Some(n);
        self
    }

    pub fn ocr_concurrency(mut self, n: usize) -> Self {
        self.config.ocr.concurrency = n.max(1);
        self
    }

    pub fn font_family(mut self, family: impl Into<String>) -> Self {
        self.config.font_family = family.into();
        self
    }

    pub fn font_size_pt(mut self, pt: u32) -> Self {
        self.config.font_size_pt = pt;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn legacy_font_fix(mut self, v: bool) -> Self {
        self.config.legacy_font_fix = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, ConversionError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 600 {
            return Err(ConversionError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if c.max_upload_bytes == 0 {
            return Err(ConversionError::InvalidConfig(
                "max_upload_bytes must be ≥ 1".into(),
            ));
        }
        if c.ocr.concurrency == 0 {
            return Err(ConversionError::InvalidConfig(
                "OCR concurrency must be ≥ 1".into(),
            ));
        }
        if c.ocr.timeout_secs == 0 {
            return Err(ConversionError::InvalidConfig(
                "OCR timeout must be ≥ 1 second".into(),
            ));
        }
        if c.ocr.fallback_engine == Some(c.ocr.engine) {
            return Err(ConversionError::InvalidConfig(format!(
                "OCR fallback engine must differ from the primary ({})",
                c.ocr.engine
            )));
        }
        if c.ocr.primary_page_limit.is_some() && c.ocr.fallback_engine.is_none() {
            return Err(ConversionError::InvalidConfig(
                "a primary page limit needs a fallback OCR engine".into(),
            ));
        }
        if let Binarization::Adaptive { block_radius: 0 } = c.ocr_cleanup.binarize {
            return Err(ConversionError::InvalidConfig(
                "adaptive threshold block radius must be ≥ 1".into(),
            ));
        }
        if c.font_family.trim().is_empty() {
            return Err(ConversionError::InvalidConfig(
                "font_family must not be empty".into(),
            ));
        }
        if !(6..=72).contains(&c.font_size_pt) {
            return Err(ConversionError::InvalidConfig(format!(
                "font size must be 6–72pt, got {}",
                c.font_size_pt
            )));
        }
        Ok(self.config)
    }
}

// ── OCR settings ─────────────────────────────────────────────────────────

/// Settings for the OCR engine used by scanned-mode conversions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OcrSettings {
    /// Which engine to call. Default: [`OcrEngine::GoogleVision`].
    pub engine: OcrEngine,

    /// Path of the credentials file for the remote engine. Usually taken
    /// from `GOOGLE_APPLICATION_CREDENTIALS`.
    pub credentials_path: Option<PathBuf>,

    /// Base endpoint of the Vision `images:annotate` API.
    pub endpoint: String,

    /// BCP-47 language hints for the remote engine. Default: `["kn", "en"]`.
    pub language_hints: Vec<String>,

    /// Tesseract language pack list. Default: `kan+eng`.
    pub tesseract_lang: String,

    /// Per-page, per-attempt deadline in seconds. Default: 30.
    pub timeout_secs: u64,

    /// Extra attempts after a transient failure. Default: 0.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled on every attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Pages recognised concurrently. Default: 4.
    pub concurrency: usize,

    /// Engine consulted when the primary fails on a page (timeouts
    /// included) or the page is past `primary_page_limit`. Default: none.
    #[serde(default)]
    pub fallback_engine: Option<OcrEngine>,

    /// Last page number (1-indexed) sent to the primary engine. Needs a
    /// `fallback_engine`. Default: no limit.
    #[serde(default)]
    pub primary_page_limit: Option<usize>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            engine: OcrEngine::default(),
            credentials_path: None,
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            language_hints: vec!["kn".to_string(), "en".to_string()],
            tesseract_lang: "kan+eng".to_string(),
            timeout_secs: 30,
            max_retries: 0,
            retry_backoff_ms: 500,
            concurrency: 4,
            fallback_engine: None,
            primary_page_limit: None,
        }
    }
}

/// OCR engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrEngine {
    /// Google Cloud Vision `DOCUMENT_TEXT_DETECTION` (default).
    #[default]
    #[serde(rename = "vision")]
    GoogleVision,
    /// Local `tesseract` binary with the `kan` language pack.
    Tesseract,
}

impl FromStr for OcrEngine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vision" | "google" | "google-vision" => Ok(Self::GoogleVision),
            "tesseract" => Ok(Self::Tesseract),
            other => Err(format!("unknown OCR engine '{other}' (expected vision or tesseract)")),
        }
    }
}

impl fmt::Display for OcrEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GoogleVision => f.write_str("vision"),
            Self::Tesseract => f.write_str("tesseract"),
        }
    }
}

// ── OCR image clean-up ───────────────────────────────────────────────────

/// Clean-up steps applied to a grayscale page image before it is encoded
/// for OCR, in this order: border trim, denoise, contrast, binarisation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageCleanup {
    /// Crop dark scanner edges (at most a tenth of each side).
    pub trim_border: bool,
    /// 3x3 median filter against speckle.
    pub denoise: bool,
    /// Histogram equalisation to lift faded ink.
    pub equalize: bool,
    pub binarize: Binarization,
}

impl ImageCleanup {
    /// Nothing but grayscale.
    pub fn off() -> Self {
        Self::default()
    }

    /// Uneven or yellowed scans: every step, locally adaptive threshold.
    pub fn standard() -> Self {
        Self {
            trim_border: true,
            denoise: true,
            equalize: true,
            binarize: Binarization::Adaptive { block_radius: 15 },
        }
    }

    /// Evenly lit scans: border trim, contrast, one global Otsu threshold.
    pub fn otsu() -> Self {
        Self {
            trim_border: true,
            denoise: false,
            equalize: true,
            binarize: Binarization::Otsu,
        }
    }

    pub fn is_off(&self) -> bool {
        *self == Self::off()
    }
}

impl FromStr for ImageCleanup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(Self::off()),
            "standard" => Ok(Self::standard()),
            "otsu" => Ok(Self::otsu()),
            other => Err(format!(
                "unknown clean-up profile '{other}' (expected off, standard or otsu)"
            )),
        }
    }
}

/// How a grayscale page is reduced to black and white.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Binarization {
    /// Keep gray levels.
    #[default]
    Off,
    /// One global threshold from Otsu's method.
    Otsu,
    /// Threshold against the mean of a `(2r+1)²` neighbourhood.
    Adaptive { block_radius: u32 },
}

// ── Page separator ───────────────────────────────────────────────────────

/// How to separate pages in assembled `.txt` output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// A blank line: "\n\n". (default)
    #[default]
    BlankLine,
    /// Form feed on its own line: "\n\x0C\n".
    FormFeed,
    /// Kannada page marker: "\n\n--- ಪುಟ N ---\n\n".
    Marker,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator placed before the given page (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::BlankLine => "\n\n".to_string(),
            PageSeparator::FormFeed => "\n\u{c}\n".to_string(),
            PageSeparator::Marker => format!("\n\n--- ಪುಟ {} ---\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}

impl FromStr for PageSeparator {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "blank" | "none" => Self::BlankLine,
            "formfeed" | "ff" => Self::FormFeed,
            "marker" | "page" => Self::Marker,
            other => Self::Custom(other.to_string()),
        })
    }
}
