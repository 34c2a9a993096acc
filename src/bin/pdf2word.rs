//! CLI binary for kannada-pdf2word.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ConversionConfig`, drives a progress bar and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use kannada_pdf2word::{
    ConversionConfig, ConversionMode, ConversionProgressCallback, ConversionRequest,
    ConversionResult, ConversionStage, Converter, ImageCleanup, OcrEngine, OutputFormat,
    PageSeparator, ProgressCallback, TextLayerAnalysis, UploadedFile,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const SPINNER_TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner through the early stages, then a
/// page bar once OCR starts. Pages may finish out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER_TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Checking upload…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER_TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Recognising");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Document has {total_pages} pages"))
        ));
    }

    fn on_stage(&self, stage: ConversionStage) {
        let msg = match stage {
            ConversionStage::Received => "Checking upload…",
            ConversionStage::Validated => "Reading PDF…",
            ConversionStage::Extracted | ConversionStage::Recognized => "Building document…",
            ConversionStage::Built => "Writing output…",
            ConversionStage::Delivered => "Done",
        };
        self.bar.set_message(msg);
    }

    fn on_page_start(&self, page_num: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.activate_bar(total);
        }
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, page_num: usize, total: usize, text_len: usize) {
        let elapsed = self.elapsed_secs(page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            page_num,
            total,
            dim(&format!("{text_len:>5} bytes")),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success: bool) {
        self.bar.finish_and_clear();
        if success {
            eprintln!(
                "{} {} pages converted",
                green("✔"),
                bold(&total_pages.to_string())
            );
        } else {
            let failed = self.errors.load(Ordering::SeqCst);
            if failed > 0 {
                eprintln!("{} conversion failed ({} page errors)", red("✘"), failed);
            } else {
                eprintln!("{} conversion failed", red("✘"));
            }
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Born-digital PDF to Word (written to ./converted/kathe.docx)
  pdf2word kathe.pdf

  # Explicit output path
  pdf2word kathe.pdf -o out/kathe.docx

  # Scanned PDF to plain text with page markers
  pdf2word --mode scanned --format text --separator marker scan.pdf

  # Let the text-layer analysis pick the mode
  pdf2word --mode auto mixed.pdf

  # Offline OCR with Tesseract
  pdf2word --mode scanned --ocr-engine tesseract scan.pdf

  # Classify the PDF only
  pdf2word --inspect-only --json scan.pdf

ENVIRONMENT VARIABLES:
  GOOGLE_APPLICATION_CREDENTIALS  Cloud Vision service-account key, or JSON with `api_key`/`access_token`
  PDFIUM_LIB_PATH                 Path to libpdfium (file or directory)
  PDF2WORD_*                      Defaults for most flags (see --help)

NOTES:
  Scanned mode sends every page to the OCR engine. Without usable credentials
  the Cloud Vision engine fails each page with OCR_SERVICE_ERROR unless
  --ocr-fallback tesseract is given; digital mode keeps working.
"#;

/// Convert Kannada PDF files to Word or plain text.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2word",
    version,
    about = "Convert Kannada PDF files to Word (.docx) or plain text",
    long_about = "Convert Kannada PDF documents to Word or UTF-8 text. Born-digital PDFs are \
read from their text layer; scanned PDFs are rasterised and sent to a Kannada-capable OCR \
engine (Google Cloud Vision or Tesseract).",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Write the artifact to this path instead of the output directory.
    #[arg(short, long, env = "PDF2WORD_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory for artifacts when --output is not given.
    #[arg(long, env = "PDF2WORD_OUTPUT_DIR", default_value = "converted")]
    output_dir: PathBuf,

    /// Directory under which per-run scratch workspaces are created.
    #[arg(long, env = "PDF2WORD_STORAGE_DIR")]
    storage_dir: Option<PathBuf>,

    /// How to obtain text: digital, scanned, or auto.
    #[arg(long, env = "PDF2WORD_MODE", value_enum, default_value = "digital")]
    mode: ModeArg,

    /// Artifact format: docx or text.
    #[arg(long, env = "PDF2WORD_FORMAT", value_enum, default_value = "docx")]
    format: FormatArg,

    /// Title for the .docx core properties.
    #[arg(long)]
    title: Option<String>,

    /// Author for the .docx core properties.
    #[arg(long, env = "PDF2WORD_AUTHOR")]
    author: Option<String>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2WORD_PASSWORD")]
    password: Option<String>,

    /// OCR engine: vision or tesseract.
    #[arg(long, env = "PDF2WORD_OCR_ENGINE", value_enum, default_value = "vision")]
    ocr_engine: EngineArg,

    /// Cloud Vision credentials file.
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Second OCR engine for pages the first one fails on.
    #[arg(long, env = "PDF2WORD_OCR_FALLBACK", value_enum)]
    ocr_fallback: Option<EngineArg>,

    /// Send only the first N pages to the primary OCR engine (needs --ocr-fallback).
    #[arg(long, env = "PDF2WORD_OCR_PRIMARY_PAGE_LIMIT", requires = "ocr_fallback")]
    primary_page_limit: Option<usize>,

    /// Page image clean-up before OCR: off, standard, or otsu.
    #[arg(long, env = "PDF2WORD_OCR_CLEANUP", default_value = "off")]
    cleanup: ImageCleanup,

    /// Rendering DPI for scanned pages (72–600).
    #[arg(long, env = "PDF2WORD_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Per-page OCR timeout in seconds.
    #[arg(long, env = "PDF2WORD_OCR_TIMEOUT_SECS", default_value_t = 30)]
    timeout: u64,

    /// Retries per page on transient OCR failure.
    #[arg(long, env = "PDF2WORD_OCR_RETRIES", default_value_t = 0)]
    retries: u32,

    /// Concurrent OCR requests.
    #[arg(short, long, env = "PDF2WORD_OCR_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Page separator for text output: blank, formfeed, marker, or a custom string.
    #[arg(long, env = "PDF2WORD_SEPARATOR", default_value = "blank")]
    separator: String,

    /// Repair legacy (Nudi/Baraha) font-encoded text.
    #[arg(long, env = "PDF2WORD_LEGACY_FONT_FIX")]
    legacy_font_fix: bool,

    /// Font family declared in the .docx.
    #[arg(long, env = "PDF2WORD_FONT", default_value = "Noto Sans Kannada")]
    font: String,

    /// Largest accepted input in MiB.
    #[arg(long, env = "PDF2WORD_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// Classify the PDF's text layer only, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print a JSON summary instead of human-readable output.
    #[arg(long, env = "PDF2WORD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2WORD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2WORD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2WORD_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    Digital,
    Scanned,
    /// Analyse the text layer first and use the recommended mode.
    Auto,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Docx,
    Text,
}

impl From<FormatArg> for OutputFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Docx => OutputFormat::Docx,
            FormatArg::Text => OutputFormat::Text,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum EngineArg {
    Vision,
    Tesseract,
}

impl From<EngineArg> for OcrEngine {
    fn from(v: EngineArg) -> Self {
        match v {
            EngineArg::Vision => OcrEngine::GoogleVision,
            EngineArg::Tesseract => OcrEngine::Tesseract,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose brings them all back.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let converter = Converter::with_pdfium(config).context("Failed to initialise converter")?;

    let file = UploadedFile::from_path(&cli.input)
        .await
        .with_context(|| format!("Failed to read {}", cli.input.display()))?;

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let analysis = converter
            .analyze(file, cli.password.clone())
            .await
            .context("Failed to analyse PDF")?;
        print_analysis(&cli, &analysis)?;
        return Ok(());
    }

    let mode = match cli.mode {
        ModeArg::Digital => ConversionMode::Digital,
        ModeArg::Scanned => ConversionMode::Scanned,
        ModeArg::Auto => {
            let analysis = converter
                .analyze(file.clone(), cli.password.clone())
                .await
                .context("Failed to analyse PDF")?;
            if !cli.quiet && !cli.json {
                eprintln!(
                    "{} {} PDF, using {} mode",
                    cyan("◆"),
                    analysis.kind,
                    bold(&analysis.recommended_mode.to_string())
                );
            }
            analysis.recommended_mode
        }
    };

    let mut request = ConversionRequest::new(file, mode, cli.format.into());
    request.title = cli.title.clone();
    request.author = cli.author.clone();
    request.password = cli.password.clone();

    // ── Run conversion ───────────────────────────────────────────────────
    let (path, result) = match cli.output {
        Some(ref output_path) => {
            let result = converter
                .convert_to_file(request, output_path)
                .await
                .context("Conversion failed")?;
            (output_path.clone(), result)
        }
        None => converter
            .convert_to_output_dir(request)
            .await
            .context("Conversion failed")?,
    };

    print_summary(&cli, &path, &result)
}

/// Map CLI args to `ConversionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .max_upload_bytes(cli.max_upload_mb.saturating_mul(1024 * 1024))
        .output_dir(&cli.output_dir)
        .dpi(cli.dpi)
        .ocr_engine(cli.ocr_engine.into())
        .ocr_timeout_secs(cli.timeout)
        .ocr_max_retries(cli.retries)
        .ocr_concurrency(cli.concurrency)
        .ocr_cleanup(cli.cleanup)
        .font_family(cli.font.clone())
        .page_separator(parse_separator(&cli.separator))
        .legacy_font_fix(cli.legacy_font_fix);

    if let Some(ref dir) = cli.storage_dir {
        builder = builder.storage_dir(dir);
    }
    if let Some(ref path) = cli.credentials {
        builder = builder.credentials_path(path);
    }
    if let Some(engine) = cli.ocr_fallback {
        builder = builder.ocr_fallback_engine(engine.into());
    }
    if let Some(n) = cli.primary_page_limit {
        builder = builder.ocr_primary_page_limit(n);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn parse_separator(s: &str) -> PageSeparator {
    s.parse().unwrap_or_default()
}

fn print_analysis(cli: &Cli, analysis: &TextLayerAnalysis) -> Result<()> {
    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(analysis).context("Failed to serialise analysis")?
        );
        return Ok(());
    }

    println!("File:             {}", cli.input.display());
    println!("Pages:            {}", analysis.total_pages);
    println!("Kind:             {}", analysis.kind);
    println!("Recommended mode: {}", analysis.recommended_mode);
    println!("Confidence:       {:.2}", analysis.confidence);
    println!("Quality score:    {:.2}", analysis.quality_score);
    println!("Text layer:       {}", analysis.has_text_layer);
    println!("Kannada detected: {}", analysis.kannada_detected);
    println!(
        "Sampled pages:    {:?} ({} with text)",
        analysis.sampled_pages, analysis.pages_with_text
    );
    if !analysis.sample_text.is_empty() {
        println!("Sample:           {}", analysis.sample_text.replace('\n', " "));
    }
    for note in &analysis.notes {
        println!("  - {note}");
    }
    Ok(())
}

fn print_summary(cli: &Cli, path: &std::path::Path, result: &ConversionResult) -> Result<()> {
    if cli.json {
        let summary = serde_json::json!({
            "output": path.display().to_string(),
            "result": result,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise result")?
        );
        return Ok(());
    }

    if !cli.quiet {
        let stats = &result.stats;
        eprintln!(
            "{}  {} pages  {} chars  {}ms  →  {}",
            green("✔"),
            stats.total_pages,
            stats.total_chars,
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
        if stats.ocr_calls > 0 {
            eprintln!("   {} OCR requests", dim(&stats.ocr_calls.to_string()));
        }
    }
    Ok(())
}
