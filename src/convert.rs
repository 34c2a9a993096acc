//! The conversion orchestrator.
//!
//! [`Converter`] owns the long-lived pieces (PDF backend, OCR client, both
//! text sources, the document builder) and runs one request at a time per
//! call to [`Converter::convert`]:
//!
//! ```text
//! Received ─▶ Validated ─┬─▶ Extracted ──┬─▶ Built ─▶ Delivered
//!                        └─▶ Recognized ─┘
//! ```
//!
//! Any step can fail; the first error ends the run and is returned as-is.
//! Nothing is retried here. The request workspace (staged upload, page
//! images) is an RAII guard local to the run, so it is removed on every exit
//! path including unwinding.

use crate::analyze::{TextLayerAnalysis, TextLayerAnalyzer};
use crate::config::{ConversionConfig, OcrEngine};
use crate::error::ConversionError;
use crate::output::{ConversionResult, ConversionStage, ConversionStats};
use crate::pipeline::builder::{DocumentBuilder, DocumentProperties};
use crate::pipeline::digital::DigitalPdfExtractor;
use crate::pipeline::ocr::{build_client, build_fallback_client, OcrClient, UnconfiguredOcr};
use crate::pipeline::pdf::{run_blocking, PdfBackend, PdfiumBackend};
use crate::pipeline::postprocess::clean_text;
use crate::pipeline::scanned::ScannedPdfPipeline;
use crate::pipeline::validate::validate_upload;
use crate::pipeline::workspace::RequestWorkspace;
use crate::pipeline::{StagedPdf, TextSource};
use crate::progress::ProgressCallback;
use crate::request::{ConversionMode, ConversionRequest, UploadedFile};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};

/// Converts uploaded PDFs into `.docx` or `.txt` artifacts.
///
/// Cheap to share: wrap it in an [`Arc`] and call [`Converter::convert`]
/// from as many tasks as you like; requests share no mutable state.
pub struct Converter {
    config: Arc<ConversionConfig>,
    backend: Arc<dyn PdfBackend>,
    digital: DigitalPdfExtractor,
    scanned: ScannedPdfPipeline,
    builder: DocumentBuilder,
    analyzer: TextLayerAnalyzer,
}

impl Converter {
    /// Assemble a converter from explicit parts.
    pub fn new(
        config: ConversionConfig,
        backend: Arc<dyn PdfBackend>,
        ocr: Arc<dyn OcrClient>,
    ) -> Self {
        let digital = DigitalPdfExtractor::new(Arc::clone(&backend), config.progress_callback.clone());
        let scanned = ScannedPdfPipeline::new(Arc::clone(&backend), ocr, &config);
        let builder = DocumentBuilder::new(&config);
        Self {
            config: Arc::new(config),
            backend,
            digital,
            scanned,
            builder,
            analyzer: TextLayerAnalyzer::default(),
        }
    }

    /// Bind pdfium and construct the configured OCR clients.
    ///
    /// When Google Vision is selected but its credentials are missing or
    /// unusable, the converter still starts: digital mode works and scanned
    /// pages go to the fallback engine if one is configured, or fail with
    /// [`ConversionError::OcrServiceError`] otherwise.
    pub fn with_pdfium(config: ConversionConfig) -> Result<Self, ConversionError> {
        let backend: Arc<dyn PdfBackend> = Arc::new(PdfiumBackend::new()?);
        let ocr = match build_client(&config.ocr) {
            Ok(client) => client,
            Err(e) if config.ocr.engine == OcrEngine::GoogleVision => {
                warn!("Cloud Vision OCR disabled: {}", e);
                Arc::new(UnconfiguredOcr::new(e.to_string())) as Arc<dyn OcrClient>
            }
            Err(e) => return Err(e),
        };
        let fallback = build_fallback_client(&config.ocr)?;
        match &fallback {
            Some(f) => info!("OCR engine: {} (fallback: {})", ocr.name(), f.name()),
            None => info!("OCR engine: {}", ocr.name()),
        }

        let converter = Self::new(config, backend, ocr);
        Ok(match fallback {
            Some(f) => converter.with_fallback_ocr(f),
            None => converter,
        })
    }

    /// Use `fallback` for scanned pages the primary OCR engine fails on or
    /// is not allowed to see (`ocr.primary_page_limit`).
    pub fn with_fallback_ocr(mut self, fallback: Arc<dyn OcrClient>) -> Self {
        self.scanned = self.scanned.with_fallback(fallback);
        self
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    fn source(&self, mode: ConversionMode) -> &dyn TextSource {
        match mode {
            ConversionMode::Digital => &self.digital,
            ConversionMode::Scanned => &self.scanned,
        }
    }

    /// Run one conversion to completion.
    ///
    /// Returns the artifact in memory; see [`Converter::convert_to_file`] to
    /// persist it.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult, ConversionError> {
        let span = info_span!(
            "convert",
            file = %request.file.filename,
            mode = %request.mode,
            format = %request.output_format,
        );
        let mut tracker = StageTracker::new(self.config.progress_callback.as_ref());
        let result = self.run(request, &mut tracker).instrument(span).await;

        match &result {
            Ok(r) => info!(
                "Converted {} ({} pages, {} bytes) in {}ms",
                r.artifact_filename, r.stats.total_pages, r.stats.artifact_bytes, r.stats.total_duration_ms
            ),
            Err(e) => warn!(
                code = e.code(),
                "Conversion failed after stage '{}': {}",
                tracker.last(),
                e
            ),
        }
        if let Some(cb) = tracker.progress {
            cb.on_conversion_complete(tracker.total_pages, result.is_ok());
        }
        result
    }

    async fn run(
        &self,
        request: ConversionRequest,
        tracker: &mut StageTracker<'_>,
    ) -> Result<ConversionResult, ConversionError> {
        let total_start = Instant::now();
        let ConversionRequest {
            file,
            mode,
            output_format,
            title,
            author,
            password,
        } = request;

        // ── Validate ─────────────────────────────────────────────────────
        validate_upload(&file, self.config.max_upload_bytes)?;
        tracker.advance(ConversionStage::Validated);

        // ── Stage ────────────────────────────────────────────────────────
        let workspace = RequestWorkspace::create(&self.config.storage_dir).await?;
        let pdf_path = workspace.stage_pdf(&file.bytes).await?;
        drop(file.bytes);

        let metadata = {
            let path = pdf_path.clone();
            let password = password.clone();
            run_blocking(Arc::clone(&self.backend), move |b| b.metadata(&path, password.as_deref())).await?
        };
        if metadata.page_count == 0 {
            return Err(ConversionError::UnparsablePdf {
                detail: "document has no pages".into(),
            });
        }
        info!("PDF has {} pages", metadata.page_count);
        tracker.total_pages = metadata.page_count;
        if let Some(cb) = tracker.progress {
            cb.on_conversion_start(metadata.page_count);
        }

        // ── Produce text ─────────────────────────────────────────────────
        let staged = StagedPdf {
            path: pdf_path,
            password,
            page_count: metadata.page_count,
            scratch_dir: workspace.path().to_path_buf(),
        };
        let text_start = Instant::now();
        let output = self.source(mode).produce(&staged).await?;
        let text_duration_ms = text_start.elapsed().as_millis() as u64;
        tracker.advance(match mode {
            ConversionMode::Digital => ConversionStage::Extracted,
            ConversionMode::Scanned => ConversionStage::Recognized,
        });

        let legacy_fix = self.config.legacy_font_fix;
        let text = output.text.map_text(|t| clean_text(t, legacy_fix));

        // ── Build ────────────────────────────────────────────────────────
        let build_start = Instant::now();
        let properties = DocumentProperties {
            title: title.or_else(|| metadata.title.clone()),
            author: author.or_else(|| metadata.author.clone()),
        };
        let artifact = self
            .builder
            .build(&text, output_format, &file.filename, properties)?;
        let build_duration_ms = build_start.elapsed().as_millis() as u64;
        tracker.advance(ConversionStage::Built);

        drop(workspace);
        tracker.advance(ConversionStage::Delivered);

        let stats = ConversionStats {
            total_pages: text.len(),
            pages_with_text: text.pages().iter().filter(|p| !p.text.trim().is_empty()).count(),
            ocr_calls: output.ocr_calls,
            total_chars: text.total_chars(),
            artifact_bytes: artifact.bytes.len(),
            total_duration_ms: total_start.elapsed().as_millis() as u64,
            text_duration_ms,
            build_duration_ms,
            stages: tracker.visited.clone(),
        };

        Ok(ConversionResult {
            artifact_bytes: artifact.bytes,
            artifact_filename: artifact.filename,
            format: output_format,
            metadata,
            stats,
        })
    }

    /// Convert and write the artifact to `path` (temp file + rename).
    pub async fn convert_to_file(
        &self,
        request: ConversionRequest,
        path: impl AsRef<Path>,
    ) -> Result<ConversionResult, ConversionError> {
        let result = self.convert(request).await?;
        write_artifact(&result, path.as_ref()).await?;
        Ok(result)
    }

    /// Convert and write the artifact into the configured output directory
    /// under its derived filename. Returns the path written.
    pub async fn convert_to_output_dir(
        &self,
        request: ConversionRequest,
    ) -> Result<(PathBuf, ConversionResult), ConversionError> {
        let result = self.convert(request).await?;
        let path = self.config.output_dir.join(&result.artifact_filename);
        write_artifact(&result, &path).await?;
        Ok((path, result))
    }

    /// Synchronous wrapper around [`Converter::convert`].
    ///
    /// Creates a temporary tokio runtime internally; do not call from
    /// inside an async context.
    pub fn convert_sync(&self, request: ConversionRequest) -> Result<ConversionResult, ConversionError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| ConversionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
            .block_on(self.convert(request))
    }

    /// Classify an upload's text layer without converting it.
    pub async fn analyze(
        &self,
        file: UploadedFile,
        password: Option<String>,
    ) -> Result<TextLayerAnalysis, ConversionError> {
        let span = info_span!("analyze", file = %file.filename);
        async move {
            validate_upload(&file, self.config.max_upload_bytes)?;
            let workspace = RequestWorkspace::create(&self.config.storage_dir).await?;
            let path = workspace.stage_pdf(&file.bytes).await?;

            let (metadata, texts) = run_blocking(Arc::clone(&self.backend), move |b| {
                let metadata = b.metadata(&path, password.as_deref())?;
                let texts = b.page_texts(&path, password.as_deref())?;
                Ok((metadata, texts))
            })
            .await?;

            let analysis = self.analyzer.analyze(&metadata, &texts);
            info!(
                "Analysis: {} → {} mode (confidence {:.2})",
                analysis.kind, analysis.recommended_mode, analysis.confidence
            );
            Ok(analysis)
        }
        .instrument(span)
        .await
    }
}

/// Write `result`'s artifact to `path` atomically: temp file in the same
/// directory, then rename.
pub async fn write_artifact(result: &ConversionResult, path: &Path) -> Result<(), ConversionError> {
    let fail = |e: std::io::Error| ConversionError::artifact_write(path.display().to_string(), e);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(e) = tokio::fs::write(&tmp_path, &result.artifact_bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(fail(e));
    }
    info!("Wrote {}", path.display());
    Ok(())
}

/// Records visited stages, logs transitions and forwards them to the
/// progress callback.
struct StageTracker<'a> {
    visited: Vec<ConversionStage>,
    progress: Option<&'a ProgressCallback>,
    total_pages: usize,
}

impl<'a> StageTracker<'a> {
    fn new(progress: Option<&'a ProgressCallback>) -> Self {
        let mut tracker = Self {
            visited: Vec::with_capacity(5),
            progress,
            total_pages: 0,
        };
        tracker.enter(ConversionStage::Received);
        tracker
    }

    fn last(&self) -> ConversionStage {
        self.visited.last().copied().unwrap_or(ConversionStage::Received)
    }

    fn advance(&mut self, next: ConversionStage) {
        debug_assert!(
            self.last().can_advance_to(next),
            "illegal stage transition {} -> {}",
            self.last(),
            next
        );
        self.enter(next);
    }

    fn enter(&mut self, stage: ConversionStage) {
        info!(stage = %stage, "Stage reached");
        if let Some(cb) = self.progress {
            cb.on_stage(stage);
        }
        self.visited.push(stage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{OcrError, UploadRejection};
    use crate::pipeline::pdf::fake::FakePdf;
    use crate::pipeline::workspace::count_entries;
    use crate::progress::ConversionProgressCallback;
    use crate::request::OutputFormat;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct EchoOcr;

    #[async_trait]
    impl OcrClient for EchoOcr {
        fn name(&self) -> &str {
            "echo"
        }

        async fn recognize(&self, page_num: usize, _png: &[u8]) -> Result<String, OcrError> {
            Ok(format!("ಪುಟ {page_num}"))
        }
    }

    #[derive(Default)]
    struct Recorder {
        stages: Mutex<Vec<ConversionStage>>,
        finished: Mutex<Option<(usize, bool)>>,
    }

    impl ConversionProgressCallback for Recorder {
        fn on_stage(&self, stage: ConversionStage) {
            self.stages.lock().unwrap().push(stage);
        }

        fn on_conversion_complete(&self, total_pages: usize, success: bool) {
            *self.finished.lock().unwrap() = Some((total_pages, success));
        }
    }

    fn pdf_upload(name: &str) -> UploadedFile {
        UploadedFile::new(b"%PDF-1.7\n%fake\n".to_vec(), name, "application/pdf")
    }

    fn converter(pages: &[&str], storage: &Path, recorder: Option<Arc<Recorder>>) -> Converter {
        let mut builder = ConversionConfig::builder().storage_dir(storage);
        if let Some(r) = recorder {
            builder = builder.progress_callback(r);
        }
        Converter::new(builder.build().unwrap(), Arc::new(FakePdf::new(pages)), Arc::new(EchoOcr))
    }

    #[tokio::test]
    async fn digital_run_visits_every_stage() {
        let storage = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let conv = converter(&["ಕನ್ನಡ", "ಎರಡು"], storage.path(), Some(recorder.clone()));

        let request = ConversionRequest::new(pdf_upload("kathe.pdf"), ConversionMode::Digital, OutputFormat::Text);
        let result = conv.convert(request).await.unwrap();

        assert_eq!(result.artifact_filename, "kathe.txt");
        assert_eq!(String::from_utf8(result.artifact_bytes).unwrap(), "ಕನ್ನಡ\n\nಎರಡು\n");
        let expected = vec![
            ConversionStage::Received,
            ConversionStage::Validated,
            ConversionStage::Extracted,
            ConversionStage::Built,
            ConversionStage::Delivered,
        ];
        assert_eq!(result.stats.stages, expected);
        assert_eq!(*recorder.stages.lock().unwrap(), expected);
        assert_eq!(*recorder.finished.lock().unwrap(), Some((2, true)));
        assert_eq!(count_entries(storage.path()), 0);
    }

    #[tokio::test]
    async fn scanned_run_counts_ocr_calls() {
        let storage = tempfile::tempdir().unwrap();
        let conv = converter(&["", "", ""], storage.path(), None);

        let request = ConversionRequest::new(pdf_upload("scan.pdf"), ConversionMode::Scanned, OutputFormat::Docx);
        let result = conv.convert(request).await.unwrap();

        assert_eq!(result.stats.ocr_calls, 3);
        assert_eq!(result.stats.total_pages, 3);
        assert!(result.stats.stages.contains(&ConversionStage::Recognized));
        assert_eq!(result.artifact_filename, "scan.docx");
        assert_eq!(count_entries(storage.path()), 0);
    }

    #[tokio::test]
    async fn rejected_upload_reports_failure_and_leaves_nothing() {
        let storage = tempfile::tempdir().unwrap();
        let recorder = Arc::new(Recorder::default());
        let conv = converter(&["x"], storage.path(), Some(recorder.clone()));

        let upload = UploadedFile::new(b"hello".to_vec(), "notes.txt", "text/plain");
        let request = ConversionRequest::new(upload, ConversionMode::Digital, OutputFormat::Docx);
        let err = conv.convert(request).await.unwrap_err();

        assert!(matches!(
            err,
            ConversionError::InvalidUpload(UploadRejection::NotPdf { .. })
        ));
        assert_eq!(*recorder.stages.lock().unwrap(), vec![ConversionStage::Received]);
        assert_eq!(*recorder.finished.lock().unwrap(), Some((0, false)));
        assert_eq!(count_entries(storage.path()), 0);
    }

    #[tokio::test]
    async fn zero_page_document_is_unparsable() {
        let storage = tempfile::tempdir().unwrap();
        let conv = converter(&[], storage.path(), None);
        let request = ConversionRequest::new(pdf_upload("empty.pdf"), ConversionMode::Digital, OutputFormat::Text);
        let err = conv.convert(request).await.unwrap_err();
        assert!(matches!(err, ConversionError::UnparsablePdf { .. }));
        assert_eq!(count_entries(storage.path()), 0);
    }

    #[tokio::test]
    async fn request_title_overrides_pdf_metadata() {
        let storage = tempfile::tempdir().unwrap();
        let conv = converter(&["ಕನ್ನಡ"], storage.path(), None);
        let request = ConversionRequest::new(pdf_upload("a.pdf"), ConversionMode::Digital, OutputFormat::Docx)
            .with_title("ನನ್ನ ಕಥೆ");
        let result = conv.convert(request).await.unwrap();

        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(result.artifact_bytes)).unwrap();
        let mut core = String::new();
        std::io::Read::read_to_string(&mut archive.by_name("docProps/core.xml").unwrap(), &mut core).unwrap();
        assert!(core.contains("<dc:title>ನನ್ನ ಕಥೆ</dc:title>"));
    }

    #[tokio::test]
    async fn convert_to_file_writes_atomically() {
        let storage = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let conv = converter(&["ಕನ್ನಡ"], storage.path(), None);
        let target = out.path().join("nested").join("out.txt");

        let request = ConversionRequest::new(pdf_upload("a.pdf"), ConversionMode::Digital, OutputFormat::Text);
        conv.convert_to_file(request, &target).await.unwrap();

        assert_eq!(std::fs::read_to_string(&target).unwrap(), "ಕನ್ನಡ\n");
        assert_eq!(count_entries(target.parent().unwrap()), 1);
    }

    #[tokio::test]
    async fn analyze_recommends_scanned_for_blank_layer() {
        let storage = tempfile::tempdir().unwrap();
        let conv = converter(&["", "", ""], storage.path(), None);
        let analysis = conv.analyze(pdf_upload("scan.pdf"), None).await.unwrap();
        assert_eq!(analysis.recommended_mode, ConversionMode::Scanned);
        assert_eq!(analysis.total_pages, 3);
        assert_eq!(count_entries(storage.path()), 0);
    }
}
