//! HTTP API tests: the router is driven in-process with `tower::ServiceExt`.

#![cfg(feature = "server")]

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::*;
use kannada_pdf2word::server::{create_router, ServerConfig};
use kannada_pdf2word::{OcrClient, PdfBackend};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "X-BOUNDARY";

/// A multipart part: `(field name, optional (filename, content type), body)`.
type Part<'a> = (&'a str, Option<(&'a str, &'a str)>, &'a [u8]);

fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, file, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match file {
            Some((filename, content_type)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: {content_type}\r\n\r\n"
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn post(uri: &str, parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

fn app(storage: &std::path::Path, pdf: Arc<dyn PdfBackend>) -> Router {
    app_with_ocr(storage, pdf, RecordingOcr::new())
}

fn app_with_ocr(storage: &std::path::Path, pdf: Arc<dyn PdfBackend>, ocr: Arc<dyn OcrClient>) -> Router {
    let converter = converter(config_in(storage), pdf, ocr);
    create_router(Arc::new(converter), &ServerConfig::default())
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_healthy() {
    let storage = tempfile::tempdir().unwrap();
    let response = app(storage.path(), MemoryPdf::blank(1))
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn convert_returns_docx_attachment() {
    let storage = tempfile::tempdir().unwrap();
    let request = post(
        "/api/v1/convert",
        &[
            ("file", Some(("kathe.pdf", "application/pdf")), PDF_BYTES),
            ("mode", None, b"digital"),
            ("format", None, b"docx"),
            ("title", None, "ಕಥೆ".as_bytes()),
        ],
    );

    let response = app(storage.path(), MemoryPdf::new(&["ಕನ್ನಡ", "ಸಾಹಿತ್ಯ"]))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(
        headers[header::CONTENT_TYPE],
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
    );
    let disposition = headers[header::CONTENT_DISPOSITION].to_str().unwrap();
    assert!(disposition.contains("kathe.docx"));
    assert_eq!(headers["x-page-count"], "2");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(docx_lines(&bytes), vec!["ಕನ್ನಡ".to_string(), "ಸಾಹಿತ್ಯ".to_string()]);
    assert!(docx_part(&bytes, "docProps/core.xml").contains("ಕಥೆ"));
    assert_eq!(leftover_entries(storage.path()), 0);
}

#[tokio::test]
async fn scanned_text_conversion_over_http() {
    let storage = tempfile::tempdir().unwrap();
    let request = post(
        "/api/v1/convert",
        &[
            ("file", Some(("scan.pdf", "application/pdf")), PDF_BYTES),
            ("mode", None, b"scanned"),
            ("format", None, b"text"),
        ],
    );

    let response = app(storage.path(), MemoryPdf::blank(2))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.starts_with(&RecordingOcr::line_for(1)));
    assert!(text.contains(&RecordingOcr::line_for(2)));
}

#[tokio::test]
async fn non_pdf_upload_is_bad_request() {
    let storage = tempfile::tempdir().unwrap();
    let request = post(
        "/api/v1/convert",
        &[("file", Some(("notes.txt", "text/plain")), b"hello")],
    );

    let response = app(storage.path(), MemoryPdf::blank(1))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "INVALID_UPLOAD");
    assert!(body["error"].as_str().unwrap().contains("notes.txt"));
    assert_eq!(leftover_entries(storage.path()), 0);
}

#[tokio::test]
async fn missing_file_is_bad_request() {
    let storage = tempfile::tempdir().unwrap();
    let request = post("/api/v1/convert", &[("mode", None, b"digital")]);

    let response = app(storage.path(), MemoryPdf::blank(1))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_UPLOAD");
}

#[tokio::test]
async fn unknown_format_is_bad_request() {
    let storage = tempfile::tempdir().unwrap();
    let request = post(
        "/api/v1/convert",
        &[
            ("file", Some(("kathe.pdf", "application/pdf")), PDF_BYTES),
            ("format", None, b"rtf"),
        ],
    );

    let response = app(storage.path(), MemoryPdf::blank(1))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_pdf_is_unprocessable() {
    let storage = tempfile::tempdir().unwrap();
    let request = post(
        "/api/v1/convert",
        &[("file", Some(("empty.pdf", "application/pdf")), PDF_BYTES)],
    );

    let response = app(storage.path(), MemoryPdf::new(&[]))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["code"], "UNPARSABLE_PDF");
}

#[tokio::test]
async fn analyze_recommends_scanned_for_image_only_pdf() {
    let storage = tempfile::tempdir().unwrap();
    let request = post(
        "/api/v1/analyze",
        &[("file", Some(("scan.pdf", "application/pdf")), PDF_BYTES)],
    );

    let response = app(storage.path(), MemoryPdf::blank(3))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "scanned");
    assert_eq!(body["recommended_mode"], "scanned");
    assert_eq!(body["total_pages"], 3);
}

fn scanned_text_request() -> Request<Body> {
    post(
        "/api/v1/convert",
        &[
            ("file", Some(("scan.pdf", "application/pdf")), PDF_BYTES),
            ("mode", None, b"scanned"),
            ("format", None, b"text"),
        ],
    )
}

#[tokio::test]
async fn panicking_ocr_engine_is_contained() {
    let storage = tempfile::tempdir().unwrap();
    let router = app_with_ocr(storage.path(), MemoryPdf::blank(2), PanicOnceOcr::new());

    let response = router.clone().oneshot(scanned_text_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await;
    assert_eq!(body["code"], "CONVERSION_FAILED");
    assert_eq!(body["error"], "Conversion failed unexpectedly");
    assert_eq!(leftover_entries(storage.path()), 0);

    // The server keeps serving after the crash.
    let response = router.oneshot(scanned_text_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains(&RecordingOcr::line_for(1)));
    assert!(text.contains(&RecordingOcr::line_for(2)));
    assert_eq!(leftover_entries(storage.path()), 0);
}

#[tokio::test]
async fn text_is_not_a_conversion_mode() {
    let storage = tempfile::tempdir().unwrap();
    let request = post(
        "/api/v1/convert",
        &[
            ("file", Some(("kathe.pdf", "application/pdf")), PDF_BYTES),
            ("mode", None, b"text"),
        ],
    );

    let response = app(storage.path(), MemoryPdf::new(&["ಕನ್ನಡ"]))
        .oneshot(request)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["code"], "INVALID_UPLOAD");
}
