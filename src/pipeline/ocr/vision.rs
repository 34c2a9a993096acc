//! Google Cloud Vision adapter (`images:annotate`, `DOCUMENT_TEXT_DETECTION`).

use super::OcrClient;
use crate::config::OcrSettings;
use crate::error::OcrError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// OAuth scope requested when exchanging a service-account key.
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// How requests to the Vision API are authorised.
///
/// Read from the JSON file named by `GOOGLE_APPLICATION_CREDENTIALS`, which
/// is either a service-account key downloaded from the Cloud console
/// (`"type": "service_account"`) or a small file carrying an `"api_key"` or
/// a pre-minted `"access_token"`.
///
/// A service account is exchanged for short-lived OAuth tokens on demand;
/// the token is cached and refreshed by [`gcp_auth`].
#[derive(Clone)]
pub enum OcrCredentials {
    ApiKey(String),
    AccessToken(String),
    ServiceAccount(Arc<CustomServiceAccount>),
}

#[derive(Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl OcrCredentials {
    pub fn from_file(path: &Path) -> Result<Self, OcrError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OcrError::Credentials(format!("cannot read '{}': {e}", path.display()))
        })?;
        Self::from_json(&raw)
            .map_err(|e| OcrError::Credentials(format!("'{}': {e}", path.display())))
    }

    pub fn from_json(raw: &str) -> Result<Self, String> {
        let file: CredentialsFile =
            serde_json::from_str(raw).map_err(|e| format!("not valid JSON ({e})"))?;
        if file.kind.as_deref() == Some("service_account") {
            let account = CustomServiceAccount::from_json(raw)
                .map_err(|e| format!("invalid service-account key ({e})"))?;
            return Ok(Self::ServiceAccount(Arc::new(account)));
        }
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(key) = non_empty(file.api_key) {
            return Ok(Self::ApiKey(key));
        }
        if let Some(token) = non_empty(file.access_token) {
            return Ok(Self::AccessToken(token));
        }
        Err("expected a service-account key, an \"api_key\" or an \"access_token\"".into())
    }
}

impl fmt::Debug for OcrCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("OcrCredentials::ApiKey(<redacted>)"),
            Self::AccessToken(_) => f.write_str("OcrCredentials::AccessToken(<redacted>)"),
            Self::ServiceAccount(_) => f.write_str("OcrCredentials::ServiceAccount(<redacted>)"),
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateBatch<'a> {
    requests: [AnnotateRequest<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest<'a> {
    image: ImageContent,
    features: [Feature; 1],
    image_context: ImageContext<'a>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext<'a> {
    language_hints: &'a [String],
}

#[derive(Deserialize)]
struct AnnotateBatchResponse {
    #[serde(default)]
    responses: Vec<AnnotateResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    full_text_annotation: Option<FullTextAnnotation>,
    #[serde(default)]
    error: Option<ApiStatus>,
}

#[derive(Deserialize)]
struct FullTextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct ApiErrorEnvelope {
    error: ApiStatus,
}

// ── Client ───────────────────────────────────────────────────────────────

pub struct GoogleVisionClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: OcrCredentials,
    language_hints: Vec<String>,
}

impl GoogleVisionClient {
    pub fn new(credentials: OcrCredentials, settings: &OcrSettings) -> Result<Self, OcrError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("kannada-pdf2word/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| OcrError::Unavailable(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: settings.endpoint.clone(),
            credentials,
            language_hints: settings.language_hints.clone(),
        })
    }

    fn request_body(&self, png: &[u8]) -> AnnotateBatch<'_> {
        AnnotateBatch {
            requests: [AnnotateRequest {
                image: ImageContent {
                    content: STANDARD.encode(png),
                },
                features: [Feature {
                    kind: "DOCUMENT_TEXT_DETECTION",
                }],
                image_context: ImageContext {
                    language_hints: &self.language_hints,
                },
            }],
        }
    }
}

#[async_trait]
impl OcrClient for GoogleVisionClient {
    fn name(&self) -> &str {
        "google-vision"
    }

    async fn recognize(&self, page_num: usize, png: &[u8]) -> Result<String, OcrError> {
        let mut request = self.http.post(&self.endpoint).json(&self.request_body(png));
        request = match &self.credentials {
            OcrCredentials::ApiKey(key) => request.query(&[("key", key)]),
            OcrCredentials::AccessToken(token) => request.bearer_auth(token),
            OcrCredentials::ServiceAccount(account) => {
                let token = account
                    .token(&[CLOUD_PLATFORM_SCOPE])
                    .await
                    .map_err(|e| OcrError::Credentials(format!("token exchange failed: {e}")))?;
                request.bearer_auth(token.as_str())
            }
        };

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|env| env.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            return Err(OcrError::Service {
                status: status.as_u16(),
                message,
            });
        }

        tracing::debug!("Page {}: Vision responded with {} bytes", page_num, body.len());
        parse_annotate_response(&body)
    }
}

/// Pull the recognised text out of an `images:annotate` response body.
/// A page with no detectable text yields an empty string.
fn parse_annotate_response(body: &str) -> Result<String, OcrError> {
    let batch: AnnotateBatchResponse =
        serde_json::from_str(body).map_err(|e| OcrError::InvalidResponse(e.to_string()))?;
    let first = batch
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| OcrError::InvalidResponse("empty responses array".into()))?;

    if let Some(err) = first.error {
        if err.code != 0 {
            return Err(OcrError::Service {
                status: rpc_code_to_http(err.code),
                message: format!("rpc code {}: {}", err.code, err.message),
            });
        }
    }

    Ok(first
        .full_text_annotation
        .map(|a| a.text)
        .unwrap_or_default())
}

/// HTTP status equivalent of a `google.rpc.Code`.
fn rpc_code_to_http(code: i32) -> u16 {
    match code {
        4 => 504,
        8 => 429,
        13 => 500,
        14 => 503,
        7 | 16 => 403,
        5 => 404,
        _ => 400,
    }
}
