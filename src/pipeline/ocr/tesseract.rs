//! Local Tesseract adapter.
//!
//! Streams the PNG to `tesseract stdin stdout` so no image file is written
//! outside the request workspace. Page segmentation mode 6 (single uniform
//! block) with the LSTM engine gives the best results on Kannada book pages.

use super::OcrClient;
use crate::error::OcrError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub struct TesseractClient {
    binary: String,
    lang: String,
}

impl TesseractClient {
    pub fn new(lang: &str) -> Self {
        Self {
            binary: "tesseract".to_string(),
            lang: lang.to_string(),
        }
    }

    /// Use a specific `tesseract` executable.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    fn args(&self) -> Vec<&str> {
        vec!["stdin", "stdout", "-l", &self.lang, "--oem", "3", "--psm", "6"]
    }
}

#[async_trait]
impl OcrClient for TesseractClient {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, page_num: usize, png: &[u8]) -> Result<String, OcrError> {
        let mut child = Command::new(&self.binary)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OcrError::Unavailable(format!("cannot run {}: {e}", self.binary)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(png)
                .await
                .map_err(|e| OcrError::Transport(format!("writing image to tesseract: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OcrError::Transport(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OcrError::Service {
                status: output.status.code().unwrap_or(-1).clamp(0, 999) as u16,
                message: stderr.trim().to_string(),
            });
        }

        let text = String::from_utf8(output.stdout)
            .map_err(|e| OcrError::InvalidResponse(format!("non-UTF-8 output: {e}")))?;
        tracing::debug!("Page {}: tesseract produced {} bytes", page_num, text.len());
        Ok(text)
    }
}
