//! Per-request scratch space.
//!
//! Every conversion gets one [`RequestWorkspace`]: a `TempDir` under the
//! configured storage directory that holds the staged copy of the upload
//! and, in scanned mode, the rasterised page images. Dropping the workspace
//! removes the directory and everything in it, on success, on error, and
//! during unwinding.

use crate::error::ConversionError;
use std::path::{Path, PathBuf};
use tempfile::{Builder, TempDir, TempPath};
use tracing::debug;

const STAGED_PDF_NAME: &str = "upload.pdf";

pub struct RequestWorkspace {
    dir: TempDir,
}

impl RequestWorkspace {
    /// Create a fresh workspace under `storage_dir`, creating the storage
    /// directory itself if needed.
    pub async fn create(storage_dir: &Path) -> Result<Self, ConversionError> {
        tokio::fs::create_dir_all(storage_dir).await.map_err(|e| {
            ConversionError::Internal(format!(
                "cannot create storage directory '{}': {e}",
                storage_dir.display()
            ))
        })?;
        let storage = storage_dir.to_path_buf();
        let dir = tokio::task::spawn_blocking(move || {
            Builder::new().prefix("pdf2word-").tempdir_in(&storage)
        })
        .await
        .map_err(|e| ConversionError::Internal(format!("workspace task failed: {e}")))?
        .map_err(|e| ConversionError::Internal(format!("cannot create workspace: {e}")))?;
        debug!("Workspace created at {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write the upload bytes where pdfium can open them.
    pub async fn stage_pdf(&self, bytes: &[u8]) -> Result<PathBuf, ConversionError> {
        let path = self.dir.path().join(STAGED_PDF_NAME);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ConversionError::Internal(format!("cannot stage upload: {e}")))?;
        Ok(path)
    }

    /// Write one page image into the workspace. The returned [`TempPath`]
    /// deletes the file when dropped.
    pub fn write_page_image(dir: &Path, page_num: usize, png: &[u8]) -> std::io::Result<TempPath> {
        use std::io::Write;
        let mut file = Builder::new()
            .prefix(&format!("page-{page_num:04}-"))
            .suffix(".png")
            .tempfile_in(dir)?;
        file.write_all(png)?;
        file.flush()?;
        Ok(file.into_temp_path())
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        debug!("Releasing workspace {}", self.dir.path().display());
    }
}

/// Number of entries directly under `dir` (0 if it does not exist).
pub fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|rd| rd.count()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn workspace_is_removed_on_drop() {
        let storage = tempfile::tempdir().unwrap();
        let ws = RequestWorkspace::create(storage.path()).await.unwrap();
        let staged = ws.stage_pdf(b"%PDF-1.7").await.unwrap();
        assert!(staged.exists());
        assert_eq!(count_entries(storage.path()), 1);

        drop(ws);
        assert!(!staged.exists());
        assert_eq!(count_entries(storage.path()), 0);
    }

    #[tokio::test]
    async fn creates_missing_storage_dir() {
        let root = tempfile::tempdir().unwrap();
        let storage = root.path().join("nested/storage");
        let ws = RequestWorkspace::create(&storage).await.unwrap();
        assert!(ws.path().starts_with(&storage));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn concurrent_workspaces_are_distinct() {
        let storage = tempfile::tempdir().unwrap();
        let (a, b) = tokio::join!(
            RequestWorkspace::create(storage.path()),
            RequestWorkspace::create(storage.path())
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.path(), b.path());
        assert_eq!(count_entries(storage.path()), 2);
    }

    #[tokio::test]
    async fn storage_path_that_is_a_file_is_internal_error() {
        let root = tempfile::tempdir().unwrap();
        let file = root.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        let err = match RequestWorkspace::create(&file).await {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(matches!(err, ConversionError::Internal(_)));
    }

    #[test]
    fn page_image_deleted_when_dropped() {
        let storage = tempfile::tempdir().unwrap();
        let path = RequestWorkspace::write_page_image(storage.path(), 3, b"png").unwrap();
        let p = path.to_path_buf();
        assert!(p.file_name().unwrap().to_string_lossy().starts_with("page-0003-"));
        assert_eq!(std::fs::read(&p).unwrap(), b"png");
        drop(path);
        assert!(!p.exists());
    }
}
