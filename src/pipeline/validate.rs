//! Upload validation: cheap checks that run before any PDF work.
//!
//! Order: presence, size, declared type, then the `%PDF-` signature. The
//! signature check catches renamed files that would otherwise reach pdfium
//! and fail with a less helpful "corrupt PDF" error.

use crate::error::UploadRejection;
use crate::request::{has_pdf_extension, UploadedFile};

/// The PDF header may be preceded by junk; readers accept it anywhere in
/// the first 1024 bytes.
const SIGNATURE_WINDOW: usize = 1024;
const PDF_SIGNATURE: &[u8] = b"%PDF-";

const PDF_CONTENT_TYPES: &[&str] = &["application/pdf", "application/x-pdf"];

/// Accept or reject an upload. Read-only.
pub fn validate_upload(file: &UploadedFile, max_bytes: usize) -> Result<(), UploadRejection> {
    if file.is_empty() {
        return Err(UploadRejection::Empty);
    }

    if file.len() > max_bytes {
        return Err(UploadRejection::TooLarge {
            size: file.len(),
            max: max_bytes,
        });
    }

    if !declared_as_pdf(file) {
        return Err(UploadRejection::NotPdf {
            filename: file.filename.clone(),
            content_type: file.content_type.clone(),
        });
    }

    if !has_pdf_signature(&file.bytes) {
        let magic = file.bytes.iter().take(8).copied().collect();
        return Err(UploadRejection::BadSignature {
            filename: file.filename.clone(),
            magic,
        });
    }

    Ok(())
}

fn declared_as_pdf(file: &UploadedFile) -> bool {
    let mime = file
        .content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    has_pdf_extension(&file.filename) || PDF_CONTENT_TYPES.contains(&mime.as_str())
}

fn has_pdf_signature(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(SIGNATURE_WINDOW)];
    window
        .windows(PDF_SIGNATURE.len())
        .any(|w| w == PDF_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024 * 1024;

    fn pdf(name: &str, ct: &str) -> UploadedFile {
        UploadedFile::new(b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n".to_vec(), name, ct)
    }

    #[test]
    fn accepts_pdf() {
        assert_eq!(validate_upload(&pdf("doc.pdf", "application/pdf"), MAX), Ok(()));
    }

    #[test]
    fn accepts_on_extension_or_content_type_alone() {
        assert!(validate_upload(&pdf("doc.PDF", "application/octet-stream"), MAX).is_ok());
        assert!(validate_upload(&pdf("upload", "application/pdf; charset=binary"), MAX).is_ok());
    }

    #[test]
    fn rejects_empty() {
        let f = UploadedFile::new(Vec::new(), "doc.pdf", "application/pdf");
        assert_eq!(validate_upload(&f, MAX), Err(UploadRejection::Empty));
    }

    #[test]
    fn rejects_oversize_before_anything_else() {
        let f = UploadedFile::new(vec![b'x'; 2048], "notes.txt", "text/plain");
        assert_eq!(
            validate_upload(&f, 1024),
            Err(UploadRejection::TooLarge {
                size: 2048,
                max: 1024
            })
        );
    }

    #[test]
    fn size_limit_is_inclusive() {
        let f = pdf("doc.pdf", "application/pdf");
        assert!(validate_upload(&f, f.len()).is_ok());
        assert!(validate_upload(&f, f.len() - 1).is_err());
    }

    #[test]
    fn rejects_non_pdf_declaration() {
        let f = UploadedFile::new(b"\x89PNG\r\n".to_vec(), "scan.png", "image/png");
        assert!(matches!(
            validate_upload(&f, MAX),
            Err(UploadRejection::NotPdf { .. })
        ));
    }

    #[test]
    fn rejects_renamed_file() {
        let f = UploadedFile::new(b"PK\x03\x04 not a pdf".to_vec(), "doc.pdf", "application/pdf");
        match validate_upload(&f, MAX) {
            Err(UploadRejection::BadSignature { magic, .. }) => assert_eq!(&magic[..2], b"PK"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn signature_may_follow_leading_junk() {
        let mut bytes = vec![b' '; 100];
        bytes.extend_from_slice(b"%PDF-1.4");
        let f = UploadedFile::new(bytes, "doc.pdf", "application/pdf");
        assert!(validate_upload(&f, MAX).is_ok());
    }
}
