//! Format-specific text extraction for uploaded files.
//!
//! Extraction is pipeline-layer: the ingestion flow supplies a storage
//! path plus MIME type; this module returns plain UTF-8 text. Supported
//! formats: PDF, DOCX, plain text/CSV, and images via the system
//! `tesseract` binary (OCR, with a configurable language hint).

use std::io::Read;
use std::path::Path;

use tokio::process::Command;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
pub const MIME_TEXT: &str = "text/plain";
pub const MIME_CSV: &str = "text/csv";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb
/// protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Extraction error. No panics: the ingestion pipeline records the message
/// on the document and marks it failed.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedMimeType(String),
    Io(String),
    Pdf(String),
    Docx(String),
    Ocr(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedMimeType(m) => write!(f, "unsupported MIME type: {}", m),
            ExtractError::Io(e) => write!(f, "file read failed: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Docx(e) => write!(f, "DOCX extraction failed: {}", e),
            ExtractError::Ocr(e) => write!(f, "OCR failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Whether this MIME type has an extractor at all. Used to reject uploads
/// early instead of failing the background job later.
pub fn is_supported(mime_type: &str) -> bool {
    matches!(mime_type, MIME_PDF | MIME_DOCX | MIME_TEXT | MIME_CSV)
        || mime_type.starts_with("image/")
}

/// Extract plain text from the file at `path`, dispatching on MIME type.
///
/// `language` is the Tesseract language hint for the OCR path and is
/// ignored by every other extractor.
pub async fn extract_text(
    path: &Path,
    mime_type: &str,
    language: &str,
) -> Result<String, ExtractError> {
    if mime_type.starts_with("image/") {
        return extract_image_ocr(path, language).await;
    }

    match mime_type {
        MIME_TEXT | MIME_CSV => {
            let bytes = read_file(path).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        MIME_PDF => {
            let bytes = read_file(path).await?;
            extract_pdf(&bytes)
        }
        MIME_DOCX => {
            let bytes = read_file(path).await?;
            extract_docx(&bytes)
        }
        other => Err(ExtractError::UnsupportedMimeType(other.to_string())),
    }
}

async fn read_file(path: &Path) -> Result<Vec<u8>, ExtractError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ExtractError::Io(format!("{}: {}", path.display(), e)))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Run the system `tesseract` binary: `tesseract <path> stdout -l <lang>`.
async fn extract_image_ocr(path: &Path, language: &str) -> Result<String, ExtractError> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(language)
        .output()
        .await
        .map_err(|e| ExtractError::Ocr(format!("failed to launch tesseract: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ExtractError::Ocr(format!(
            "tesseract exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|e| ExtractError::Docx(format!("word/document.xml: {}", e)))?;

    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Docx(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Docx(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }

    extract_w_t_elements(&doc_xml)
}

/// Collect the text of every `w:t` run; paragraph ends (`w:p`) become
/// newlines so downstream section splitting still has boundaries.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    in_text_run = true;
                }
            }
            Ok(quick_xml::events::Event::Text(te)) => {
                if in_text_run {
                    out.push_str(te.unescape().unwrap_or_default().as_ref());
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                match e.local_name().as_ref() {
                    b"t" => in_text_run = false,
                    b"p" => {
                        if !out.ends_with('\n') {
                            out.push('\n');
                        }
                    }
                    _ => {}
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Docx(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn unsupported_mime_type_returns_error() {
        let err = extract_text(Path::new("/nonexistent"), "application/octet-stream", "eng")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedMimeType(_)));
    }

    #[tokio::test]
    async fn plain_text_reads_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "hello plain text").unwrap();
        let text = extract_text(f.path(), MIME_TEXT, "eng").await.unwrap();
        assert_eq!(text, "hello plain text");
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = extract_text(Path::new("/no/such/file.txt"), MIME_TEXT, "eng")
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[tokio::test]
    async fn invalid_pdf_returns_error() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not a pdf").unwrap();
        let err = extract_text(f.path(), MIME_PDF, "eng").await.unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[tokio::test]
    async fn invalid_zip_returns_error_for_docx() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "not a zip").unwrap();
        let err = extract_text(f.path(), MIME_DOCX, "eng").await.unwrap_err();
        assert!(matches!(err, ExtractError::Docx(_)));
    }

    #[test]
    fn supported_matrix() {
        assert!(is_supported(MIME_PDF));
        assert!(is_supported(MIME_DOCX));
        assert!(is_supported(MIME_TEXT));
        assert!(is_supported(MIME_CSV));
        assert!(is_supported("image/png"));
        assert!(is_supported("image/jpeg"));
        assert!(!is_supported("application/octet-stream"));
        assert!(!is_supported("audio/mpeg"));
    }
}
