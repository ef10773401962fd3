use crate::error::IngestError;
use lopdf::Document;
use std::path::Path;

pub const SUPPORTED_EXTENSIONS: [&str; 3] = ["txt", "md", "pdf"];

pub trait TextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError>;
}

/// Plain text and markdown are decoded as UTF-8 (invalid bytes replaced), PDFs go
/// through lopdf, anything else is read as text.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTextExtractor;

impl TextExtractor for FileTextExtractor {
    fn extract(&self, path: &Path) -> Result<String, IngestError> {
        let is_pdf = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            extract_pdf_text(path)
        } else {
            let bytes = std::fs::read(path)?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
    }
}

/// Concatenates the text of every non-empty page, each preceded by a page marker
/// paragraph.
pub fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    let document = Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut pieces = Vec::new();
    for (page_no, _page_id) in document.get_pages() {
        let text = document
            .extract_text(&[page_no])
            .map_err(|error| IngestError::PdfParse(error.to_string()))?;

        if !text.trim().is_empty() {
            pieces.push(format!("\n\n--- Page {page_no} ---\n{text}"));
        }
    }

    if pieces.is_empty() {
        return Err(IngestError::PdfParse(format!(
            "pdf had no readable page text: {}",
            path.display()
        )));
    }

    Ok(pieces.concat().trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::{FileTextExtractor, TextExtractor};
    use crate::IngestError;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn text_files_are_decoded_lossily() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"valid \xff text")?;

        let text = FileTextExtractor.extract(&path)?;
        assert_eq!(text, "valid \u{fffd} text");
        Ok(())
    }

    #[test]
    fn broken_pdf_is_a_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("broken.PDF");
        fs::write(&path, b"%PDF-1.4\n%broken")?;

        let result = FileTextExtractor.extract(&path);
        assert!(matches!(result, Err(IngestError::PdfParse(_))));
        Ok(())
    }
}
