//! PDF text extraction.
//!
//! Extraction is an external concern as far as the pipeline goes: it takes
//! file bytes and yields raw text plus a page count, or fails with "no
//! extractable text". Pages that cannot be decoded individually are skipped
//! rather than failing the whole document.

use lopdf::Document;
use thiserror::Error;

/// Errors raised while extracting text from a PDF.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The bytes could not be parsed as a PDF document.
    #[error("failed to parse PDF: {0}")]
    Parse(String),
    /// The document parsed but contained no readable text.
    #[error("PDF contains no extractable text")]
    NoText,
}

/// Raw text pulled out of a PDF, along with its page count.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    /// Concatenated page texts, pages separated by blank lines.
    pub text: String,
    /// Number of pages in the document.
    pub pages: usize,
}

/// Extract the text of a PDF held in memory.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<ExtractedText, ExtractError> {
    let document = Document::load_mem(bytes).map_err(|error| ExtractError::Parse(error.to_string()))?;

    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let pages = page_numbers.len();

    let mut text = String::new();
    for page_number in page_numbers {
        match document.extract_text(&[page_number]) {
            Ok(page_text) if !page_text.trim().is_empty() => {
                if !text.is_empty() {
                    text.push_str("\n\n");
                }
                text.push_str(page_text.trim());
            }
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(page = page_number, error = %error, "Skipping unreadable page");
            }
        }
    }

    if text.trim().is_empty() {
        return Err(ExtractError::NoText);
    }

    Ok(ExtractedText { text, pages })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_fail_to_parse() {
        let error = extract_pdf_text(b"definitely not a pdf").unwrap_err();
        assert!(matches!(error, ExtractError::Parse(_)));
    }
}
