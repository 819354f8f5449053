//! PDF text and metadata extraction
//!
//! Text comes from `pdf-extract`; page count and document-info metadata
//! come from `lopdf`, which parses the document structure directly.

use lopdf::{Document, Object};
use thiserror::Error;

/// Errors during PDF extraction
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to parse PDF: {0}")]
    Parse(String),
    #[error("failed to extract PDF text: {0}")]
    Text(String),
}

/// Extracted PDF content
#[derive(Debug, Clone)]
pub struct PdfDocument {
    /// Concatenated page text, pages separated by blank lines
    pub text: String,
    /// Number of pages
    pub pages: usize,
    pub title: Option<String>,
    pub author: Option<String>,
    /// Creation date with the PDF `D:` prefix stripped
    pub created_date: Option<String>,
}

/// Extract text and metadata from PDF bytes
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn extract(bytes: &[u8]) -> Result<PdfDocument, PdfError> {
        let document = Document::load_mem(bytes).map_err(|e| PdfError::Parse(e.to_string()))?;
        let pages = document.get_pages().len();

        let text = pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| PdfError::Text(e.to_string()))?;
        let text = clean_text(&text);

        let title = info_string(&document, b"Title");
        let author = info_string(&document, b"Author");
        let created_date = info_string(&document, b"CreationDate").map(|date| {
            // PDF dates look like "D:20240115100000"
            date.strip_prefix("D:").unwrap_or(&date).to_string()
        });

        Ok(PdfDocument {
            text,
            pages,
            title,
            author,
            created_date,
        })
    }
}

/// Trim each line and cap blank-line runs at one, keeping page and
/// paragraph separation readable.
fn clean_text(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if lines.last().map(|l: &String| !l.is_empty()).unwrap_or(false) {
                lines.push(String::new());
            }
        } else {
            lines.push(trimmed.to_string());
        }
    }
    lines.join("\n").trim().to_string()
}

/// Read a text entry from the document information dictionary.
fn info_string(document: &Document, key: &[u8]) -> Option<String> {
    let info = document.trailer.get(b"Info").ok()?;
    let info = match info {
        Object::Reference(id) => document.get_object(*id).ok()?,
        other => other,
    };
    let dict = info.as_dict().ok()?;
    match dict.get(key).ok()? {
        Object::String(bytes, _) => {
            let decoded = decode_pdf_string(bytes);
            let trimmed = decoded.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}

/// PDF text strings are UTF-16BE when they carry a BOM, otherwise
/// PDFDocEncoding (approximated here as Latin-1).
fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
