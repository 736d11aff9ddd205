//! Document loading.
//!
//! Turns a file on disk into pages of trimmed, non-empty lines. PDFs go
//! through `pdf-extract`, pages are separated by form feeds. CSV files
//! become a single page.

use crate::brokers::Page;
use crate::error::{ImportError, Result};
use crate::models::Extension;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

/// PDF magic bytes
const PDF_MAGIC: &[u8] = b"%PDF";
/// Maximum PDF file size (100 MB)
const MAX_PDF_SIZE: usize = 100 * 1024 * 1024;

const PAGE_BREAK: char = '\x0c';
const BYTE_ORDER_MARK: char = '\u{feff}';

/// A loaded document, ready for classification
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub file: String,
    pub extension: Extension,
    pub pages: Vec<Page>,
}

fn validate_pdf(bytes: &[u8]) -> Result<()> {
    if bytes.len() < 8 {
        return Err(ImportError::InvalidPdf("file too small".to_string()));
    }

    if bytes.len() > MAX_PDF_SIZE {
        return Err(ImportError::InvalidPdf(format!(
            "file too large ({} MB), maximum is {} MB",
            bytes.len() / (1024 * 1024),
            MAX_PDF_SIZE / (1024 * 1024)
        )));
    }

    if !bytes.starts_with(PDF_MAGIC) {
        return Err(ImportError::InvalidPdf("missing PDF header".to_string()));
    }

    Ok(())
}

fn to_lines(text: &str) -> Page {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split extracted PDF text into pages, dropping pages without text
pub fn split_pages(text: &str) -> Vec<Page> {
    text.split(PAGE_BREAK)
        .map(to_lines)
        .filter(|page| !page.is_empty())
        .collect()
}

/// CSV content as one page
pub fn csv_pages(text: &str) -> Vec<Page> {
    vec![to_lines(text.trim_start_matches(BYTE_ORDER_MARK))]
}

/// Extract the pages of a PDF held in memory
pub fn pdf_pages(bytes: &[u8]) -> Result<Vec<Page>> {
    validate_pdf(bytes)?;

    // pdf-extract panics on some malformed files
    let text = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
        .map_err(|_| ImportError::PdfExtraction("extractor panicked".to_string()))?
        .map_err(|e| ImportError::PdfExtraction(e.to_string()))?;

    Ok(split_pages(&text))
}

/// Read a file and split it into pages according to its extension
pub fn load_file(path: &Path) -> Result<Document> {
    let file = path.display().to_string();
    let extension = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(Extension::from_file_name)
        .ok_or_else(|| ImportError::UnsupportedExtension(file.clone()))?;

    let bytes = std::fs::read(path)?;
    let pages = match extension {
        Extension::Pdf => pdf_pages(&bytes)?,
        Extension::Csv => csv_pages(&String::from_utf8_lossy(&bytes)),
    };
    log::debug!("Loaded {} ({} pages)", file, pages.len());

    Ok(Document { file, extension, pages })
}
