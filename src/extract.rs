//! Plain-text extraction for uploaded files.
//!
//! The file extension picks the decoder: `.pdf` goes through `pdf-extract`
//! page by page, everything else must be valid UTF-8. Extraction never
//! panics on bad input; callers get an [`ExtractError`] to show the user.

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8 text: {0}")]
    Decode(#[from] std::string::FromUtf8Error),
}

/// Extracts plain text from `bytes`, dispatching on the extension of `filename`.
pub fn extract_text(filename: &str, bytes: Vec<u8>) -> Result<String, ExtractError> {
    if is_pdf(filename) {
        extract_pdf(&bytes)
    } else {
        Ok(String::from_utf8(bytes)?)
    }
}

pub fn is_pdf(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.concat())
}
