//! PDF 텍스트 추출
//!
//! pdf-extract 크레이트를 사용합니다. 페이지 구분은 문단 구분으로 바꿉니다.

use std::path::Path;

use crate::error::{RagError, Result};
use crate::normalizer::PARAGRAPH_BREAK;

/// PDF 바이트에서 텍스트 추출
pub fn extract_pdf_text(bytes: &[u8], path: &Path) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| RagError::parse(path, format!("Failed to extract text from PDF: {}", e)))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(String::new());
    }

    Ok(split_pdf_pages(&text).join(PARAGRAPH_BREAK))
}

/// 폼피드(`\x0c`) 기준 페이지 분리
fn split_pdf_pages(text: &str) -> Vec<&str> {
    text.split('\x0c')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_pdf_pages_with_formfeed() {
        let pages = split_pdf_pages("Page 1 content\x0cPage 2 content\x0c\x0cPage 3 content");
        assert_eq!(pages, vec!["Page 1 content", "Page 2 content", "Page 3 content"]);
    }

    #[test]
    fn test_split_pdf_pages_no_separator() {
        assert_eq!(split_pdf_pages("Just some text").len(), 1);
    }

    #[test]
    fn test_invalid_pdf_is_parse_error() {
        let result = extract_pdf_text(b"not a pdf", Path::new("broken.pdf"));
        assert!(matches!(result, Err(RagError::Parse { .. })));
    }
}
