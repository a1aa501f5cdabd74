//! 문서 파싱 모듈
//!
//! 파일 형식별로 원문 텍스트를 추출합니다.
//! - 텍스트 파일: 바이트 그대로 (잘못된 UTF-8은 정규화 단계에서 제거)
//! - PDF 파일: pdf-extract
//! - DOCX 파일: docx-rs
//!
//! 추출 결과가 비어 있으면 `RagError::Parse`이며 문서는 생성되지 않습니다.

pub mod docx;
pub mod pdf;

use std::path::Path;

use crate::error::{RagError, Result};

// ============================================================================
// Document Format
// ============================================================================

/// 지원하는 문서 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    Text,
}

impl DocumentFormat {
    /// 확장자로 형식 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Text),
            _ => None,
        }
    }

    /// 파일 경로에서 형식 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Text => "txt",
        }
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// 파일에서 원문 텍스트 추출
pub async fn extract_text(path: &Path) -> Result<String> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        RagError::UnsupportedFormat(
            path.extension()
                .and_then(|e| e.to_str())
                .unwrap_or("(none)")
                .to_string(),
        )
    })?;

    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| RagError::parse(path, format!("Failed to read file: {}", e)))?;

    // PDF/DOCX 파싱은 CPU 바운드이므로 spawn_blocking 사용
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || extract_bytes(format, &bytes, &owned))
        .await
        .map_err(|e| RagError::parse(path, format!("Extraction task failed: {}", e)))?
}

/// 메모리 바이트에서 원문 텍스트 추출
pub fn extract_bytes(format: DocumentFormat, bytes: &[u8], path: &Path) -> Result<String> {
    let text = match format {
        DocumentFormat::Pdf => pdf::extract_pdf_text(bytes, path)?,
        DocumentFormat::Docx => docx::extract_docx_text(bytes, path)?,
        DocumentFormat::Text => String::from_utf8_lossy(bytes).into_owned(),
    };

    if text.trim().is_empty() {
        return Err(RagError::parse(path, "No extractable text"));
    }

    tracing::debug!(
        "Extracted {} chars from {:?} ({})",
        text.chars().count(),
        path,
        format.as_str()
    );
    Ok(text)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("txt"), Some(DocumentFormat::Text));
        assert_eq!(DocumentFormat::from_extension("png"), None);
    }

    #[tokio::test]
    async fn test_extract_text_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slip.txt");
        std::fs::write(&path, "Salary slip for March. Net pay Rs. 45,000").unwrap();

        let text = extract_text(&path).await.unwrap();
        assert!(text.contains("Net pay"));
    }

    #[tokio::test]
    async fn test_empty_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "  \n ").unwrap();

        assert!(matches!(
            extract_text(&path).await,
            Err(RagError::Parse { .. })
        ));
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scan.png");
        std::fs::write(&path, [0u8; 4]).unwrap();

        assert!(matches!(
            extract_text(&path).await,
            Err(RagError::UnsupportedFormat(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_file_is_parse_error() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            extract_text(&dir.path().join("missing.pdf")).await,
            Err(RagError::Parse { .. })
        ));
    }
}
