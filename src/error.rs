//! 에러 타입
//!
//! 작업을 중단시키는 에러는 `Parse` 계열뿐입니다.
//! 인덱스/LLM 장애는 [`Degradation`]으로 기록되고 파이프라인은 계속 진행합니다.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// bankdoc-rag 라이브러리 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 원문 텍스트 추출 실패 (문서는 생성되지 않음)
    #[error("Failed to parse {path:?}: {message}")]
    Parse { path: PathBuf, message: String },

    /// 지원하지 않는 파일 형식
    #[error("Unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// 임베딩/벡터 인덱스 사용 불가
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// 언어 모델 사용 불가 또는 타임아웃
    #[error("Generation unavailable: {0}")]
    GenerationUnavailable(String),

    /// 문서 저장소 에러
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    /// 설정 검증 실패
    #[error("Configuration error: {0}")]
    Config(String),

    /// 문서 없음
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

/// 작업을 중단하지 않는 성능 저하 조건
///
/// 보고서와 검색 결과에 남겨 관측 가능하게 합니다.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Degradation {
    /// 청크 인덱싱 또는 벡터 검색을 건너뜀
    IndexUnavailable(String),
    /// LLM 없이 원문 발췌로 응답함
    GenerationUnavailable(String),
}

impl std::fmt::Display for Degradation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IndexUnavailable(reason) => write!(f, "index unavailable: {}", reason),
            Self::GenerationUnavailable(reason) => write!(f, "generation unavailable: {}", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_message() {
        let err = RagError::parse("/tmp/a.pdf", "no extractable text");
        let msg = err.to_string();
        assert!(msg.contains("a.pdf"));
        assert!(msg.contains("no extractable text"));
    }

    #[test]
    fn test_degradation_serialize() {
        let d = Degradation::IndexUnavailable("connection refused".to_string());
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"kind":"index_unavailable","reason":"connection refused"}"#);
    }
}
