//! 설정 모듈
//!
//! 기본값은 `Default`, 환경변수 `BANKDOC_*`로 덮어씁니다.
//!
//! | 변수 | 항목 |
//! |------|------|
//! | `BANKDOC_DATA_DIR` | 데이터 디렉토리 |
//! | `BANKDOC_CHUNK_SIZE` / `BANKDOC_CHUNK_OVERLAP` | 청크 윈도우/오버랩 |
//! | `BANKDOC_TOP_K` | 기본 검색 개수 |
//! | `BANKDOC_EMBEDDER` | `ollama` 또는 `hashing` |
//! | `BANKDOC_OLLAMA_HOST` | Ollama 주소 (임베딩/LLM 공통) |
//! | `BANKDOC_EMBED_MODEL` / `BANKDOC_LLM_MODEL` | 모델 이름 |
//! | `BANKDOC_LLM_ENABLED` | LLM 사용 여부 |
//! | `BANKDOC_LLM_TIMEOUT` | LLM 타임아웃 (초) |

use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::{get_data_dir, ChunkConfig};

/// 기본 Ollama 주소
pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

// ============================================================================
// Sections
// ============================================================================

/// 검색 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// 문서당 최대 청크 수
    pub per_document_cap: usize,
    /// 재정렬/필터 전 후보 배수 (`top_k × multiplier`)
    pub candidate_multiplier: usize,
    /// 컨텍스트 최대 길이 (문자)
    pub max_context_chars: usize,
    /// LLM 없이 응답할 때 보여줄 발췌 수
    pub max_excerpts: usize,
    /// 재정렬 사용 여부 (lexical)
    pub rerank: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            per_document_cap: 2,
            candidate_multiplier: 4,
            max_context_chars: 4000,
            max_excerpts: 3,
            rerank: false,
        }
    }
}

/// 임베딩 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    Ollama,
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hashing" | "hash" | "local" => Ok(Self::Hashing),
            other => Err(RagError::Config(format!("Unknown embedder: {}", other))),
        }
    }
}

/// 임베딩 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub host: String,
    pub model: String,
    pub dimension: usize,
    /// 호출당 타임아웃 (초)
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Ollama,
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: "nomic-embed-text".to_string(),
            dimension: 768,
            timeout_secs: 30,
        }
    }
}

/// LLM 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub enabled: bool,
    pub host: String,
    pub model: String,
    pub timeout_secs: u64,
    /// 생성 토큰 상한 (`num_predict`)
    pub max_tokens: u32,
    /// 동시 생성 요청 수
    pub max_concurrent: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: "llama3:8b".to_string(),
            timeout_secs: 60,
            max_tokens: 500,
            max_concurrent: 2,
        }
    }
}

// ============================================================================
// RagConfig
// ============================================================================

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub data_dir: PathBuf,
    pub chunk: ChunkConfig,
    pub retrieval: RetrievalConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
    /// 분류 최소 키워드 적중 수
    pub min_classification_hits: usize,
    /// 디렉토리 수집 시 파일 크기 상한 (바이트)
    pub max_file_size: u64,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk: ChunkConfig::word_aligned(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            llm: LlmConfig::default(),
            min_classification_hits: 1,
            max_file_size: 10 * 1024 * 1024,
        }
    }
}

impl RagConfig {
    /// 기본값 + 환경변수
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 변수 조회 함수로 덮어쓰기 (테스트에서 환경 대신 맵 사용)
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("BANKDOC_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("BANKDOC_CHUNK_SIZE") {
            self.chunk.window_size = parse_num("BANKDOC_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("BANKDOC_CHUNK_OVERLAP") {
            self.chunk.overlap = parse_num("BANKDOC_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("BANKDOC_CHUNK_TOLERANCE") {
            self.chunk.boundary_tolerance = parse_num("BANKDOC_CHUNK_TOLERANCE", &v)?;
        }
        if let Some(v) = get("BANKDOC_TOP_K") {
            self.retrieval.top_k = parse_num("BANKDOC_TOP_K", &v)?;
        }
        if let Some(v) = get("BANKDOC_EMBEDDER") {
            self.embedding.backend = v.parse()?;
        }
        if let Some(host) = get("BANKDOC_OLLAMA_HOST") {
            self.embedding.host = host.clone();
            self.llm.host = host;
        }
        if let Some(model) = get("BANKDOC_EMBED_MODEL") {
            self.embedding.model = model;
        }
        if let Some(v) = get("BANKDOC_EMBED_DIM") {
            self.embedding.dimension = parse_num("BANKDOC_EMBED_DIM", &v)?;
        }
        if let Some(model) = get("BANKDOC_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(v) = get("BANKDOC_LLM_ENABLED") {
            self.llm.enabled = parse_bool("BANKDOC_LLM_ENABLED", &v)?;
        }
        if let Some(v) = get("BANKDOC_LLM_TIMEOUT") {
            self.llm.timeout_secs = parse_num("BANKDOC_LLM_TIMEOUT", &v)?;
        }

        Ok(())
    }

    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;

        if self.retrieval.top_k == 0 {
            return Err(RagError::Config("top_k must be positive".into()));
        }
        if self.retrieval.per_document_cap == 0 {
            return Err(RagError::Config("per_document_cap must be positive".into()));
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(RagError::Config("candidate_multiplier must be positive".into()));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::Config("embedding dimension must be positive".into()));
        }
        if self.llm.max_concurrent == 0 {
            return Err(RagError::Config("llm max_concurrent must be positive".into()));
        }
        Ok(())
    }

    /// SQLite DB 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(crate::knowledge::DB_FILE_NAME)
    }

    /// LanceDB 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("vectors.lance")
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::Config(format!("{} must be a number, got {:?}", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RagError::Config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn apply(vars: &[(&str, &str)]) -> Result<RagConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut config = RagConfig::default();
        config.apply_env(|k| map.get(k).cloned())?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk.window_size, 500);
        assert_eq!(config.chunk.overlap, 50);
        assert_eq!(config.chunk, ChunkConfig::word_aligned());
        assert_eq!(config.retrieval.top_k, 5);
        assert_eq!(config.retrieval.per_document_cap, 2);
        assert!(config.data_dir.ends_with(".bankdoc-rag"));
    }

    #[test]
    fn test_env_overrides() {
        let config = apply(&[
            ("BANKDOC_DATA_DIR", "/tmp/bankdoc"),
            ("BANKDOC_CHUNK_SIZE", "300"),
            ("BANKDOC_CHUNK_OVERLAP", "30"),
            ("BANKDOC_CHUNK_TOLERANCE", "0"),
            ("BANKDOC_EMBEDDER", "hashing"),
            ("BANKDOC_OLLAMA_HOST", "http://gpu-box:11434"),
            ("BANKDOC_LLM_ENABLED", "false"),
        ])
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/bankdoc"));
        assert_eq!(config.chunk.window_size, 300);
        assert_eq!(config.chunk.boundary_tolerance, 0);
        assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
        assert_eq!(config.llm.host, "http://gpu-box:11434");
        assert!(!config.llm.enabled);
        assert!(config.db_path().ends_with("bankdoc.db"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(apply(&[("BANKDOC_CHUNK_OVERLAP", "500")]).is_err());
        assert!(apply(&[("BANKDOC_TOP_K", "0")]).is_err());
        assert!(apply(&[("BANKDOC_TOP_K", "many")]).is_err());
        assert!(apply(&[("BANKDOC_EMBEDDER", "openai")]).is_err());
        assert!(apply(&[("BANKDOC_EMBED_DIM", "0")]).is_err());
    }

    #[test]
    fn test_empty_values_ignored() {
        let config = apply(&[("BANKDOC_TOP_K", "  ")]).unwrap();
        assert_eq!(config.retrieval.top_k, 5);
    }
}
