//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 두 가지 프로바이더를 제공합니다.
//! - [`OllamaEmbedding`]: 로컬 Ollama 서버 (`/api/embed`)
//! - [`HashingEmbedding`]: 외부 의존 없는 결정적 feature-hashing 임베딩
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&config.embedding)?;
//! let embedding = embedder.embed("outstanding loan amount").await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingBackend, EmbeddingConfig};
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
/// 연결 실패는 `RagError::IndexUnavailable`로 보고합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더/모델 이름 (임베딩 캐시 키)
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// 최대 재시도 횟수 (연결 실패/5xx)
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 500;

/// Ollama 임베딩 구현체
///
/// source: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug)]
pub struct OllamaEmbedding {
    host: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
    max_retries: u32,
}

/// `/api/embed` 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

/// `/api/embed` 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama 에러 응답
#[derive(Debug, Deserialize)]
struct OllamaError {
    error: String,
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        if config.dimension == 0 {
            return Err(RagError::Config("Embedding dimension must be positive".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            client,
            dimension: config.dimension,
            max_retries: MAX_RETRIES,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/embed", self.host)
    }

    /// 한 번의 HTTP 호출. 안쪽 `Err`는 재시도 가능한 실패
    async fn try_embed(&self, texts: &[String]) -> Result<std::result::Result<Vec<Vec<f32>>, String>> {
        let request = EmbedRequest {
            model: &self.model,
            input: texts,
        };

        let response = match self.client.post(self.endpoint()).json(&request).send().await {
            Ok(resp) => resp,
            Err(e) => return Ok(Err(format!("Failed to send embedding request: {}", e))),
        };

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::IndexUnavailable(format!("Failed to read response body: {}", e)))?;

        if status.is_success() {
            let parsed: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
                RagError::IndexUnavailable(format!("Failed to parse embedding response: {}", e))
            })?;
            return Ok(Ok(parsed.embeddings));
        }

        if status.is_server_error() {
            return Ok(Err(format!("Ollama server error ({})", status)));
        }

        // 4xx - 재시도 없이 실패 (모델 미설치 등)
        let message = serde_json::from_str::<OllamaError>(&body)
            .map(|e| e.error)
            .unwrap_or(body);
        Err(RagError::IndexUnavailable(format!(
            "Ollama embedding error ({}): {}",
            status, message
        )))
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| RagError::IndexUnavailable("Empty embedding response".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let mut last_error = String::new();

        // 재시도 루프 (연결 실패/5xx 시 지수 백오프)
        for attempt in 0..=self.max_retries {
            match self.try_embed(texts).await? {
                Ok(embeddings) => {
                    if embeddings.len() != texts.len() {
                        return Err(RagError::IndexUnavailable(format!(
                            "Expected {} embeddings, got {}",
                            texts.len(),
                            embeddings.len()
                        )));
                    }
                    if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
                        return Err(RagError::IndexUnavailable(format!(
                            "Embedding dimension mismatch: expected {}, got {}",
                            self.dimension,
                            bad.len()
                        )));
                    }
                    tracing::debug!("Embedded {} texts with {}", texts.len(), self.model);
                    return Ok(embeddings);
                }
                Err(e) => {
                    last_error = e;
                    if attempt < self.max_retries {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "{}, retrying in {:?} (attempt {}/{})",
                            last_error,
                            backoff,
                            attempt + 1,
                            self.max_retries
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(RagError::IndexUnavailable(format!(
            "Embedding failed after {} retries: {}",
            self.max_retries, last_error
        )))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Hashing Embedding
// ============================================================================

/// 결정적 feature-hashing 임베딩
///
/// 소문자 토큰(단어)과 인접 토큰쌍을 부호 있는 버킷에 더한 뒤 L2 정규화합니다.
/// 같은 단어를 많이 공유하는 텍스트일수록 코사인 유사도가 높습니다.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    dimension: usize,
    name: String,
}

impl HashingEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            name: format!("hashing-{}", dimension.max(1)),
        }
    }

    /// 동기 임베딩 (async 래퍼 없이 사용)
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            self.add_feature(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let joined = format!("{} {}", pair[0], pair[1]);
            self.add_feature(&mut vector, joined.as_bytes(), 0.5);
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let hash = fnv1a(feature);
        let bucket = (hash % self.dimension as u64) as usize;
        let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign * weight;
    }
}

/// FNV-1a 64bit
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes
        .iter()
        .fold(OFFSET, |h, &b| (h ^ u64::from(b)).wrapping_mul(PRIME))
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match config.backend {
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedding::new(config)?),
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedding::new(config.dimension)),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::cosine_similarity;

    #[tokio::test]
    async fn test_hashing_deterministic_and_normalized() {
        let e = HashingEmbedding::new(64);
        let a = e.embed("Outstanding loan amount").await.unwrap();
        let b = e.embed("outstanding LOAN amount").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_hashing_similarity_ranks_shared_words() {
        let e = HashingEmbedding::new(256);
        let q = e.embed_sync("outstanding loan amount");
        let near = e.embed_sync("The outstanding loan amount is 45000");
        let far = e.embed_sync("Aadhaar card issued by UIDAI for address proof");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_hashing_empty_text_is_zero() {
        let e = HashingEmbedding::new(16);
        assert!(e.embed_sync("  ...  ").iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_create_embedder_backends() {
        let mut config = EmbeddingConfig {
            backend: EmbeddingBackend::Hashing,
            dimension: 32,
            ..EmbeddingConfig::default()
        };
        let embedder = create_embedder(&config).unwrap();
        assert_eq!(embedder.dimension(), 32);
        assert_eq!(embedder.name(), "hashing-32");

        config.backend = EmbeddingBackend::Ollama;
        assert!(create_embedder(&config).is_ok());

        config.dimension = 0;
        assert!(create_embedder(&config).is_err());
    }

    #[tokio::test]
    async fn test_ollama_unreachable_is_index_unavailable() {
        let config = EmbeddingConfig {
            host: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..EmbeddingConfig::default()
        };
        let mut embedder = OllamaEmbedding::new(&config).unwrap();
        embedder.max_retries = 0;
        let result = embedder.embed("hello").await;
        assert!(matches!(result, Err(RagError::IndexUnavailable(_))));
    }
}
