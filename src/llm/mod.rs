//! LLM 모듈 - 로컬 Ollama 생성 API
//!
//! 타임아웃/동시성 제한은 호출 측([`crate::answer::AnswerComposer`])이 담당합니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{RagError, Result};

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트 → 응답 텍스트
    ///
    /// 실패는 `RagError::GenerationUnavailable`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 모델 사용 가능 여부
    async fn is_available(&self) -> bool;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// OllamaClient
// ============================================================================

/// Ollama `/api/generate` 클라이언트
///
/// source: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion
#[derive(Debug, Clone)]
pub struct OllamaClient {
    host: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        // 전체 타임아웃은 호출 측 tokio::time::timeout
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            client,
        })
    }

    /// 설치된 모델 목록 (`/api/tags`)
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.host))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|e| RagError::GenerationUnavailable(format!("Ollama not reachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(RagError::GenerationUnavailable(format!(
                "Ollama tags error ({})",
                response.status()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| RagError::GenerationUnavailable(format!("Bad tags response: {}", e)))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

/// 설정 모델(태그 제외 이름)이 목록에 있는지
fn model_installed(model: &str, installed: &[String]) -> bool {
    let base = model.split(':').next().unwrap_or(model);
    installed.iter().any(|name| name.contains(base))
}

#[async_trait]
impl LanguageModel for OllamaClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: self.max_tokens,
                temperature: 0.1,
            },
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.host))
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::GenerationUnavailable(format!("Ollama request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::GenerationUnavailable(format!(
                "Ollama generate error ({}): {}",
                status, body
            )));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            RagError::GenerationUnavailable(format!("Failed to parse generate response: {}", e))
        })?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(RagError::GenerationUnavailable("Empty response from model".into()));
        }
        Ok(text)
    }

    async fn is_available(&self) -> bool {
        match self.list_models().await {
            Ok(models) => model_installed(&self.model, &models),
            Err(e) => {
                tracing::debug!("{}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
