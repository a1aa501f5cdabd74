//! Answer 모듈 - 검색 컨텍스트 → 응답
//!
//! 언어 모델이 있으면 프롬프트를 보내고, 없거나 실패하면
//! 상위 발췌를 그대로 돌려줍니다.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{LlmConfig, RetrievalConfig};
use crate::error::{Degradation, RagError};
use crate::knowledge::{RetrievedContext, EXCERPT_SEPARATOR};
use crate::llm::LanguageModel;

/// 검색 결과가 없을 때 응답
pub const NO_RESULTS_MESSAGE: &str = "No relevant documents found for your query.";

// ============================================================================
// AnswerResult
// ============================================================================

/// 원문 발췌
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Excerpt {
    pub document_id: String,
    pub filename: String,
    pub text: String,
}

impl Excerpt {
    /// 인용 머리말 (검색 컨텍스트와 같은 형식)
    pub fn citation(&self) -> String {
        format!("[Source: {} | doc {}]", self.filename, self.document_id)
    }
}

/// 응답
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnswerResult {
    /// 언어 모델 생성 응답
    Generated { text: String, model: String },
    /// 원문 발췌 (모델 미사용 또는 실패)
    RawExcerpts {
        excerpts: Vec<Excerpt>,
        /// 실패로 대체된 경우 그 이유
        reason: Option<String>,
    },
}

impl AnswerResult {
    /// 표시용 텍스트
    pub fn text(&self) -> String {
        match self {
            Self::Generated { text, .. } => text.clone(),
            Self::RawExcerpts { excerpts, .. } if excerpts.is_empty() => {
                NO_RESULTS_MESSAGE.to_string()
            }
            Self::RawExcerpts { excerpts, .. } => {
                let body = excerpts
                    .iter()
                    .map(|e| format!("{}\n{}", e.citation(), e.text))
                    .collect::<Vec<_>>()
                    .join(EXCERPT_SEPARATOR);
                format!("Relevant excerpts from your documents:\n\n{}", body)
            }
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Self::Generated { .. })
    }

    /// 생성 실패로 대체된 경우의 저하 기록
    pub fn degradation(&self) -> Option<Degradation> {
        match self {
            Self::RawExcerpts {
                reason: Some(reason),
                ..
            } => Some(Degradation::GenerationUnavailable(reason.clone())),
            _ => None,
        }
    }
}

// ============================================================================
// AnswerComposer
// ============================================================================

/// 프롬프트 생성
pub fn build_prompt(query: &str, context: &str) -> String {
    format!(
        "You are a helpful banking document assistant. Answer the user's question based ONLY on the provided context. \
If the information is not in the context, say \"I don't have that information in the uploaded documents.\"\n\n\
CONTEXT:\n{context}\n\n\
USER QUESTION: {query}\n\n\
INSTRUCTIONS:\n\
- Answer based only on the context above\n\
- Be concise and accurate\n\
- Cite the source document when possible\n\
- If you can't find the answer, say so clearly\n\n\
ANSWER:"
    )
}

/// 응답 생성기
#[derive(Clone)]
pub struct AnswerComposer {
    llm: Option<Arc<dyn LanguageModel>>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    max_excerpts: usize,
    /// 발췌 본문 전체의 문자 상한
    max_chars: usize,
}

impl AnswerComposer {
    pub fn new(
        llm: Option<Arc<dyn LanguageModel>>,
        llm_config: &LlmConfig,
        retrieval: &RetrievalConfig,
    ) -> Self {
        Self {
            llm,
            permits: Arc::new(Semaphore::new(llm_config.max_concurrent.max(1))),
            timeout: Duration::from_secs(llm_config.timeout_secs),
            max_excerpts: retrieval.max_excerpts,
            max_chars: retrieval.max_context_chars,
        }
    }

    /// 언어 모델 없이 발췌만 돌려주는 생성기
    pub fn excerpts_only(max_excerpts: usize) -> Self {
        Self {
            llm: None,
            permits: Arc::new(Semaphore::new(1)),
            timeout: Duration::from_secs(1),
            max_excerpts,
            max_chars: RetrievalConfig::default().max_context_chars,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 응답 생성 (`use_llm = false`면 발췌만)
    pub async fn compose(&self, query: &str, retrieved: &RetrievedContext) -> AnswerResult {
        self.compose_with(query, retrieved, true).await
    }

    pub async fn compose_with(
        &self,
        query: &str,
        retrieved: &RetrievedContext,
        use_llm: bool,
    ) -> AnswerResult {
        if retrieved.is_empty() {
            return AnswerResult::RawExcerpts {
                excerpts: vec![],
                reason: None,
            };
        }

        let llm = match (&self.llm, use_llm) {
            (Some(llm), true) => llm,
            _ => return self.raw_excerpts(retrieved, None),
        };

        match self.generate(llm.as_ref(), query, &retrieved.context).await {
            Ok(text) => AnswerResult::Generated {
                text,
                model: llm.name().to_string(),
            },
            Err(e) => {
                warn!("Falling back to raw excerpts: {}", e);
                self.raw_excerpts(retrieved, Some(e.to_string()))
            }
        }
    }

    async fn generate(
        &self,
        llm: &dyn LanguageModel,
        query: &str,
        context: &str,
    ) -> crate::error::Result<String> {
        let prompt = build_prompt(query, context);
        let permits = self.permits.clone();

        // 퍼밋은 future와 함께 해제 (타임아웃으로 drop될 때 포함)
        let call = async move {
            let _permit = permits.acquire_owned().await.map_err(|e| {
                RagError::GenerationUnavailable(format!("Generation permits closed: {}", e))
            })?;
            debug!("Generating answer with {}", llm.name());
            llm.generate(&prompt).await
        };

        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| match e {
                RagError::GenerationUnavailable(_) => e,
                other => RagError::GenerationUnavailable(other.to_string()),
            }),
            Err(_) => Err(RagError::GenerationUnavailable(format!(
                "Language model timed out after {:?}",
                self.timeout
            ))),
        }
    }

    /// 상위 청크를 원문 그대로 발췌 (전체가 `max_chars`를 넘으면 마지막 발췌만 자름)
    fn raw_excerpts(&self, retrieved: &RetrievedContext, reason: Option<String>) -> AnswerResult {
        let mut remaining = self.max_chars;
        let mut excerpts = Vec::new();
        for hit in retrieved.hits.iter().take(self.max_excerpts) {
            if remaining == 0 {
                break;
            }
            let len = hit.text.chars().count();
            let text = if len <= remaining {
                hit.text.clone()
            } else {
                hit.text.chars().take(remaining).collect()
            };
            remaining = remaining.saturating_sub(len);
            excerpts.push(Excerpt {
                document_id: hit.document_id.clone(),
                filename: hit.filename.clone(),
                text,
            });
        }
        AnswerResult::RawExcerpts { excerpts, reason }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::entities::DocumentType;
    use crate::error::Result;
    use crate::knowledge::{assemble, RetrievedChunk};

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(format!("prompt had {} chars", prompt.len()))
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    struct DownModel;

    #[async_trait]
    impl LanguageModel for DownModel {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(RagError::GenerationUnavailable("connection refused".into()))
        }

        async fn is_available(&self) -> bool {
            false
        }

        fn name(&self) -> &str {
            "down"
        }
    }

    /// 동시 실행 수 최대값을 기록하는 모델
    struct ConcurrencyTracker {
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for ConcurrencyTracker {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(30)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok("ok".into())
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "tracker"
        }
    }

    fn context(n: usize) -> RetrievedContext {
        let hits = (0..n)
            .map(|i| RetrievedChunk {
                chunk_id: format!("doc-{}:0", i),
                document_id: format!("doc-{}", i),
                filename: format!("file{}.txt", i),
                doc_type: DocumentType::LoanApplication,
                chunk_index: 0,
                text: format!("excerpt number {} amount 45000", i),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect();
        assemble(hits, 4000)
    }

    fn composer(llm: Arc<dyn LanguageModel>) -> AnswerComposer {
        AnswerComposer::new(Some(llm), &LlmConfig::default(), &RetrievalConfig::default())
    }

    #[test]
    fn test_prompt_contains_query_and_context() {
        let prompt = build_prompt("What is the loan amount?", "[Source: a.txt | doc 1]\nRs. 45000");
        assert!(prompt.contains("USER QUESTION: What is the loan amount?"));
        assert!(prompt.contains("CONTEXT:\n[Source: a.txt | doc 1]\nRs. 45000"));
        assert!(prompt.ends_with("ANSWER:"));
    }

    #[tokio::test]
    async fn test_generated_answer() {
        let answer = composer(Arc::new(EchoModel)).compose("q", &context(2)).await;
        assert!(answer.is_generated());
        assert!(answer.degradation().is_none());
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_excerpts() {
        let answer = composer(Arc::new(DownModel)).compose("q", &context(5)).await;
        match &answer {
            AnswerResult::RawExcerpts { excerpts, reason } => {
                assert_eq!(excerpts.len(), 3);
                assert_eq!(excerpts[0].document_id, "doc-0");
                assert!(reason.as_deref().unwrap_or_default().contains("connection refused"));
            }
            other => panic!("unexpected answer: {:?}", other),
        }
        assert!(matches!(
            answer.degradation(),
            Some(Degradation::GenerationUnavailable(_))
        ));
        assert!(answer.text().contains("[Source: file0.txt | doc doc-0]"));
    }

    #[tokio::test]
    async fn test_fallback_keeps_full_chunk_and_doc_id() {
        let long_text = format!("{} outstanding 45000 at the end", "loan terms ".repeat(100));
        assert!(long_text.chars().count() > 1000);
        let hits = vec![
            RetrievedChunk {
                chunk_id: "d1:0".into(),
                document_id: "d1".into(),
                filename: "loan.txt".into(),
                doc_type: DocumentType::LoanApplication,
                chunk_index: 0,
                text: long_text.clone(),
                score: 0.9,
            },
            RetrievedChunk {
                chunk_id: "d2:0".into(),
                document_id: "d2".into(),
                filename: "loan.txt".into(),
                doc_type: DocumentType::LoanApplication,
                chunk_index: 0,
                text: "second upload".into(),
                score: 0.8,
            },
        ];
        let retrieved = assemble(hits, 4000);

        let answer = composer(Arc::new(DownModel)).compose("q", &retrieved).await;
        match &answer {
            AnswerResult::RawExcerpts { excerpts, .. } => {
                assert_eq!(excerpts.len(), 2);
                assert_eq!(excerpts[0].text, long_text);
            }
            other => panic!("unexpected answer: {:?}", other),
        }
        let text = answer.text();
        assert!(text.contains(&long_text));
        assert!(text.contains("[Source: loan.txt | doc d1]"));
        assert!(text.contains("[Source: loan.txt | doc d2]"));
    }

    #[tokio::test]
    async fn test_fallback_respects_char_budget() {
        let retrieval = RetrievalConfig {
            max_context_chars: 40,
            ..RetrievalConfig::default()
        };
        let llm: Arc<dyn LanguageModel> = Arc::new(DownModel);
        let composer = AnswerComposer::new(Some(llm), &LlmConfig::default(), &retrieval);
        let answer = composer.compose("q", &context(3)).await;
        match answer {
            AnswerResult::RawExcerpts { excerpts, .. } => {
                let total: usize = excerpts.iter().map(|e| e.text.chars().count()).sum();
                assert_eq!(total, 40);
                assert_eq!(excerpts[0].text, "excerpt number 0 amount 45000");
            }
            other => panic!("unexpected answer: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_without_model_no_degradation() {
        let answer = AnswerComposer::excerpts_only(3).compose("q", &context(1)).await;
        assert!(!answer.is_generated());
        assert!(answer.degradation().is_none());
        assert!(answer.text().contains("45000"));
    }

    #[tokio::test]
    async fn test_empty_context_message() {
        let answer = composer(Arc::new(EchoModel))
            .compose("q", &RetrievedContext::default())
            .await;
        assert_eq!(answer.text(), NO_RESULTS_MESSAGE);
    }

    #[tokio::test]
    async fn test_concurrency_limited_by_permits() {
        let tracker = Arc::new(ConcurrencyTracker {
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let config = LlmConfig {
            max_concurrent: 1,
            ..LlmConfig::default()
        };
        let composer =
            AnswerComposer::new(Some(tracker.clone()), &config, &RetrievalConfig::default());
        let ctx = context(1);

        let (a, b, c) = tokio::join!(
            composer.compose("a", &ctx),
            composer.compose("b", &ctx),
            composer.compose("c", &ctx)
        );
        assert!(a.is_generated() && b.is_generated() && c.is_generated());
        assert_eq!(tracker.peak.load(Ordering::SeqCst), 1);
    }
}
