//! Retriever - 질의 → 상위 청크 + 인용 컨텍스트
//!
//! 1. 질의 정규화
//! 2. `k × candidate_multiplier` 후보 벡터 검색
//! 3. (선택) 재정렬
//! 4. 문서당 `per_document_cap`개 제한, `k`개로 자르기
//! 5. `max_context_chars` 이내 컨텍스트 조립

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use super::index::EmbeddingIndex;
use super::store::{DocumentSummary, KnowledgeStore};
use crate::answer::AnswerResult;
use crate::config::RetrievalConfig;
use crate::entities::DocumentType;
use crate::error::{Degradation, Result};
use crate::normalizer::normalize;

/// 컨텍스트 발췌 구분자
pub const EXCERPT_SEPARATOR: &str = "\n\n---\n\n";

// ============================================================================
// Types
// ============================================================================

/// 검색된 청크
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub filename: String,
    pub doc_type: DocumentType,
    pub chunk_index: usize,
    pub text: String,
    /// 유사도 (재정렬 시 재계산된 점수)
    pub score: f32,
}

impl RetrievedChunk {
    /// 인용 머리말
    pub fn citation(&self) -> String {
        format!("[Source: {} | doc {}]", self.filename, self.document_id)
    }
}

/// 출처 문서
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub document_id: String,
    pub filename: String,
    pub doc_type: DocumentType,
    /// 문서 내 최고 점수
    pub relevance: f32,
}

/// 검색 결과 (점수 내림차순) + 조립된 컨텍스트
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievedContext {
    pub hits: Vec<RetrievedChunk>,
    pub context: String,
    pub sources: Vec<SourceRef>,
}

impl RetrievedContext {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

/// 질의 결과
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub retrieved: RetrievedContext,
    /// `Retriever`는 비워 두고 `RagEngine::ask`가 채움
    pub answer: Option<AnswerResult>,
    pub degradations: Vec<Degradation>,
    pub search_ms: u64,
    pub total_ms: u64,
}

impl QueryResult {
    pub fn hits(&self) -> &[RetrievedChunk] {
        &self.retrieved.hits
    }

    pub fn sources(&self) -> &[SourceRef] {
        &self.retrieved.sources
    }
}

// ============================================================================
// Reranker
// ============================================================================

/// 검색 결과 재정렬 트레이트
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, hits: Vec<RetrievedChunk>) -> Result<Vec<RetrievedChunk>>;
}

/// 순서를 바꾸지 않는 재정렬기
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, hits: Vec<RetrievedChunk>) -> Result<Vec<RetrievedChunk>> {
        Ok(hits)
    }
}

/// 질의어 포함 비율을 섞는 재정렬기
///
/// `score = (1 - w)·similarity + w·(질의 토큰 중 청크에 있는 비율)`
#[derive(Debug, Clone, Copy)]
pub struct LexicalReranker {
    pub weight: f32,
}

impl Default for LexicalReranker {
    fn default() -> Self {
        Self { weight: 0.3 }
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

#[async_trait]
impl Reranker for LexicalReranker {
    async fn rerank(
        &self,
        query: &str,
        mut hits: Vec<RetrievedChunk>,
    ) -> Result<Vec<RetrievedChunk>> {
        let query_tokens = tokens(query);
        if query_tokens.is_empty() {
            return Ok(hits);
        }

        for hit in &mut hits {
            let chunk_tokens = tokens(&hit.text);
            let overlap = query_tokens.intersection(&chunk_tokens).count() as f32
                / query_tokens.len() as f32;
            hit.score = (1.0 - self.weight) * hit.score + self.weight * overlap;
        }

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(hits)
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// 검색기
#[derive(Clone)]
pub struct Retriever {
    index: EmbeddingIndex,
    store: KnowledgeStore,
    config: RetrievalConfig,
    reranker: Option<Arc<dyn Reranker>>,
}

impl Retriever {
    pub fn new(index: EmbeddingIndex, store: KnowledgeStore, config: RetrievalConfig) -> Self {
        let reranker: Option<Arc<dyn Reranker>> = if config.rerank {
            Some(Arc::new(LexicalReranker::default()))
        } else {
            None
        };
        Self {
            index,
            store,
            config,
            reranker,
        }
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// 상위 `k`개 검색
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<QueryResult> {
        self.retrieve_filtered(query, k, None).await
    }

    /// 문서 유형 필터 검색
    pub async fn retrieve_filtered(
        &self,
        query: &str,
        k: usize,
        doc_type: Option<DocumentType>,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let normalized = normalize(query);
        let mut degradations = Vec::new();

        let mut hits = Vec::new();
        if !normalized.is_empty() && k > 0 {
            let candidates = k * self.config.candidate_multiplier.max(1);
            match self.index.query(&normalized, candidates).await {
                Ok(results) => {
                    let mut summaries: HashMap<String, Option<DocumentSummary>> = HashMap::new();
                    for r in results {
                        if !summaries.contains_key(&r.document_id) {
                            let summary = self.store.get_summary(&r.document_id)?;
                            summaries.insert(r.document_id.clone(), summary);
                        }
                        // 저장소에서 지워진 문서의 잔여 벡터는 무시
                        let Some(Some(summary)) = summaries.get(&r.document_id) else {
                            continue;
                        };
                        if doc_type.is_some_and(|t| t != summary.doc_type) {
                            continue;
                        }
                        hits.push(RetrievedChunk {
                            chunk_id: r.chunk_id,
                            document_id: r.document_id,
                            filename: summary.filename.clone(),
                            doc_type: summary.doc_type,
                            chunk_index: r.chunk_index.max(0) as usize,
                            text: r.chunk_text,
                            score: r.similarity,
                        });
                    }
                }
                Err(e) => {
                    warn!("Retrieval degraded: {}", e);
                    degradations.push(Degradation::IndexUnavailable(e.to_string()));
                }
            }
        }
        let search_ms = started.elapsed().as_millis() as u64;

        if let Some(reranker) = &self.reranker {
            let original = hits.clone();
            hits = match reranker.rerank(&normalized, hits).await {
                Ok(reranked) => reranked,
                Err(e) => {
                    warn!("Rerank failed, keeping vector order: {}", e);
                    original
                }
            };
        }

        let hits = cap_per_document(hits, self.config.per_document_cap, k);
        let retrieved = assemble(hits, self.config.max_context_chars);

        debug!(
            "Retrieved {} chunks from {} documents in {}ms",
            retrieved.hits.len(),
            retrieved.sources.len(),
            search_ms
        );

        Ok(QueryResult {
            query: query.to_string(),
            retrieved,
            answer: None,
            degradations,
            search_ms,
            total_ms: started.elapsed().as_millis() as u64,
        })
    }
}

/// 문서당 개수 제한 후 `k`개로 자르기 (순서 유지)
fn cap_per_document(hits: Vec<RetrievedChunk>, cap: usize, k: usize) -> Vec<RetrievedChunk> {
    let mut per_doc: HashMap<String, usize> = HashMap::new();
    hits.into_iter()
        .filter(|h| {
            let n = per_doc.entry(h.document_id.clone()).or_insert(0);
            *n += 1;
            *n <= cap
        })
        .take(k)
        .collect()
}

/// 컨텍스트 문자열과 출처 목록 조립
pub fn assemble(hits: Vec<RetrievedChunk>, max_chars: usize) -> RetrievedContext {
    let mut context = String::new();
    let mut used = 0usize;
    let separator_len = EXCERPT_SEPARATOR.chars().count();

    for hit in &hits {
        let block = format!("{}\n{}", hit.citation(), hit.text);
        let block_len = block.chars().count();
        let extra = if context.is_empty() { 0 } else { separator_len };

        if used + extra + block_len <= max_chars {
            if extra > 0 {
                context.push_str(EXCERPT_SEPARATOR);
            }
            context.push_str(&block);
            used += extra + block_len;
        } else {
            if context.is_empty() {
                context = block.chars().take(max_chars).collect();
            }
            break;
        }
    }

    let mut sources: Vec<SourceRef> = Vec::new();
    for hit in &hits {
        match sources.iter_mut().find(|s| s.document_id == hit.document_id) {
            Some(source) => source.relevance = source.relevance.max(hit.score),
            None => sources.push(SourceRef {
                document_id: hit.document_id.clone(),
                filename: hit.filename.clone(),
                doc_type: hit.doc_type,
                relevance: hit.score,
            }),
        }
    }

    RetrievedContext {
        hits,
        context,
        sources,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::embedding::HashingEmbedding;
    use crate::knowledge::{chunk_text, InMemoryVectorStore, NewDocument};

    fn hit(doc: &str, index: usize, score: f32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: format!("{}:{}", doc, index),
            document_id: doc.to_string(),
            filename: format!("{}.txt", doc),
            doc_type: DocumentType::Unknown,
            chunk_index: index,
            text: text.to_string(),
            score,
        }
    }

    async fn setup(docs: &[(&str, DocumentType, &str)]) -> (Retriever, Vec<String>) {
        let store = KnowledgeStore::open_in_memory().unwrap();
        let index = EmbeddingIndex::new(
            Arc::new(HashingEmbedding::new(256)),
            Arc::new(InMemoryVectorStore::new()),
            store.clone(),
            Duration::from_secs(5),
        );

        let mut ids = Vec::new();
        for (name, doc_type, text) in docs {
            let id = store
                .insert_document(&NewDocument {
                    filename: name.to_string(),
                    file_path: None,
                    file_size: text.len() as u64,
                    doc_type: *doc_type,
                    raw_text: text.to_string(),
                    normalized_text: text.to_string(),
                    quality_score: 50.0,
                })
                .unwrap();
            let chunks = chunk_text(text, 60, 10).unwrap();
            store.replace_chunks(&id, &chunks).unwrap();
            index.index(&id, &chunks).await;
            ids.push(id);
        }

        let retriever = Retriever::new(index, store, RetrievalConfig::default());
        (retriever, ids)
    }

    #[tokio::test]
    async fn test_retrieve_ranks_relevant_chunk_first() {
        let (retriever, ids) = setup(&[
            (
                "kyc.txt",
                DocumentType::KycDocument,
                "Aadhaar and PAN card verified for address proof of the customer.",
            ),
            (
                "loan.txt",
                DocumentType::LoanApplication,
                "Home loan application. The outstanding loan amount is 45000.",
            ),
        ])
        .await;

        let result = retriever.retrieve("outstanding loan amount", 3).await.unwrap();
        assert!(result.degradations.is_empty());
        assert_eq!(result.hits()[0].document_id, ids[1]);
        assert!(result.retrieved.context.starts_with("[Source: loan.txt | doc "));
        assert!(result.answer.is_none());
    }

    #[tokio::test]
    async fn test_filter_by_doc_type() {
        let (retriever, ids) = setup(&[
            ("kyc.txt", DocumentType::KycDocument, "loan amount mentioned in kyc"),
            ("loan.txt", DocumentType::LoanApplication, "loan amount 45000"),
        ])
        .await;

        let result = retriever
            .retrieve_filtered("loan amount", 5, Some(DocumentType::KycDocument))
            .await
            .unwrap();
        assert!(!result.hits().is_empty());
        assert!(result.hits().iter().all(|h| h.document_id == ids[0]));
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let (retriever, _) = setup(&[("a.txt", DocumentType::Unknown, "anything")]).await;
        let result = retriever.retrieve("   ", 5).await.unwrap();
        assert!(result.hits().is_empty());
        assert!(result.retrieved.context.is_empty());
    }

    #[tokio::test]
    async fn test_custom_reranker_applied() {
        struct Reverse;

        #[async_trait]
        impl Reranker for Reverse {
            async fn rerank(
                &self,
                _query: &str,
                mut hits: Vec<RetrievedChunk>,
            ) -> Result<Vec<RetrievedChunk>> {
                hits.reverse();
                Ok(hits)
            }
        }

        let (retriever, ids) = setup(&[
            ("a.txt", DocumentType::Unknown, "outstanding loan amount 45000"),
            ("b.txt", DocumentType::Unknown, "aadhaar verification pending"),
        ])
        .await;

        let plain = retriever.retrieve("outstanding loan amount", 2).await.unwrap();
        assert_eq!(plain.hits()[0].document_id, ids[0]);

        let reversed = retriever
            .with_reranker(Arc::new(Reverse))
            .retrieve("outstanding loan amount", 2)
            .await
            .unwrap();
        assert_eq!(reversed.hits()[0].document_id, ids[1]);
    }

    #[test]
    fn test_cap_per_document() {
        let hits = vec![
            hit("a", 0, 0.9, "x"),
            hit("a", 1, 0.8, "x"),
            hit("a", 2, 0.7, "x"),
            hit("b", 0, 0.6, "x"),
            hit("c", 0, 0.5, "x"),
        ];
        let capped = cap_per_document(hits, 2, 3);
        let ids: Vec<&str> = capped.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["a:0", "a:1", "b:0"]);
    }

    #[test]
    fn test_assemble_respects_budget() {
        let hits = vec![
            hit("a", 0, 0.9, &"x".repeat(50)),
            hit("b", 0, 0.8, &"y".repeat(50)),
            hit("c", 0, 0.7, &"z".repeat(50)),
        ];
        let ctx = assemble(hits, 150);
        assert!(ctx.context.chars().count() <= 150);
        assert!(ctx.context.contains("[Source: a.txt | doc a]"));
        assert!(ctx.context.contains(EXCERPT_SEPARATOR));
        assert!(!ctx.context.contains("zzz"));
        assert_eq!(ctx.sources.len(), 3);
    }

    #[test]
    fn test_assemble_truncates_oversized_first_block() {
        let ctx = assemble(vec![hit("a", 0, 0.9, &"x".repeat(500))], 100);
        assert_eq!(ctx.context.chars().count(), 100);
    }

    #[test]
    fn test_sources_keep_best_relevance() {
        let ctx = assemble(
            vec![hit("a", 0, 0.9, "x"), hit("b", 0, 0.8, "y"), hit("a", 1, 0.4, "z")],
            1000,
        );
        assert_eq!(ctx.sources.len(), 2);
        assert_eq!(ctx.sources[0].document_id, "a");
        assert!((ctx.sources[0].relevance - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_lexical_reranker() {
        let hits = vec![
            hit("a", 0, 0.50, "aadhaar verification"),
            hit("b", 0, 0.45, "outstanding loan amount"),
        ];
        let reranked = LexicalReranker::default()
            .rerank("outstanding loan amount", hits)
            .await
            .unwrap();
        assert_eq!(reranked[0].document_id, "b");

        let same = NoOpReranker
            .rerank("q", vec![hit("a", 0, 0.1, "x"), hit("b", 0, 0.9, "x")])
            .await
            .unwrap();
        assert_eq!(same[0].document_id, "a");
    }
}
