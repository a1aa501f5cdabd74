//! Embedding Index - 청크 임베딩 + 벡터 저장소 어댑터
//!
//! 임베딩은 (내용 해시, 모델) 단위로 SQLite에 캐시되어
//! 재인덱싱 시 다시 계산하지 않습니다.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::chunker::Chunk;
use super::store::KnowledgeStore;
use super::vector::{SearchResult, VectorEntry, VectorStore};
use crate::embedding::EmbeddingProvider;
use crate::error::{Degradation, RagError, Result};

/// 임베딩 요청당 청크 수
const EMBED_BATCH_SIZE: usize = 32;

// ============================================================================
// IndexOutcome
// ============================================================================

/// 인덱싱 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexOutcome {
    /// 모든 청크 인덱싱 완료
    Indexed {
        chunks: usize,
        /// 캐시에서 재사용한 임베딩 수
        cached: usize,
    },
    /// 인덱싱할 청크 없음
    Empty,
    /// 임베딩/벡터 저장소 장애로 생략
    Degraded { degradation: Degradation },
}

impl IndexOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

// ============================================================================
// EmbeddingIndex
// ============================================================================

/// 청크 인덱스
#[derive(Clone)]
pub struct EmbeddingIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    vectors: Arc<dyn VectorStore>,
    store: KnowledgeStore,
    timeout: Duration,
}

impl EmbeddingIndex {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        store: KnowledgeStore,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            vectors,
            store,
            timeout,
        }
    }

    /// 임베딩 모델 이름
    pub fn model(&self) -> &str {
        self.embedder.name()
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vectors
    }

    /// 문서 청크 인덱싱 (기존 벡터 교체)
    ///
    /// 장애는 에러가 아니라 `IndexOutcome::Degraded`로 돌려줍니다.
    pub async fn index(&self, document_id: &str, chunks: &[Chunk]) -> IndexOutcome {
        if chunks.is_empty() {
            if let Err(e) = self.vectors.delete_by_document(document_id).await {
                debug!("No stale vectors removed for {}: {}", document_id, e);
            }
            return IndexOutcome::Empty;
        }

        match self.try_index(document_id, chunks).await {
            Ok((count, cached)) => {
                info!(
                    "Indexed {} chunks for {} ({} from cache)",
                    count, document_id, cached
                );
                IndexOutcome::Indexed {
                    chunks: count,
                    cached,
                }
            }
            Err(e) => {
                warn!("Indexing degraded for {}: {}", document_id, e);
                IndexOutcome::Degraded {
                    degradation: Degradation::IndexUnavailable(e.to_string()),
                }
            }
        }
    }

    async fn try_index(&self, document_id: &str, chunks: &[Chunk]) -> Result<(usize, usize)> {
        let model = self.embedder.name().to_string();
        let dimension = self.embedder.dimension();

        // 1. 캐시 조회
        let mut embeddings: Vec<Option<Vec<f32>>> = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let cached = match self.store.cached_embedding(&chunk.content_hash, &model) {
                Ok(v) => v.filter(|e| e.len() == dimension),
                Err(e) => {
                    warn!("Embedding cache read failed: {}", e);
                    None
                }
            };
            embeddings.push(cached);
        }
        let cached = embeddings.iter().filter(|e| e.is_some()).count();

        // 2. 누락분 임베딩
        let missing: Vec<usize> = (0..chunks.len()).filter(|&i| embeddings[i].is_none()).collect();
        for batch in missing.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch.iter().map(|&i| chunks[i].text.clone()).collect();
            let vectors = self
                .with_timeout("embedding", self.embedder.embed_batch(&texts))
                .await?;

            if vectors.len() != batch.len() {
                return Err(RagError::IndexUnavailable(format!(
                    "Embedder returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                )));
            }

            for (&i, vector) in batch.iter().zip(vectors) {
                if let Err(e) = self
                    .store
                    .cache_embedding(&chunks[i].content_hash, &model, &vector)
                {
                    warn!("Embedding cache write failed: {}", e);
                }
                embeddings[i] = Some(vector);
            }
        }

        // 3. 벡터 교체
        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(embeddings)
            .filter_map(|(chunk, embedding)| {
                embedding.map(|embedding| VectorEntry {
                    chunk_id: chunk.id(document_id),
                    document_id: document_id.to_string(),
                    chunk_index: chunk.index as i32,
                    chunk_text: chunk.text.clone(),
                    embedding,
                })
            })
            .collect();

        self.with_timeout("vector delete", self.vectors.delete_by_document(document_id))
            .await?;
        let inserted = self
            .with_timeout("vector upsert", self.vectors.upsert_batch(&entries))
            .await?;

        Ok((inserted, cached))
    }

    /// 질의 텍스트로 검색 (유사도 내림차순)
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 {
            return Ok(vec![]);
        }

        let embedding = self
            .with_timeout("query embedding", self.embedder.embed(text))
            .await?;
        let results = self
            .with_timeout("vector search", self.vectors.search(&embedding, k))
            .await?;

        debug!("Vector search returned {} hits", results.len());
        Ok(results)
    }

    /// 문서 벡터 삭제
    pub async fn remove(&self, document_id: &str) -> Result<usize> {
        self.with_timeout("vector delete", self.vectors.delete_by_document(document_id))
            .await
    }

    /// 외부 호출 타임아웃
    async fn with_timeout<T, F>(&self, what: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result.map_err(|e| match e {
                RagError::IndexUnavailable(_) => e,
                other => RagError::IndexUnavailable(format!("{} failed: {}", what, other)),
            }),
            Err(_) => Err(RagError::IndexUnavailable(format!(
                "{} timed out after {:?}",
                what, self.timeout
            ))),
        }
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
    use crate::embedding::HashingEmbedding;
    use crate::knowledge::{chunk_text, InMemoryVectorStore};

    /// 호출 횟수를 세는 임베더
    struct CountingEmbedder {
        inner: HashingEmbedding,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text).await
        }

        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(RagError::IndexUnavailable("connection refused".into()))
        }

        fn dimension(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0; 8])
        }

        fn dimension(&self) -> usize {
            8
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn index_with(embedder: Arc<dyn EmbeddingProvider>, timeout: Duration) -> EmbeddingIndex {
        EmbeddingIndex::new(
            embedder,
            Arc::new(InMemoryVectorStore::new()),
            KnowledgeStore::open_in_memory().unwrap(),
            timeout,
        )
    }

    #[tokio::test]
    async fn test_index_and_query() {
        let index = index_with(Arc::new(HashingEmbedding::new(128)), Duration::from_secs(5));
        let chunks = chunk_text(
            "The outstanding loan amount is 45000. Aadhaar verification pending for the applicant.",
            40,
            5,
        )
        .unwrap();

        let outcome = index.index("doc-1", &chunks).await;
        assert_eq!(
            outcome,
            IndexOutcome::Indexed {
                chunks: chunks.len(),
                cached: 0
            }
        );

        let hits = index.query("outstanding loan amount", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk_id, "doc-1:0");
    }

    #[tokio::test]
    async fn test_reindex_uses_cache() {
        let embedder = Arc::new(CountingEmbedder {
            inner: HashingEmbedding::new(32),
            calls: AtomicUsize::new(0),
        });
        let index = index_with(embedder.clone(), Duration::from_secs(5));
        let chunks = chunk_text(&"salary slip net pay ".repeat(10), 50, 10).unwrap();

        index.index("doc-1", &chunks).await;
        let first_calls = embedder.calls.load(Ordering::SeqCst);
        assert_eq!(first_calls, chunks.len());

        let outcome = index.index("doc-1", &chunks).await;
        assert_eq!(embedder.calls.load(Ordering::SeqCst), first_calls);
        assert_eq!(
            outcome,
            IndexOutcome::Indexed {
                chunks: chunks.len(),
                cached: chunks.len()
            }
        );
        assert_eq!(index.vector_store().count().await.unwrap(), chunks.len());
    }

    #[tokio::test]
    async fn test_failing_embedder_degrades() {
        let index = index_with(Arc::new(FailingEmbedder), Duration::from_secs(5));
        let chunks = chunk_text("some text", 100, 0).unwrap();

        assert!(index.index("doc-1", &chunks).await.is_degraded());
        assert!(matches!(
            index.query("text", 3).await,
            Err(RagError::IndexUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let index = index_with(Arc::new(SlowEmbedder), Duration::from_millis(50));
        let chunks = chunk_text("some text", 100, 0).unwrap();
        assert!(index.index("doc-1", &chunks).await.is_degraded());
    }

    #[tokio::test]
    async fn test_empty_chunks() {
        let index = index_with(Arc::new(HashingEmbedding::new(8)), Duration::from_secs(1));
        assert_eq!(index.index("doc-1", &[]).await, IndexOutcome::Empty);
    }
}
