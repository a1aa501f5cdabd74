//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 청크 ID(`{document_id}:{index}`) 단위로 임베딩을 저장하고
//! 코사인 유사도로 검색합니다. 동점은 삽입 순서로 정렬합니다.

use std::cmp::Ordering;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 ID
    pub chunk_id: String,
    /// 문서 ID (documents.id)
    pub document_id: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub chunk_id: String,
    pub document_id: String,
    pub chunk_index: i32,
    pub chunk_text: String,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
    /// 삽입 순번 (동점 처리)
    pub seq: u64,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
/// 백엔드 장애는 `RagError::IndexUnavailable`로 보고합니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입 (같은 chunk_id가 있으면 교체)
    async fn upsert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (유사도 내림차순, 동점은 삽입 순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 문서의 벡터 삭제
    async fn delete_by_document(&self, document_id: &str) -> Result<usize>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 특정 문서의 임베딩 존재 여부
    async fn has_embeddings(&self, document_id: &str) -> Result<bool>;

    /// 저장소 이름 (로그용)
    fn name(&self) -> &'static str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 유사도 내림차순, 동점은 삽입 순
pub fn rank_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.seq.cmp(&b.seq))
    });
}

// ============================================================================
// InMemoryVectorStore
// ============================================================================

#[derive(Debug, Clone)]
struct StoredVector {
    entry: VectorEntry,
    seq: u64,
}

#[derive(Debug, Default)]
struct MemoryState {
    vectors: Vec<StoredVector>,
    next_seq: u64,
}

/// 메모리 벡터 저장소 (전수 코사인 검색)
///
/// 테스트와 소규모 데이터용입니다.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    state: RwLock<MemoryState>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn upsert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut state = self.state.write().await;
        for entry in entries {
            state.vectors.retain(|v| v.entry.chunk_id != entry.chunk_id);
            let seq = state.next_seq;
            state.next_seq += 1;
            state.vectors.push(StoredVector {
                entry: entry.clone(),
                seq,
            });
        }
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let state = self.state.read().await;
        let mut results: Vec<SearchResult> = state
            .vectors
            .iter()
            .map(|v| SearchResult {
                chunk_id: v.entry.chunk_id.clone(),
                document_id: v.entry.document_id.clone(),
                chunk_index: v.entry.chunk_index,
                chunk_text: v.entry.chunk_text.clone(),
                similarity: cosine_similarity(&v.entry.embedding, query_embedding),
                seq: v.seq,
            })
            .collect();

        rank_results(&mut results);
        results.truncate(limit);
        Ok(results)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        let mut state = self.state.write().await;
        let before = state.vectors.len();
        state.vectors.retain(|v| v.entry.document_id != document_id);
        Ok(before - state.vectors.len())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.vectors.len())
    }

    async fn has_embeddings(&self, document_id: &str) -> Result<bool> {
        let state = self.state.read().await;
        Ok(state.vectors.iter().any(|v| v.entry.document_id == document_id))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(doc: &str, index: i32, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            chunk_id: format!("{}:{}", doc, index),
            document_id: doc.to_string(),
            chunk_index: index,
            chunk_text: format!("chunk {} of {}", index, doc),
            embedding,
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatch() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_memory_search_order() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_batch(&[
                entry("a", 0, vec![0.0, 1.0]),
                entry("b", 0, vec![1.0, 0.0]),
                entry("c", 0, vec![1.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "b:0");
        assert_eq!(results[1].chunk_id, "c:0");
    }

    #[tokio::test]
    async fn test_memory_ties_by_insertion_order() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_batch(&[
                entry("z", 0, vec![1.0, 0.0]),
                entry("a", 0, vec![2.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results[0].chunk_id, "z:0");
        assert_eq!(results[1].chunk_id, "a:0");
    }

    #[tokio::test]
    async fn test_memory_upsert_replaces() {
        let store = InMemoryVectorStore::new();
        store.upsert_batch(&[entry("a", 0, vec![1.0])]).await.unwrap();
        store.upsert_batch(&[entry("a", 0, vec![1.0])]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_delete() {
        let store = InMemoryVectorStore::new();
        store
            .upsert_batch(&[
                entry("a", 0, vec![1.0]),
                entry("a", 1, vec![1.0]),
                entry("b", 0, vec![1.0]),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_document("a").await.unwrap(), 2);
        assert!(!store.has_embeddings("a").await.unwrap());
        assert!(store.has_embeddings("b").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
