//! LanceDB Vector Store - 디스크 기반 벡터 검색
//!
//! 코사인 거리(`1 - cos`)로 검색하고 유사도로 되돌려 줍니다.
//! `seq` 컬럼에 삽입 순번을 저장해 동점을 정렬합니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, Int64Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::DistanceType;
use tokio::sync::Mutex;
use tracing::debug;

use super::vector::{rank_results, SearchResult, VectorEntry, VectorStore};
use crate::error::{RagError, Result};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "chunks";

/// 동점 정렬을 위해 `limit` 너머로 더 가져오는 후보 수
const TIE_MARGIN: usize = 16;

/// 백엔드 에러 → `IndexUnavailable`
fn unavailable<E: std::fmt::Display>(context: &'static str) -> impl FnOnce(E) -> RagError {
    move |e| RagError::IndexUnavailable(format!("{}: {}", context, e))
}

/// 필터 문자열용 따옴표 이스케이프
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
    dimension: i32,
    last_seq: AtomicI64,
    /// 테이블 생성 직렬화
    create_lock: Mutex<()>,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `dimension` - 임베딩 차원 (테이블 스키마에 고정)
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| RagError::Config(format!("Invalid path encoding: {:?}", path)))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .map_err(unavailable("Failed to connect to LanceDB"))?;

        let dimension = i32::try_from(dimension)
            .map_err(|_| RagError::Config(format!("Embedding dimension too large: {}", dimension)))?;

        Ok(Self {
            db,
            dimension,
            last_seq: AtomicI64::new(0),
            create_lock: Mutex::new(()),
        })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("chunk_id", DataType::Utf8, false),
            Field::new("document_id", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new("seq", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 삽입 순번 예약 (프로세스 재시작 후에도 증가하도록 시각 기반)
    fn reserve_seq(&self, n: usize) -> i64 {
        let now = chrono::Utc::now().timestamp_micros().saturating_mul(1000);
        let mut current = self.last_seq.load(Ordering::SeqCst);
        loop {
            let base = now.max(current + 1);
            let next = base + n as i64;
            match self
                .last_seq
                .compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return base,
                Err(actual) => current = actual,
            }
        }
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[VectorEntry]) -> Result<RecordBatch> {
        if let Some(bad) = entries
            .iter()
            .find(|e| e.embedding.len() != self.dimension as usize)
        {
            return Err(RagError::IndexUnavailable(format!(
                "Embedding dimension mismatch for {}: expected {}, got {}",
                bad.chunk_id,
                self.dimension,
                bad.embedding.len()
            )));
        }

        let base_seq = self.reserve_seq(entries.len());

        let chunk_ids: Vec<&str> = entries.iter().map(|e| e.chunk_id.as_str()).collect();
        let document_ids: Vec<&str> = entries.iter().map(|e| e.document_id.as_str()).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let chunk_texts: Vec<&str> = entries.iter().map(|e| e.chunk_text.as_str()).collect();
        let seqs: Vec<i64> = (0..entries.len() as i64).map(|i| base_seq + i).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .map_err(unavailable("Failed to create embedding array"))?;

        RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(chunk_ids)),
                Arc::new(StringArray::from(document_ids)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(chunk_texts)),
                Arc::new(Int64Array::from(seqs)),
                Arc::new(embeddings_list),
            ],
        )
        .map_err(unavailable("Failed to create RecordBatch"))
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .map_err(unavailable("Failed to list tables"))?;
        Ok(names.iter().any(|n| n == TABLE_NAME))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(unavailable("Failed to open table"))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn upsert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = self.entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if !self.table_exists().await? {
            let _guard = self.create_lock.lock().await;
            // 잠금 대기 중 다른 작업이 만들었으면 추가 경로로
            if !self.table_exists().await? {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .map_err(unavailable("Failed to create table"))?;
                debug!("Created LanceDB table with {} vectors", entries.len());
                return Ok(entries.len());
            }
        }

        let table = self.open_table().await?;

        // 기존 청크 교체
        let ids = entries
            .iter()
            .map(|e| quote(&e.chunk_id))
            .collect::<Vec<_>>()
            .join(", ");
        table
            .delete(&format!("chunk_id IN ({})", ids))
            .await
            .map_err(unavailable("Failed to replace vectors"))?;

        table
            .add(batches)
            .execute()
            .await
            .map_err(unavailable("Failed to add vectors to table"))?;

        debug!("Upserted {} vectors into LanceDB", entries.len());
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 || !self.table_exists().await? {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let stream = table
            .vector_search(query_embedding.to_vec())
            .map_err(unavailable("Failed to create vector search"))?
            .distance_type(DistanceType::Cosine)
            .limit(limit.saturating_add(TIE_MARGIN))
            .execute()
            .await
            .map_err(unavailable("Failed to execute vector search"))?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .map_err(unavailable("Failed to read search results"))?;

        let mut search_results = Vec::new();

        for batch in batches {
            let column = |name: &'static str| {
                batch
                    .column_by_name(name)
                    .ok_or_else(|| RagError::IndexUnavailable(format!("Missing {} column", name)))
            };

            let chunk_ids = column("chunk_id")?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| RagError::IndexUnavailable("Bad chunk_id column".into()))?;
            let document_ids = column("document_id")?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| RagError::IndexUnavailable("Bad document_id column".into()))?;
            let chunk_indices = column("chunk_index")?
                .as_any()
                .downcast_ref::<Int32Array>()
                .ok_or_else(|| RagError::IndexUnavailable("Bad chunk_index column".into()))?;
            let chunk_texts = column("chunk_text")?
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| RagError::IndexUnavailable("Bad chunk_text column".into()))?;
            let seqs = column("seq")?
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| RagError::IndexUnavailable("Bad seq column".into()))?;
            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = column("_distance")?
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| RagError::IndexUnavailable("Bad _distance column".into()))?;

            for i in 0..batch.num_rows() {
                search_results.push(SearchResult {
                    chunk_id: chunk_ids.value(i).to_string(),
                    document_id: document_ids.value(i).to_string(),
                    chunk_index: chunk_indices.value(i),
                    chunk_text: chunk_texts.value(i).to_string(),
                    // 코사인 거리 → 유사도
                    similarity: 1.0 - distances.value(i),
                    seq: seqs.value(i).max(0) as u64,
                });
            }
        }

        rank_results(&mut search_results);
        search_results.truncate(limit);
        Ok(search_results)
    }

    async fn delete_by_document(&self, document_id: &str) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let filter = format!("document_id = {}", quote(document_id));

        let before = table
            .count_rows(Some(filter.clone()))
            .await
            .map_err(unavailable("Failed to count rows"))?;

        table
            .delete(&filter)
            .await
            .map_err(unavailable("Failed to delete vectors"))?;

        Ok(before)
    }

    async fn count(&self) -> Result<usize> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(unavailable("Failed to count rows"))
    }

    async fn has_embeddings(&self, document_id: &str) -> Result<bool> {
        if !self.table_exists().await? {
            return Ok(false);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(Some(format!("document_id = {}", quote(document_id))))
            .await
            .map_err(unavailable("Failed to count rows for document"))?;

        Ok(count > 0)
    }

    fn name(&self) -> &'static str {
        "lancedb"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DIM: usize = 8;

    fn create_test_entry(doc: &str, index: i32, axis: usize) -> VectorEntry {
        let mut embedding = vec![0.0; DIM];
        embedding[axis] = 1.0;
        VectorEntry {
            chunk_id: format!("{}:{}", doc, index),
            document_id: doc.to_string(),
            chunk_index: index,
            chunk_text: format!("Test chunk {} for doc {}", index, doc),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("test.lance"), DIM)
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 0);

        let entries = vec![create_test_entry("d1", 0, 0), create_test_entry("d1", 1, 1)];
        assert_eq!(store.upsert_batch(&entries).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        assert!(store.has_embeddings("d1").await.unwrap());
        assert!(!store.has_embeddings("missing").await.unwrap());

        // 같은 chunk_id 재삽입 → 교체
        store.upsert_batch(&entries).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_lance_search_cosine() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("search.lance"), DIM)
            .await
            .unwrap();

        store
            .upsert_batch(&[
                create_test_entry("d1", 0, 0),
                create_test_entry("d2", 0, 1),
                create_test_entry("d3", 0, 2),
            ])
            .await
            .unwrap();

        let mut query = vec![0.0; DIM];
        query[1] = 1.0;
        let results = store.search(&query, 2).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, "d2:0");
        assert!((results[0].similarity - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_lance_delete() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("delete.lance"), DIM)
            .await
            .unwrap();

        store
            .upsert_batch(&[
                create_test_entry("d1", 0, 0),
                create_test_entry("d1", 1, 1),
                create_test_entry("d2", 0, 2),
            ])
            .await
            .unwrap();

        assert_eq!(store.delete_by_document("d1").await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lance_dimension_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("dim.lance"), DIM)
            .await
            .unwrap();

        let mut bad = create_test_entry("d1", 0, 0);
        bad.embedding.push(0.0);
        assert!(matches!(
            store.upsert_batch(&[bad]).await,
            Err(RagError::IndexUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_first_upserts_share_table() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("race.lance"), DIM)
            .await
            .unwrap();

        let a = [create_test_entry("d1", 0, 0)];
        let b = [create_test_entry("d2", 0, 1)];
        let (ra, rb) = tokio::join!(store.upsert_batch(&a), store.upsert_batch(&b));

        assert_eq!(ra.unwrap(), 1);
        assert_eq!(rb.unwrap(), 1);
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(store.has_embeddings("d1").await.unwrap());
        assert!(store.has_embeddings("d2").await.unwrap());
    }

    #[tokio::test]
    async fn test_equal_scores_keep_insertion_order() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("ties.lance"), DIM)
            .await
            .unwrap();

        for doc in ["d1", "d2", "d3"] {
            store
                .upsert_batch(&[create_test_entry(doc, 0, 0)])
                .await
                .unwrap();
        }

        let mut query = vec![0.0; DIM];
        query[0] = 1.0;
        let results = store.search(&query, 2).await.unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["d1:0", "d2:0"]);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("it's"), "'it''s'");
    }
}
