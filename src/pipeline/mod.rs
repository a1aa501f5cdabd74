//! Pipeline 모듈 - 수집/질의 오케스트레이션
//!
//! 수집: 파싱 → 정규화 → 분류/추출 → 저장 → 청크 분할 → 인덱싱
//! 질의: 검색 → 응답 생성 → 질의 로그
//!
//! 같은 문서 id에 대한 쓰기는 [`DocumentLocks`]로 직렬화됩니다.
//! 인덱스/LLM 장애는 [`Degradation`]으로 기록하고 계속 진행합니다.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use crate::answer::AnswerComposer;
use crate::collector::FileCollector;
use crate::config::RagConfig;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::entities::{DocumentType, EntityExtractor, EntityType, QualityScore};
use crate::error::{Degradation, RagError, Result};
use crate::extractor::extract_text;
use crate::knowledge::{
    Chunker, EmbeddingIndex, IndexOutcome, IndexStatus, KnowledgeStore, LanceVectorStore,
    NewDocument, QueryResult, Retriever, StoreStats, VectorStore, WindowChunker,
};
use crate::llm::{LanguageModel, OllamaClient};
use crate::normalizer::normalize;

// ============================================================================
// DocumentLocks
// ============================================================================

/// 문서 id별 비동기 락 레지스트리
#[derive(Debug, Default)]
pub struct DocumentLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DocumentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 문서 락 획득 (guard drop 시 해제)
    pub async fn lock(&self, document_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // 대기자가 없는 락 정리
            locks.retain(|id, l| id == document_id || Arc::strong_count(l) > 1);
            locks
                .entry(document_id.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// 등록된 락 수
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Reports
// ============================================================================

/// 문서 수집 결과
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document_id: String,
    pub filename: String,
    pub doc_type: DocumentType,
    pub quality: QualityScore,
    /// 유형별 저장된 엔티티 수
    pub entity_counts: BTreeMap<EntityType, usize>,
    pub valid_entities: usize,
    /// 유형별 검증 실패 수
    pub validation_failures: BTreeMap<EntityType, usize>,
    pub chunks: usize,
    pub index: IndexOutcome,
    pub degradations: Vec<Degradation>,
    pub elapsed_ms: u64,
}

/// 디렉토리 수집 중 파일 하나의 결과
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<IngestReport>,
}

/// 엔진 상태
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub store: StoreStats,
    pub vector_store: String,
    /// 벡터 저장소 장애 시 `None`
    pub indexed_vectors: Option<usize>,
    pub embedder: String,
    pub llm_model: Option<String>,
    pub llm_available: bool,
}

// ============================================================================
// RagEngine
// ============================================================================

/// 수집/질의 엔진
pub struct RagEngine {
    config: RagConfig,
    store: KnowledgeStore,
    extractor: EntityExtractor,
    chunker: WindowChunker,
    index: EmbeddingIndex,
    retriever: Retriever,
    composer: AnswerComposer,
    llm: Option<Arc<dyn LanguageModel>>,
    locks: DocumentLocks,
}

impl RagEngine {
    /// 구성 요소로 엔진 조립
    pub fn new(
        config: RagConfig,
        store: KnowledgeStore,
        embedder: Arc<dyn EmbeddingProvider>,
        vectors: Arc<dyn VectorStore>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Result<Self> {
        config.validate()?;

        let chunker = WindowChunker::new(config.chunk)?;
        let index = EmbeddingIndex::new(
            embedder,
            vectors,
            store.clone(),
            Duration::from_secs(config.embedding.timeout_secs),
        );
        let retriever = Retriever::new(index.clone(), store.clone(), config.retrieval.clone());
        let composer = AnswerComposer::new(llm.clone(), &config.llm, &config.retrieval);

        Ok(Self {
            extractor: EntityExtractor::new(config.min_classification_hits),
            config,
            store,
            chunker,
            index,
            retriever,
            composer,
            llm,
            locks: DocumentLocks::new(),
        })
    }

    /// 설정대로 SQLite + LanceDB + Ollama 엔진 열기
    pub async fn open(config: RagConfig) -> Result<Self> {
        config.validate()?;
        tokio::fs::create_dir_all(&config.data_dir).await?;

        let store = KnowledgeStore::open(&config.db_path())?;
        let embedder = create_embedder(&config.embedding)?;
        let vectors: Arc<dyn VectorStore> =
            Arc::new(LanceVectorStore::open(&config.lance_path(), embedder.dimension()).await?);
        let llm: Option<Arc<dyn LanguageModel>> = if config.llm.enabled {
            Some(Arc::new(OllamaClient::new(&config.llm)?))
        } else {
            None
        };

        info!(
            "Engine opened at {:?} (embedder: {}, llm: {})",
            config.data_dir,
            embedder.name(),
            llm.as_ref().map(|m| m.name()).unwrap_or("disabled")
        );
        Self::new(config, store, embedder, vectors, llm)
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store(&self) -> &KnowledgeStore {
        &self.store
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn composer(&self) -> &AnswerComposer {
        &self.composer
    }

    // ------------------------------------------------------------------------
    // Ingestion
    // ------------------------------------------------------------------------

    /// 파일 수집
    pub async fn ingest_file(&self, path: &Path) -> Result<IngestReport> {
        let file_size = tokio::fs::metadata(path)
            .await
            .map_err(|e| RagError::parse(path, format!("Failed to read file: {}", e)))?
            .len();
        let raw = extract_text(path).await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.ingest(NewDocumentInput {
            filename,
            file_path: Some(path.display().to_string()),
            file_size,
            raw,
        })
        .await
    }

    /// 텍스트 직접 수집
    pub async fn ingest_text(&self, filename: &str, text: &str) -> Result<IngestReport> {
        self.ingest(NewDocumentInput {
            filename: filename.to_string(),
            file_path: None,
            file_size: text.len() as u64,
            raw: text.to_string(),
        })
        .await
    }

    /// 디렉토리 재귀 수집 (파일별 실패는 결과에 기록)
    pub async fn ingest_directory(&self, dir: &Path) -> Result<Vec<FileOutcome>> {
        let files = FileCollector::with_max_size(self.config.max_file_size).collect_directory(dir)?;

        let mut outcomes = Vec::with_capacity(files.len());
        for file in files {
            let result = self.ingest_file(&file.path).await;
            if let Err(e) = &result {
                warn!("Skipping {:?}: {}", file.path, e);
            }
            outcomes.push(FileOutcome {
                path: file.path,
                result,
            });
        }
        Ok(outcomes)
    }

    async fn ingest(&self, input: NewDocumentInput) -> Result<IngestReport> {
        let started = Instant::now();
        let normalized = normalize(&input.raw);
        if normalized.trim().is_empty() {
            return Err(RagError::parse(&input.filename, "No extractable text"));
        }

        let report = self.extractor.extract_document(&input.raw, &normalized);
        let id = self.store.insert_document(&NewDocument {
            filename: input.filename.clone(),
            file_path: input.file_path,
            file_size: input.file_size,
            doc_type: report.doc_type(),
            raw_text: input.raw,
            normalized_text: normalized.clone(),
            quality_score: report.quality.score,
        })?;

        let _guard = self.locks.lock(&id).await;
        match self
            .process(&id, &input.filename, &normalized, report, started)
            .await
        {
            Ok(report) => Ok(report),
            Err(e) => {
                // 엔티티/청크 없는 문서를 남기지 않음
                warn!("Ingest of {} failed, removing document {}: {}", input.filename, id, e);
                if let Err(cleanup) = self.index.remove(&id).await {
                    warn!("Vector cleanup failed for {}: {}", id, cleanup);
                }
                if let Err(cleanup) = self.store.delete_document(&id) {
                    warn!("Document cleanup failed for {}: {}", id, cleanup);
                }
                Err(e)
            }
        }
    }

    /// 저장된 원문으로 추출/청크/인덱스 재계산
    pub async fn reprocess(&self, document_id: &str) -> Result<IngestReport> {
        let started = Instant::now();
        let _guard = self.locks.lock(document_id).await;

        let doc = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| RagError::NotFound(document_id.to_string()))?;

        let normalized = normalize(&doc.raw_text);
        let report = self.extractor.extract_document(&doc.raw_text, &normalized);
        self.process(&doc.id, &doc.filename, &normalized, report, started)
            .await
    }

    async fn process(
        &self,
        id: &str,
        filename: &str,
        normalized: &str,
        report: crate::entities::ExtractionReport,
        started: Instant,
    ) -> Result<IngestReport> {
        self.store
            .update_processing(id, report.doc_type(), report.quality.score)?;
        self.store.replace_entities(id, &report.entities)?;

        let chunks = self.chunker.chunk(normalized);
        self.store.replace_chunks(id, &chunks)?;

        let outcome = self.index.index(id, &chunks).await;
        let (status, degradations) = match &outcome {
            IndexOutcome::Indexed { .. } => (IndexStatus::Indexed, vec![]),
            IndexOutcome::Empty => (IndexStatus::Empty, vec![]),
            IndexOutcome::Degraded { degradation } => {
                (IndexStatus::Degraded, vec![degradation.clone()])
            }
        };
        self.store.set_index_status(id, status)?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        info!(
            "Processed {} ({}): type={}, quality={:.2}, entities={}, chunks={}, index={} in {}ms",
            filename,
            id,
            report.doc_type(),
            report.quality.score,
            report.entities.len(),
            chunks.len(),
            status,
            elapsed_ms
        );

        Ok(IngestReport {
            document_id: id.to_string(),
            filename: filename.to_string(),
            doc_type: report.doc_type(),
            quality: report.quality,
            entity_counts: report.counts_by_type(),
            valid_entities: report.valid_count(),
            validation_failures: report.validation_failures,
            chunks: chunks.len(),
            index: outcome,
            degradations,
            elapsed_ms,
        })
    }

    /// 문서 삭제 (벡터 + 저장소)
    pub async fn delete(&self, document_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(document_id).await;

        if let Err(e) = self.index.remove(document_id).await {
            // 남은 벡터는 검색 시 문서 조회에서 걸러짐
            warn!("Vector removal failed for {}: {}", document_id, e);
        }
        let deleted = self.store.delete_document(document_id)?;
        if deleted {
            info!("Deleted document {}", document_id);
        }
        Ok(deleted)
    }

    // ------------------------------------------------------------------------
    // Query
    // ------------------------------------------------------------------------

    /// 질의 응답 (`k`가 `None`이면 설정값)
    pub async fn ask(
        &self,
        query: &str,
        k: Option<usize>,
        doc_type: Option<DocumentType>,
        use_llm: bool,
    ) -> Result<QueryResult> {
        let started = Instant::now();
        let k = k.unwrap_or(self.config.retrieval.top_k);

        let mut result = self.retriever.retrieve_filtered(query, k, doc_type).await?;
        let answer = self
            .composer
            .compose_with(query, &result.retrieved, use_llm)
            .await;
        if let Some(degradation) = answer.degradation() {
            result.degradations.push(degradation);
        }
        result.total_ms = started.elapsed().as_millis() as u64;

        let sources = serde_json::to_value(result.sources()).unwrap_or(serde_json::Value::Null);
        if let Err(e) = self
            .store
            .log_query(query, &answer.text(), &sources, result.total_ms)
        {
            warn!("Failed to log query: {}", e);
        }

        info!(
            "Answered query with {} hits ({}, {}ms)",
            result.hits().len(),
            if answer.is_generated() { "generated" } else { "excerpts" },
            result.total_ms
        );
        result.answer = Some(answer);
        Ok(result)
    }

    /// 엔진 상태
    pub async fn status(&self) -> Result<EngineStatus> {
        let store = self.store.stats()?;
        let vectors = self.index.vector_store();
        let indexed_vectors = match vectors.count().await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Vector store unavailable: {}", e);
                None
            }
        };
        let llm_available = match &self.llm {
            Some(llm) => llm.is_available().await,
            None => false,
        };

        Ok(EngineStatus {
            store,
            vector_store: vectors.name().to_string(),
            indexed_vectors,
            embedder: self.index.model().to_string(),
            llm_model: self.llm.as_ref().map(|m| m.name().to_string()),
            llm_available,
        })
    }

    pub fn stats(&self) -> Result<StoreStats> {
        self.store.stats()
    }
}

/// 수집 입력
struct NewDocumentInput {
    filename: String,
    file_path: Option<String>,
    file_size: u64,
    raw: String,
}

// ============================================================================
// Tests
// ============================================================================
