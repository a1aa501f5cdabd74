//! Knowledge Store - rusqlite 기반 동기 문서 저장소
//!
//! 문서, 엔티티, 청크, 임베딩 캐시, 질의 로그를 저장합니다.
//! 엔티티/청크는 `ON DELETE CASCADE`로 문서와 함께 삭제됩니다.
//! 저장 위치: <data_local_dir>/.bankdoc-rag/bankdoc.db

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::chunker::Chunk;
use crate::entities::{DocumentType, Entity, EntityType};
use crate::error::Result;

/// DB 파일 이름
pub const DB_FILE_NAME: &str = "bankdoc.db";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (<data_local_dir>/.bankdoc-rag/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".bankdoc-rag")
}

// ============================================================================
// Types
// ============================================================================

/// 인덱싱 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    /// 저장 직후, 인덱싱 전
    Pending,
    Indexed,
    /// 임베딩/벡터 저장소 장애로 인덱싱 생략
    Degraded,
    /// 인덱싱할 청크 없음
    Empty,
}

impl IndexStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Indexed => "indexed",
            Self::Degraded => "degraded",
            Self::Empty => "empty",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "indexed" => Self::Indexed,
            "degraded" => Self::Degraded,
            "empty" => Self::Empty,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for IndexStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 저장된 문서 엔트리
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: String,
    pub filename: String,
    pub file_path: Option<String>,
    pub file_size: u64,
    pub doc_type: DocumentType,
    pub raw_text: String,
    pub normalized_text: String,
    pub quality_score: f64,
    pub index_status: IndexStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// 목록/검색용 문서 요약 (본문 제외)
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub filename: String,
    pub doc_type: DocumentType,
    pub quality_score: f64,
    pub index_status: IndexStatus,
    pub created_at: DateTime<Utc>,
}

/// 새 문서 입력용 구조체
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub filename: String,
    pub file_path: Option<String>,
    pub file_size: u64,
    pub doc_type: DocumentType,
    pub raw_text: String,
    pub normalized_text: String,
    pub quality_score: f64,
}

/// 저장된 청크
#[derive(Debug, Clone, Serialize)]
pub struct ChunkRecord {
    pub id: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub start: usize,
    pub end: usize,
    pub content: String,
    pub content_hash: String,
}

/// 엔티티 검색 결과
#[derive(Debug, Clone, Serialize)]
pub struct EntityHit {
    pub document_id: String,
    pub filename: String,
    pub entity: Entity,
}

/// 질의 로그
#[derive(Debug, Clone, Serialize)]
pub struct QueryLog {
    pub id: i64,
    pub query: String,
    pub response: String,
    pub sources: serde_json::Value,
    pub execution_ms: u64,
    pub created_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub total_documents: usize,
    pub documents_by_type: BTreeMap<String, usize>,
    pub average_quality: f64,
    pub total_entities: usize,
    pub total_chunks: usize,
    pub total_queries: usize,
    pub db_path: Option<PathBuf>,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

/// Knowledge Store - 동기 문서 저장소
///
/// 단일 SQLite 연결을 `Mutex`로 직렬화합니다.
#[derive(Clone)]
pub struct KnowledgeStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl KnowledgeStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: Some(path.to_path_buf()),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 데이터 디렉토리에서 열기 (<dir>/bankdoc.db)
    pub fn open_in_dir(data_dir: &Path) -> Result<Self> {
        if !data_dir.exists() {
            std::fs::create_dir_all(data_dir)?;
        }
        Self::open(&data_dir.join(DB_FILE_NAME))
    }

    /// 메모리 DB (테스트용)
    pub fn open_in_memory() -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(Connection::open_in_memory()?)),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock();

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                filename TEXT NOT NULL,
                file_path TEXT,
                file_size INTEGER NOT NULL DEFAULT 0,
                doc_type TEXT NOT NULL DEFAULT 'unknown',
                raw_text TEXT NOT NULL,
                normalized_text TEXT NOT NULL,
                quality_score REAL NOT NULL DEFAULT 0,
                index_status TEXT NOT NULL DEFAULT 'pending',
                created_at TEXT NOT NULL,
                processed_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type);

            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                entity_type TEXT NOT NULL,
                raw_text TEXT NOT NULL,
                value TEXT NOT NULL,
                is_valid INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entities_document ON entities(document_id);
            CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type);

            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                start_offset INTEGER NOT NULL,
                end_offset INTEGER NOT NULL,
                content TEXT NOT NULL,
                content_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id, chunk_index);

            CREATE TABLE IF NOT EXISTS embedding_cache (
                content_hash TEXT NOT NULL,
                model TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                embedding BLOB NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (content_hash, model)
            );

            CREATE TABLE IF NOT EXISTS query_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                query TEXT NOT NULL,
                response TEXT NOT NULL,
                sources TEXT NOT NULL,
                execution_ms INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )?;

        tracing::debug!("Knowledge store initialized at {:?}", self.db_path);
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    /// 문서 저장 (UUID v4 발급)
    pub fn insert_document(&self, doc: &NewDocument) -> Result<String> {
        let conn = self.lock();
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO documents (id, filename, file_path, file_size, doc_type, raw_text,
                                    normalized_text, quality_score, index_status, created_at,
                                    processed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                id,
                doc.filename,
                doc.file_path,
                doc.file_size as i64,
                doc.doc_type.as_str(),
                doc.raw_text,
                doc.normalized_text,
                doc.quality_score,
                IndexStatus::Pending.as_str(),
                now,
            ],
        )?;

        tracing::info!("Added document: {} (id={})", doc.filename, id);
        Ok(id)
    }

    /// ID로 문서 조회
    pub fn get_document(&self, id: &str) -> Result<Option<Document>> {
        let conn = self.lock();

        let doc = conn
            .query_row(
                "SELECT id, filename, file_path, file_size, doc_type, raw_text, normalized_text,
                        quality_score, index_status, created_at, processed_at
                 FROM documents WHERE id = ?1",
                params![id],
                row_to_document,
            )
            .optional()?;

        Ok(doc)
    }

    /// ID로 문서 요약 조회
    pub fn get_summary(&self, id: &str) -> Result<Option<DocumentSummary>> {
        let conn = self.lock();

        let summary = conn
            .query_row(
                "SELECT id, filename, doc_type, quality_score, index_status, created_at
                 FROM documents WHERE id = ?1",
                params![id],
                row_to_summary,
            )
            .optional()?;

        Ok(summary)
    }

    /// 문서 목록 조회 (최신순)
    pub fn list_documents(
        &self,
        limit: usize,
        doc_type: Option<DocumentType>,
    ) -> Result<Vec<DocumentSummary>> {
        let conn = self.lock();

        let mut stmt = conn.prepare(
            "SELECT id, filename, doc_type, quality_score, index_status, created_at
             FROM documents
             WHERE (?1 IS NULL OR doc_type = ?1)
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?2",
        )?;

        let docs = stmt
            .query_map(
                params![doc_type.map(|t| t.as_str()), limit as i64],
                row_to_summary,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(docs)
    }

    /// 재처리 결과 반영 (유형, 품질 점수, 처리 시각)
    pub fn update_processing(
        &self,
        id: &str,
        doc_type: DocumentType,
        quality_score: f64,
    ) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE documents SET doc_type = ?2, quality_score = ?3, processed_at = ?4
             WHERE id = ?1",
            params![id, doc_type.as_str(), quality_score, Utc::now().to_rfc3339()],
        )?;
        Ok(rows > 0)
    }

    /// 인덱싱 상태 갱신
    pub fn set_index_status(&self, id: &str, status: IndexStatus) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute(
            "UPDATE documents SET index_status = ?2 WHERE id = ?1",
            params![id, status.as_str()],
        )?;
        Ok(rows > 0)
    }

    /// 문서 삭제 (엔티티/청크 연쇄 삭제)
    pub fn delete_document(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        let rows = conn.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // ------------------------------------------------------------------------
    // Entities
    // ------------------------------------------------------------------------

    /// 문서의 엔티티 전체 교체
    pub fn replace_entities(&self, document_id: &str, entities: &[Entity]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "DELETE FROM entities WHERE document_id = ?1",
            params![document_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO entities (document_id, entity_type, raw_text, value, is_valid,
                                       start_offset, end_offset, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for e in entities {
                stmt.execute(params![
                    document_id,
                    e.entity_type.as_str(),
                    e.raw,
                    e.value,
                    e.valid,
                    e.start as i64,
                    e.end as i64,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(entities.len())
    }

    /// 문서의 엔티티 (오프셋 순)
    pub fn get_entities(&self, document_id: &str) -> Result<Vec<Entity>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT entity_type, raw_text, value, is_valid, start_offset, end_offset
             FROM entities WHERE document_id = ?1
             ORDER BY start_offset, id",
        )?;

        let entities = stmt
            .query_map(params![document_id], row_to_entity)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entities.into_iter().flatten().collect())
    }

    /// 엔티티 검색 (유형 및/또는 값 부분 일치)
    pub fn search_entities(
        &self,
        entity_type: Option<EntityType>,
        value_contains: Option<&str>,
        limit: usize,
    ) -> Result<Vec<EntityHit>> {
        let conn = self.lock();
        let pattern = value_contains.map(|v| format!("%{}%", v.to_lowercase()));

        let mut stmt = conn.prepare(
            "SELECT e.entity_type, e.raw_text, e.value, e.is_valid, e.start_offset,
                    e.end_offset, e.document_id, d.filename
             FROM entities e
             JOIN documents d ON d.id = e.document_id
             WHERE (?1 IS NULL OR e.entity_type = ?1)
               AND (?2 IS NULL OR LOWER(e.value) LIKE ?2 OR LOWER(e.raw_text) LIKE ?2)
             ORDER BY d.created_at DESC, e.start_offset
             LIMIT ?3",
        )?;

        let rows = stmt
            .query_map(
                params![entity_type.map(|t| t.as_str()), pattern, limit as i64],
                |row| {
                    let entity = row_to_entity(row)?;
                    let document_id: String = row.get(6)?;
                    let filename: String = row.get(7)?;
                    Ok(entity.map(|entity| EntityHit {
                        document_id,
                        filename,
                        entity,
                    }))
                },
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows.into_iter().flatten().collect())
    }

    // ------------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------------

    /// 문서의 청크 전체 교체
    pub fn replace_chunks(&self, document_id: &str, chunks: &[Chunk]) -> Result<usize> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();

        tx.execute(
            "DELETE FROM chunks WHERE document_id = ?1",
            params![document_id],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, document_id, chunk_index, start_offset, end_offset,
                                     content, content_hash, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for c in chunks {
                stmt.execute(params![
                    c.id(document_id),
                    document_id,
                    c.index as i64,
                    c.start as i64,
                    c.end as i64,
                    c.text,
                    c.content_hash,
                    now,
                ])?;
            }
        }

        tx.commit()?;
        Ok(chunks.len())
    }

    /// 문서의 청크 (인덱스 순)
    pub fn get_chunks(&self, document_id: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, document_id, chunk_index, start_offset, end_offset, content, content_hash
             FROM chunks WHERE document_id = ?1
             ORDER BY chunk_index",
        )?;

        let chunks = stmt
            .query_map(params![document_id], |row| {
                Ok(ChunkRecord {
                    id: row.get(0)?,
                    document_id: row.get(1)?,
                    chunk_index: row.get::<_, i64>(2)? as usize,
                    start: row.get::<_, i64>(3)? as usize,
                    end: row.get::<_, i64>(4)? as usize,
                    content: row.get(5)?,
                    content_hash: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(chunks)
    }

    // ------------------------------------------------------------------------
    // Embedding cache
    // ------------------------------------------------------------------------

    /// 캐시된 임베딩 조회
    pub fn cached_embedding(&self, content_hash: &str, model: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.lock();
        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT embedding FROM embedding_cache WHERE content_hash = ?1 AND model = ?2",
                params![content_hash, model],
                |row| row.get(0),
            )
            .optional()?;

        Ok(blob.map(|b| decode_embedding(&b)))
    }

    /// 임베딩 캐시 저장
    pub fn cache_embedding(&self, content_hash: &str, model: &str, embedding: &[f32]) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO embedding_cache (content_hash, model, dimension, embedding, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                content_hash,
                model,
                embedding.len() as i64,
                encode_embedding(embedding),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Query logs
    // ------------------------------------------------------------------------

    /// 질의 로그 기록
    pub fn log_query(
        &self,
        query: &str,
        response: &str,
        sources: &serde_json::Value,
        execution_ms: u64,
    ) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO query_logs (query, response, sources, execution_ms, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                query,
                response,
                sources.to_string(),
                execution_ms as i64,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// 최근 질의 로그
    pub fn recent_queries(&self, limit: usize) -> Result<Vec<QueryLog>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, query, response, sources, execution_ms, created_at
             FROM query_logs ORDER BY id DESC LIMIT ?1",
        )?;

        let logs = stmt
            .query_map(params![limit as i64], |row| {
                let sources: String = row.get(3)?;
                Ok(QueryLog {
                    id: row.get(0)?,
                    query: row.get(1)?,
                    response: row.get(2)?,
                    sources: serde_json::from_str(&sources).unwrap_or(serde_json::Value::Null),
                    execution_ms: row.get::<_, i64>(4)?.max(0) as u64,
                    created_at: parse_datetime(row.get::<_, String>(5)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(logs)
    }

    // ------------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------------

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock();

        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n.max(0) as usize)
        };

        let total_documents = count("SELECT COUNT(*) FROM documents")?;
        let total_entities = count("SELECT COUNT(*) FROM entities")?;
        let total_chunks = count("SELECT COUNT(*) FROM chunks")?;
        let total_queries = count("SELECT COUNT(*) FROM query_logs")?;

        let average_quality: f64 = conn.query_row(
            "SELECT COALESCE(AVG(quality_score), 0) FROM documents",
            [],
            |row| row.get(0),
        )?;

        let mut stmt =
            conn.prepare("SELECT doc_type, COUNT(*) FROM documents GROUP BY doc_type")?;
        let documents_by_type = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as usize))
            })?
            .collect::<rusqlite::Result<BTreeMap<_, _>>>()?;

        Ok(StoreStats {
            total_documents,
            documents_by_type,
            average_quality: (average_quality * 100.0).round() / 100.0,
            total_entities,
            total_chunks,
            total_queries,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        filename: row.get(1)?,
        file_path: row.get(2)?,
        file_size: row.get::<_, i64>(3)?.max(0) as u64,
        doc_type: parse_doc_type(&row.get::<_, String>(4)?),
        raw_text: row.get(5)?,
        normalized_text: row.get(6)?,
        quality_score: row.get(7)?,
        index_status: IndexStatus::parse(&row.get::<_, String>(8)?),
        created_at: parse_datetime(row.get::<_, String>(9)?),
        processed_at: row.get::<_, Option<String>>(10)?.map(parse_datetime),
    })
}

fn row_to_summary(row: &Row<'_>) -> rusqlite::Result<DocumentSummary> {
    Ok(DocumentSummary {
        id: row.get(0)?,
        filename: row.get(1)?,
        doc_type: parse_doc_type(&row.get::<_, String>(2)?),
        quality_score: row.get(3)?,
        index_status: IndexStatus::parse(&row.get::<_, String>(4)?),
        created_at: parse_datetime(row.get::<_, String>(5)?),
    })
}

/// 알 수 없는 유형 문자열 행은 건너뜀 (`None`)
fn row_to_entity(row: &Row<'_>) -> rusqlite::Result<Option<Entity>> {
    let Some(entity_type) = EntityType::parse(&row.get::<_, String>(0)?) else {
        return Ok(None);
    };
    Ok(Some(Entity {
        entity_type,
        raw: row.get(1)?,
        value: row.get(2)?,
        valid: row.get(3)?,
        start: row.get::<_, i64>(4)?.max(0) as usize,
        end: row.get::<_, i64>(5)?.max(0) as usize,
    }))
}

fn parse_doc_type(s: &str) -> DocumentType {
    DocumentType::parse(s).unwrap_or(DocumentType::Unknown)
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// f32 벡터 → little-endian 바이트
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
