//! Knowledge 모듈 - 문서 저장소 + 벡터 인덱스 + 검색
//!
//! - Store: SQLite 문서/엔티티/청크/질의 로그 + 임베딩 캐시
//! - Chunker: 문자 윈도우 분할 (고정 오버랩)
//! - Vector: 벡터 저장소 트레이트 (메모리, LanceDB)
//! - Index: 청크 임베딩 → 벡터 저장소
//! - Retriever: 질의 → 상위 청크 + 인용 컨텍스트

mod chunker;
mod index;
mod lance;
mod retriever;
mod store;
mod vector;

// Re-exports
pub use chunker::{
    chunk_id, chunk_text, content_hash, Chunk, ChunkConfig, Chunker,
    WindowChunker,
};
pub use index::{EmbeddingIndex, IndexOutcome};
pub use lance::LanceVectorStore;
pub use retriever::{
    assemble, LexicalReranker, NoOpReranker, QueryResult, Reranker, RetrievedChunk,
    RetrievedContext, Retriever, SourceRef, EXCERPT_SEPARATOR,
};
pub use store::{
    get_data_dir, ChunkRecord, Document, DocumentSummary, EntityHit, IndexStatus,
    KnowledgeStore, NewDocument, QueryLog, StoreStats, DB_FILE_NAME,
};
pub use vector::{
    cosine_similarity, rank_results, InMemoryVectorStore, SearchResult, VectorEntry, VectorStore,
};
