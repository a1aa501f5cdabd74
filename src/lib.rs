//! bankdoc-rag - 로컬 은행 문서 RAG 시스템
//!
//! 은행 문서(대출 신청서, KYC, 거래내역서, 급여명세서)에서
//! 구조화된 엔티티(PAN, Aadhaar, IFSC, 금액 등)를 추출하고,
//! 청크 임베딩 검색으로 자연어 질문에 답합니다.
//!
//! - 엔티티: 규칙 카탈로그 + 체크섬 검증 + 품질 점수
//! - 검색: Ollama/해싱 임베딩 + LanceDB 벡터 검색
//! - 응답: 로컬 LLM (Ollama), 실패 시 원문 발췌

pub mod answer;
pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod entities;
pub mod error;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod normalizer;
pub mod pipeline;

// Re-exports
pub use answer::{AnswerComposer, AnswerResult, Excerpt};
pub use config::{EmbeddingBackend, EmbeddingConfig, LlmConfig, RagConfig, RetrievalConfig};
pub use embedding::{create_embedder, EmbeddingProvider, HashingEmbedding, OllamaEmbedding};
pub use entities::{
    DocumentType, Entity, EntityExtractor, EntityType, ExtractionReport, QualityScore,
};
pub use error::{Degradation, RagError, Result};
pub use knowledge::{
    chunk_text, Chunk, ChunkConfig, Chunker, EmbeddingIndex, InMemoryVectorStore, IndexOutcome,
    KnowledgeStore, LanceVectorStore, QueryResult, RetrievedChunk, RetrievedContext, Retriever,
    VectorStore, WindowChunker,
};
pub use llm::{LanguageModel, OllamaClient};
pub use normalizer::normalize;
pub use pipeline::{DocumentLocks, IngestReport, RagEngine};
