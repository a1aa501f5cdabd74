//! Text Chunking Module
//!
//! 정규화 텍스트를 고정 크기 문자 윈도우로 나눕니다.
//! - 구간 `[start, end)`는 `char` 단위
//! - 이웃 청크는 정확히 `overlap` 문자를 공유
//! - 청크 구간의 합집합은 원문 전체를 빈틈 없이 덮음

use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChunkConfig {
    /// 윈도우 크기 (문자 수)
    pub window_size: usize,
    /// 이웃 청크 간 공유 문자 수
    pub overlap: usize,
    /// 경계(문장 끝/공백) 탐색 허용 폭. 0이면 정확히 `window_size`에서 자름
    pub boundary_tolerance: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            window_size: 500,
            overlap: 50,
            boundary_tolerance: 0,
        }
    }
}

impl ChunkConfig {
    /// 단어 경계 우선 설정
    pub fn word_aligned() -> Self {
        Self {
            boundary_tolerance: 40,
            ..Self::default()
        }
    }

    /// 빠른 인덱싱용 설정 (오버랩 없음)
    pub fn for_fast() -> Self {
        Self {
            window_size: 1000,
            overlap: 0,
            boundary_tolerance: 0,
        }
    }

    /// 설정 검증
    ///
    /// `overlap < window_size`, 그리고 경계 탐색 후에도 청크가 전진할 수 있어야 합니다.
    pub fn validate(&self) -> Result<()> {
        if self.window_size == 0 {
            return Err(RagError::Config("window_size must be positive".into()));
        }
        if self.overlap >= self.window_size {
            return Err(RagError::Config(format!(
                "overlap ({}) must be smaller than window_size ({})",
                self.overlap, self.window_size
            )));
        }
        if self.boundary_tolerance > 0
            && self.window_size - self.boundary_tolerance <= self.overlap
        {
            return Err(RagError::Config(format!(
                "boundary_tolerance ({}) leaves no progress past overlap ({})",
                self.boundary_tolerance, self.overlap
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 텍스트 청크
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Chunk {
    /// 문서 내 순번 (0부터)
    pub index: usize,
    /// 시작 문자 오프셋
    pub start: usize,
    /// 끝 문자 오프셋 (미포함)
    pub end: usize,
    pub text: String,
    /// 텍스트 SHA-256 (hex)
    pub content_hash: String,
}

impl Chunk {
    fn new(index: usize, start: usize, end: usize, text: &str) -> Self {
        Self {
            index,
            start,
            end,
            text: text.to_string(),
            content_hash: content_hash(text),
        }
    }

    /// 전역 청크 ID (`{document_id}:{index}`)
    pub fn id(&self, document_id: &str) -> String {
        chunk_id(document_id, self.index)
    }

    pub fn char_len(&self) -> usize {
        self.end - self.start
    }
}

/// 청크 ID 생성
pub fn chunk_id(document_id: &str, index: usize) -> String {
    format!("{}:{}", document_id, index)
}

/// 내용 해시 (임베딩 캐시 키)
pub fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<Chunk>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 문자 윈도우 청커
///
/// `boundary_tolerance > 0`이면 강제 절단점 앞 허용 범위 안에서
/// 문장 끝(`.` `!` `?`) 또는 공백 직후를 절단점으로 고릅니다.
#[derive(Debug, Clone)]
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    /// 설정으로 생성 (검증 포함)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 절단점 선택 (문자 인덱스)
    fn cut_point(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        let tolerance = self.config.boundary_tolerance;
        if tolerance == 0 {
            return hard_end;
        }

        let floor = (hard_end - tolerance).max(start + 1);

        // 문장 끝 우선, 없으면 공백
        let sentence = (floor..=hard_end)
            .rev()
            .find(|&p| matches!(chars[p - 1], '.' | '!' | '?') && is_break(chars, p));
        if let Some(p) = sentence {
            return p;
        }

        (floor..=hard_end)
            .rev()
            .find(|&p| chars[p - 1].is_whitespace())
            .unwrap_or(hard_end)
    }
}

/// `p` 위치가 텍스트 끝이거나 공백 앞인지
#[inline]
fn is_break(chars: &[char], p: usize) -> bool {
    chars.get(p).map_or(true, |c| c.is_whitespace())
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.is_empty() {
            return vec![];
        }

        let chars: Vec<char> = text.chars().collect();
        // 문자 인덱스 → 바이트 오프셋 (마지막 원소 = text.len())
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(b, _)| b)
            .chain(std::iter::once(text.len()))
            .collect();

        let total = chars.len();
        let window = self.config.window_size;
        let mut chunks = Vec::with_capacity(total / window.max(1) + 1);
        let mut start = 0;

        loop {
            let index = chunks.len();
            if total - start <= window {
                chunks.push(Chunk::new(
                    index,
                    start,
                    total,
                    &text[bounds[start]..bounds[total]],
                ));
                break;
            }

            let end = self.cut_point(&chars, start, start + window);
            chunks.push(Chunk::new(index, start, end, &text[bounds[start]..bounds[end]]));
            start = end - self.config.overlap;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "WindowChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 정확한 윈도우 분할
///
/// `overlap >= window_size`이면 `RagError::Config`.
pub fn chunk_text(text: &str, window_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = WindowChunker::new(ChunkConfig {
        window_size,
        overlap,
        boundary_tolerance: 0,
    })?;
    Ok(chunker.chunk(text))
}

// ============================================================================
// Tests
// ============================================================================
