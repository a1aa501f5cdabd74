//! 파일 수집 모듈
//!
//! 로컬 파일 및 폴더에서 은행 문서(PDF/DOCX/TXT)를 수집합니다.
//! .gitignore 패턴을 존중하고, 크기 상한을 넘는 파일은 건너뜁니다.

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{RagError, Result};
use crate::extractor::DocumentFormat;

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    pub path: PathBuf,
    pub format: DocumentFormat,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 지원 형식의 일반 파일이면 `Some`
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        let Some(format) = DocumentFormat::from_path(&path) else {
            return Ok(None);
        };

        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            format,
            size: metadata.len(),
        }))
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub respect_gitignore: bool,
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_max_size(max_file_size: u64) -> Self {
        Self::new(CollectorConfig {
            max_file_size,
            ..CollectorConfig::default()
        })
    }

    /// 폴더 재귀 수집 (경로순 정렬)
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.is_dir() {
            return Err(RagError::NotFound(format!("Not a directory: {:?}", path)));
        }

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) if self.within_size(&file) => files.push(file),
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to collect file: {}", e),
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("Collected {} files from {:?}", files.len(), path);
        Ok(files)
    }

    fn within_size(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }
        true
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_collect_supported_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.txt"), "statement").unwrap();
        std::fs::write(dir.path().join("b.pdf"), "%PDF").unwrap();
        std::fs::write(dir.path().join("c.png"), "img").unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("nested/d.docx"), "zip").unwrap();

        let files = FileCollector::new(CollectorConfig::default())
            .collect_directory(dir.path())
            .unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.pdf", "d.docx"]);
    }

    #[test]
    fn test_size_cap() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("small.txt"), "x").unwrap();
        std::fs::write(dir.path().join("large.txt"), "x".repeat(100)).unwrap();

        let files = FileCollector::with_max_size(10)
            .collect_directory(dir.path())
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].path.ends_with("small.txt"));
    }

    #[test]
    fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        assert!(FileCollector::with_max_size(0)
            .collect_directory(&dir.path().join("nope"))
            .is_err());
    }
}
