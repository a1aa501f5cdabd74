//! CLI 모듈
//!
//! bankdoc-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::answer::AnswerResult;
use crate::config::{EmbeddingBackend, RagConfig};
use crate::entities::{DocumentType, EntityType};
use crate::knowledge::{IndexOutcome, KnowledgeStore};
use crate::pipeline::{IngestReport, RagEngine};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "bankdoc-rag")]
#[command(version, about = "로컬 은행 문서 RAG 시스템", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: ~/.local/share/.bankdoc-rag)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 임베딩 백엔드 (ollama | hashing)
    #[arg(long, global = true)]
    pub embedder: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일, 폴더, 또는 텍스트를 지식베이스에 추가
    Ingest {
        /// 수집할 파일 경로 (pdf, docx, txt)
        #[arg(long)]
        file: Option<PathBuf>,

        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// --text 입력의 문서 이름
        #[arg(long, default_value = "direct-input.txt")]
        name: String,
    },

    /// 문서에 대해 질문
    Ask {
        /// 질문
        query: String,

        /// 검색 청크 수
        #[arg(short)]
        k: Option<usize>,

        /// 문서 유형 필터
        #[arg(long)]
        doc_type: Option<String>,

        /// LLM 없이 원문 발췌만 출력
        #[arg(long)]
        no_llm: bool,

        /// JSON 출력
        #[arg(long)]
        json: bool,
    },

    /// 저장된 문서 목록
    List {
        /// 문서 유형 필터
        #[arg(long)]
        doc_type: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서 상세 (엔티티 포함)
    Show {
        /// 문서 ID
        id: String,
    },

    /// 엔티티 검색
    Entities {
        /// 엔티티 유형 (PAN, AADHAAR, IFSC, ...)
        #[arg(long = "type")]
        entity_type: Option<String>,

        /// 값 부분 일치
        #[arg(long)]
        value: Option<String>,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// 문서 삭제
    Delete {
        /// 문서 ID
        id: String,
    },

    /// 저장된 원문으로 다시 처리
    Reprocess {
        /// 문서 ID
        id: String,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = build_config(&cli)?;

    match cli.command {
        Commands::Ingest {
            file,
            dir,
            text,
            name,
        } => cmd_ingest(config, file, dir, text, &name).await,
        Commands::Ask {
            query,
            k,
            doc_type,
            no_llm,
            json,
        } => cmd_ask(config, &query, k, doc_type.as_deref(), no_llm, json).await,
        Commands::List { doc_type, limit } => cmd_list(&config, doc_type.as_deref(), limit),
        Commands::Show { id } => cmd_show(&config, &id),
        Commands::Entities {
            entity_type,
            value,
            limit,
        } => cmd_entities(&config, entity_type.as_deref(), value.as_deref(), limit),
        Commands::Delete { id } => cmd_delete(config, &id).await,
        Commands::Reprocess { id } => cmd_reprocess(config, &id).await,
        Commands::Status => cmd_status(config).await,
    }
}

/// 기본값 + 환경변수 + 전역 플래그
fn build_config(cli: &Cli) -> Result<RagConfig> {
    let mut config = RagConfig::default();
    config
        .apply_env(|key| std::env::var(key).ok())
        .context("환경변수 설정 오류")?;

    if let Some(ref dir) = cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(ref embedder) = cli.embedder {
        config.embedding.backend = embedder
            .parse::<EmbeddingBackend>()
            .context("--embedder 값 오류")?;
    }

    config.validate().context("설정 검증 실패")?;
    Ok(config)
}

async fn open_engine(config: RagConfig) -> Result<RagEngine> {
    RagEngine::open(config).await.context("엔진 초기화 실패")
}

fn open_store(config: &RagConfig) -> Result<KnowledgeStore> {
    KnowledgeStore::open_in_dir(&config.data_dir).context("KnowledgeStore 열기 실패")
}

fn parse_doc_type(value: Option<&str>) -> Result<Option<DocumentType>> {
    value
        .map(|v| DocumentType::parse(v).ok_or_else(|| anyhow!("알 수 없는 문서 유형: {}", v)))
        .transpose()
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    config: RagConfig,
    file: Option<PathBuf>,
    dir: Option<PathBuf>,
    text: Option<String>,
    name: &str,
) -> Result<()> {
    if file.is_none() && dir.is_none() && text.is_none() {
        bail!("--file, --dir, --text 중 하나를 지정해야 합니다");
    }

    let engine = open_engine(config).await?;

    if let Some(ref path) = file {
        println!("[*] 파일 처리 중: {}", path.display());
        let report = engine
            .ingest_file(path)
            .await
            .with_context(|| format!("파일 수집 실패: {}", path.display()))?;
        print_report(&report);
    }

    if let Some(ref content) = text {
        println!("[*] 텍스트 처리 중...");
        let report = engine.ingest_text(name, content).await.context("텍스트 수집 실패")?;
        print_report(&report);
    }

    if let Some(ref dir_path) = dir {
        let outcomes = engine
            .ingest_directory(dir_path)
            .await
            .with_context(|| format!("폴더 수집 실패: {}", dir_path.display()))?;

        if outcomes.is_empty() {
            println!("[!] 수집할 파일이 없습니다.");
            return Ok(());
        }

        let total = outcomes.len();
        let mut success_count = 0;
        let mut error_count = 0;
        for (i, outcome) in outcomes.iter().enumerate() {
            let file_name = outcome
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown");
            match &outcome.result {
                Ok(report) => {
                    success_count += 1;
                    println!(
                        "[{}/{}] {} ... 완료 ({}, 품질 {:.2}, 청크 {}{})",
                        i + 1,
                        total,
                        file_name,
                        report.doc_type,
                        report.quality.score,
                        report.chunks,
                        if report.index.is_degraded() { ", 인덱스 생략" } else { "" }
                    );
                }
                Err(e) => {
                    error_count += 1;
                    println!("[{}/{}] {} ... 실패: {}", i + 1, total, file_name, e);
                }
            }
        }

        println!();
        println!("[OK] 완료: 성공 {}, 실패 {}", success_count, error_count);
    }

    Ok(())
}

fn print_report(report: &IngestReport) {
    println!("[OK] 문서가 추가되었습니다 (ID: {})", report.document_id);
    println!("     파일: {}", report.filename);
    println!(
        "     유형: {} | 품질 점수: {:.2}",
        report.doc_type, report.quality.score
    );

    if report.entity_counts.is_empty() {
        println!("     엔티티: 없음");
    } else {
        let counts: Vec<String> = report
            .entity_counts
            .iter()
            .map(|(t, n)| format!("{} {}", t, n))
            .collect();
        println!("     엔티티: {}", counts.join(", "));
    }

    let failures: usize = report.validation_failures.values().sum();
    if failures > 0 {
        println!("     검증 실패로 제외: {} 건", failures);
    }

    match &report.index {
        IndexOutcome::Indexed { chunks, cached } => {
            println!("     인덱스: {} 청크 (캐시 {})", chunks, cached)
        }
        IndexOutcome::Empty => println!("     인덱스: 청크 없음"),
        IndexOutcome::Degraded { degradation } => {
            println!("[!] 인덱싱 생략: {}", degradation);
            println!("    문서와 엔티티는 저장되었습니다. 나중에 reprocess로 다시 인덱싱하세요.");
        }
    }
}

/// 질의 명령어 (ask)
async fn cmd_ask(
    config: RagConfig,
    query: &str,
    k: Option<usize>,
    doc_type: Option<&str>,
    no_llm: bool,
    json: bool,
) -> Result<()> {
    let doc_type = parse_doc_type(doc_type)?;
    let engine = open_engine(config).await?;

    if !json {
        println!("[*] 검색 중: \"{}\"", query);
    }

    let result = engine
        .ask(query, k, doc_type, !no_llm)
        .await
        .context("질의 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for degradation in &result.degradations {
        println!("[!] {}", degradation);
    }

    match &result.answer {
        Some(answer @ AnswerResult::Generated { model, .. }) => {
            println!("\n[OK] 답변 ({}):\n", model);
            println!("{}", answer.text());
        }
        Some(answer) => {
            println!("\n[OK] 답변:\n");
            println!("{}", answer.text());
        }
        None => println!("\n[!] 답변이 없습니다."),
    }

    if !result.sources().is_empty() {
        println!("\n출처:");
        for source in result.sources() {
            println!(
                "  - {} [{}] (doc {}, 관련도 {:.4})",
                source.filename, source.doc_type, source.document_id, source.relevance
            );
        }
    }
    println!(
        "\n검색 {}ms / 전체 {}ms",
        result.search_ms, result.total_ms
    );

    Ok(())
}

/// 목록 명령어 (list)
fn cmd_list(config: &RagConfig, doc_type: Option<&str>, limit: usize) -> Result<()> {
    let doc_type = parse_doc_type(doc_type)?;
    let store = open_store(config)?;

    let docs = store
        .list_documents(limit, doc_type)
        .context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        println!("  {} [{}] {}", doc.id, doc.doc_type, truncate_text(&doc.filename, 40));
        println!(
            "        {} | 품질 {:.2} | 인덱스 {}",
            doc.created_at.format("%Y-%m-%d %H:%M"),
            doc.quality_score,
            doc.index_status
        );
        println!();
    }

    Ok(())
}

/// 상세 명령어 (show)
fn cmd_show(config: &RagConfig, id: &str) -> Result<()> {
    let store = open_store(config)?;

    let doc = store
        .get_document(id)
        .context("문서 조회 실패")?
        .ok_or_else(|| anyhow!("ID {}인 문서를 찾을 수 없습니다", id))?;
    let entities = store.get_entities(id).context("엔티티 조회 실패")?;
    let chunks = store.get_chunks(id).context("청크 조회 실패")?;

    println!("[OK] 문서 {}", doc.id);
    println!("     파일: {}", doc.filename);
    if let Some(ref path) = doc.file_path {
        println!("     경로: {}", path);
    }
    println!("     크기: {}", format_bytes(doc.file_size as usize));
    println!("     유형: {} | 품질 점수: {:.2}", doc.doc_type, doc.quality_score);
    println!("     인덱스: {} ({} 청크)", doc.index_status, chunks.len());
    println!("     생성: {}", doc.created_at.format("%Y-%m-%d %H:%M"));
    if let Some(processed) = doc.processed_at {
        println!("     처리: {}", processed.format("%Y-%m-%d %H:%M"));
    }

    println!("\n엔티티 ({} 건):", entities.len());
    for entity in &entities {
        println!(
            "  {:<15} {:<25} {}{}",
            entity.entity_type.as_str(),
            entity.value,
            entity.raw,
            if entity.valid { "" } else { "  (검증 실패)" }
        );
    }

    println!("\n미리보기: {}", truncate_text(&doc.normalized_text, 200));
    Ok(())
}

/// 엔티티 검색 명령어 (entities)
fn cmd_entities(
    config: &RagConfig,
    entity_type: Option<&str>,
    value: Option<&str>,
    limit: usize,
) -> Result<()> {
    let entity_type = entity_type
        .map(|t| EntityType::parse(t).ok_or_else(|| anyhow!("알 수 없는 엔티티 유형: {}", t)))
        .transpose()?;
    let store = open_store(config)?;

    let hits = store
        .search_entities(entity_type, value, limit)
        .context("엔티티 검색 실패")?;

    if hits.is_empty() {
        println!("[!] 일치하는 엔티티가 없습니다.");
        return Ok(());
    }

    println!("[OK] 엔티티 ({} 건):\n", hits.len());
    for hit in hits {
        println!(
            "  {:<15} {:<25} {} ({})",
            hit.entity.entity_type.as_str(),
            hit.entity.value,
            truncate_text(&hit.filename, 30),
            hit.document_id
        );
    }
    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(config: RagConfig, id: &str) -> Result<()> {
    let engine = open_engine(config).await?;

    if engine.delete(id).await.context("문서 삭제 실패")? {
        println!("[OK] 문서 {} 삭제됨", id);
    } else {
        println!("[!] 삭제할 문서를 찾을 수 없습니다");
    }
    Ok(())
}

/// 재처리 명령어 (reprocess)
async fn cmd_reprocess(config: RagConfig, id: &str) -> Result<()> {
    let engine = open_engine(config).await?;

    println!("[*] 재처리 중: {}", id);
    let report = engine.reprocess(id).await.context("재처리 실패")?;
    print_report(&report);
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: RagConfig) -> Result<()> {
    println!("bankdoc-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());

    let engine = open_engine(config).await?;
    let status = engine.status().await.context("상태 조회 실패")?;

    println!("[OK] 저장된 문서: {} 건", status.store.total_documents);
    for (doc_type, count) in &status.store.documents_by_type {
        println!("     {}: {}", doc_type, count);
    }
    println!("     평균 품질: {:.2}", status.store.average_quality);
    println!("     엔티티: {} | 청크: {}", status.store.total_entities, status.store.total_chunks);
    println!("     질의 기록: {}", status.store.total_queries);

    match status.indexed_vectors {
        Some(n) => println!("[OK] 벡터 인덱스 ({}): {} 청크", status.vector_store, n),
        None => println!("[!] 벡터 인덱스 ({}): 사용 불가", status.vector_store),
    }
    println!("[*] 임베딩: {}", status.embedder);

    match (&status.llm_model, status.llm_available) {
        (Some(model), true) => println!("[OK] LLM: {}", model),
        (Some(model), false) => {
            println!("[!] LLM: {} 사용 불가 (원문 발췌로 응답)", model);
            println!("    설치: ollama pull {}", model);
        }
        (None, _) => println!("[*] LLM: 비활성화"),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
