//! CLI 모듈
//!
//! ragflow CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::{get_data_dir, PipelineConfig};
use crate::embedding::{has_api_key, GeminiEmbedding};
use crate::generation::GeminiChat;
use crate::knowledge::SearchStrategy;
use crate::loader::{FileFormat, LoaderConfig};
use crate::pipeline::RagPipeline;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "ragflow")]
#[command(version, about = "검색 증강 생성(RAG) 파이프라인", long_about = None)]
pub struct Cli {
    /// 파이프라인 설정 파일 (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 소스를 인덱싱한 뒤 질문에 답변
    Ask {
        /// 질문
        question: String,

        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        retrieval: RetrievalArgs,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 소스를 인덱싱한 뒤 관련 청크만 검색
    Retrieve {
        /// 검색 쿼리
        query: String,

        #[command(flatten)]
        sources: SourceArgs,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// 상태 확인
    Status,
}

/// 인덱싱할 소스
#[derive(Args, Debug, Default)]
pub struct SourceArgs {
    /// 웹 페이지 URL (여러 번 지정 가능)
    #[arg(short, long)]
    pub url: Vec<String>,

    /// 본문 추출 CSS 셀렉터
    #[arg(long, default_value = "body")]
    pub selector: String,

    /// 파일 경로 (txt, pdf)
    #[arg(short, long)]
    pub file: Vec<PathBuf>,

    /// 직접 입력할 텍스트
    #[arg(short, long)]
    pub text: Vec<String>,

    /// 폴더 경로 (재귀)
    #[arg(short, long)]
    pub dir: Vec<PathBuf>,
}

impl SourceArgs {
    /// 로더 설정 목록으로 변환 (파일 형식은 확장자로 결정)
    pub fn to_loader_configs(&self) -> Vec<LoaderConfig> {
        let mut sources = Vec::new();
        sources.extend(self.url.iter().map(|url| LoaderConfig::Web {
            url: url.clone(),
            selector: self.selector.clone(),
        }));
        sources.extend(self.file.iter().map(|path| {
            // 디렉토리 로더와 같은 확장자 매핑, 모르는 확장자는 그대로 넘겨 로더가 거부
            let format = FileFormat::from_path(path)
                .map(|f| f.to_string())
                .unwrap_or_else(|| {
                    path.extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or_default()
                        .to_string()
                });
            LoaderConfig::file(path.clone(), format)
        }));
        sources.extend(self.text.iter().map(LoaderConfig::text));
        sources.extend(self.dir.iter().map(LoaderConfig::directory));
        sources
    }
}

/// 검색 옵션 덮어쓰기
#[derive(Args, Debug, Default)]
pub struct RetrievalArgs {
    /// 반환할 청크 수
    #[arg(short, long)]
    pub k: Option<usize>,

    /// 검색 전략 (similarity, mmr, threshold)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// threshold 전략의 최소 점수
    #[arg(long)]
    pub min_score: Option<f32>,
}

impl RetrievalArgs {
    fn apply(&self, config: &mut PipelineConfig) -> Result<()> {
        if let Some(k) = self.k {
            config.retrieval.k = k;
        }
        if let Some(ref strategy) = self.strategy {
            config.retrieval.strategy = strategy.parse::<SearchStrategy>()?;
        }
        if let Some(min_score) = self.min_score {
            config.retrieval.score_threshold = Some(min_score);
        }
        config.retrieval.validate()?;
        Ok(())
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Ask {
            question,
            sources,
            retrieval,
            json,
        } => cmd_ask(config, &question, &sources, &retrieval, json).await,
        Commands::Retrieve {
            query,
            sources,
            retrieval,
        } => cmd_retrieve(config, &query, &sources, &retrieval).await,
        Commands::Status => cmd_status(&config).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::from_json_file(path)
            .with_context(|| format!("설정 파일 로드 실패: {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// API 키 확인 후 파이프라인 구성 + 인덱싱
async fn build_pipeline(
    mut config: PipelineConfig,
    sources: &SourceArgs,
    retrieval: &RetrievalArgs,
) -> Result<RagPipeline> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }

    retrieval.apply(&mut config).context("검색 옵션 오류")?;

    let loaders = sources.to_loader_configs();
    if loaders.is_empty() {
        bail!("--url, --file, --text, --dir 중 하나 이상을 지정해야 합니다");
    }

    let embedder = GeminiEmbedding::from_env_with_config(&config.embedding)
        .context("임베딩 클라이언트 생성 실패")?;
    let llm = GeminiChat::from_env_with_config(&config.llm).context("언어 모델 생성 실패")?;

    let chunk_config = config.chunk;
    let mut pipeline = RagPipeline::new(config, Arc::new(embedder), Arc::new(llm))
        .context("파이프라인 생성 실패")?;

    println!("[*] 소스 {}개 인덱싱 중...", loaders.len());
    pipeline
        .initialize(&loaders, &chunk_config)
        .await
        .context("파이프라인 초기화 실패")?;

    let stats = pipeline.stats();
    println!(
        "[OK] 문서 {}개 -> 청크 {}개 ({})",
        stats.document_count, stats.chunk_count, stats.backend
    );

    Ok(pipeline)
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    config: PipelineConfig,
    question: &str,
    sources: &SourceArgs,
    retrieval: &RetrievalArgs,
    json: bool,
) -> Result<()> {
    let pipeline = build_pipeline(config, sources, retrieval).await?;
    let response = pipeline.query(question).await.context("질의 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("\n[OK] 답변:\n");
    println!("{}", response.answer.trim());
    println!();
    println!(
        "[*] 참조 청크 {}개 | {} ms",
        response.metadata.retrieved_docs, response.metadata.processing_time_ms
    );

    for (i, context) in response.context.iter().enumerate() {
        println!("  {}. {}", i + 1, truncate_text(context, 120));
    }

    Ok(())
}

/// 검색 명령어 (retrieve)
async fn cmd_retrieve(
    config: PipelineConfig,
    query: &str,
    sources: &SourceArgs,
    retrieval: &RetrievalArgs,
) -> Result<()> {
    let pipeline = build_pipeline(config, sources, retrieval).await?;
    let chunks = pipeline.retrieve(query).await.context("검색 실패")?;

    if chunks.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", chunks.len());

    for (i, chunk) in chunks.iter().enumerate() {
        println!(
            "{}. [{}] #{}",
            i + 1,
            chunk.source().unwrap_or("-"),
            chunk.index().map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
        );
        println!("   내용: {}", truncate_text(chunk.content(), 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &PipelineConfig) -> Result<()> {
    println!("ragflow v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    println!(
        "[*] 청킹: {} / 겹침 {}",
        config.chunk.chunk_size, config.chunk.chunk_overlap
    );
    println!(
        "[*] 검색: {} (k = {})",
        config.retrieval.strategy, config.retrieval.k
    );
    println!("[*] 벡터 저장소: {}", config.vector_store.backend_name());
    println!("[*] 모델: {} / {}", config.embedding.model, config.llm.model);

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

// ============================================================================
// Tests
// ============================================================================
