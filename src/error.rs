//! 에러 타입
//!
//! 파이프라인 전 구간에서 공유하는 에러 분류입니다.
//! 호출자가 재시도/중단을 판단할 수 있도록 작업과 문제가 된 설정값을 함께 담습니다.

use std::path::PathBuf;

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 웹/파일 소스를 가져올 수 없음
    #[error("Source unavailable ({source_id}): {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// 로컬 경로가 존재하지 않음
    #[error("Path not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// 지원하지 않는 파일 형식
    #[error("Unsupported file format: '{format}' (expected pdf or txt)")]
    UnsupportedFormat { format: String },

    /// 잘못된 청킹 설정
    #[error(
        "Invalid chunk config: chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size}) and chunk_size must be positive"
    )]
    InvalidChunkConfig {
        chunk_size: usize,
        chunk_overlap: usize,
    },

    /// 임베딩 생성 실패 (배치 전체 실패로 취급)
    #[error("Embedding failed ({provider}): {message}")]
    EmbeddingFailed { provider: String, message: String },

    /// add 전에 검색 시도
    #[error("Vector index not ready: add at least one batch before searching")]
    IndexNotReady,

    /// 알 수 없는 검색 전략
    #[error("Unknown retrieval strategy: '{name}' (expected similarity, mmr or threshold)")]
    UnknownStrategy { name: String },

    /// READY 상태가 아닌 파이프라인에 요청
    #[error("Pipeline not ready (status: {status})")]
    PipelineNotReady { status: String },

    /// 이미 초기화된 파이프라인
    #[error("Pipeline already initialized")]
    AlreadyInitialized,

    /// 언어 모델 호출 실패
    #[error("Generation failed ({model}): {message}")]
    GenerationFailed { model: String, message: String },

    /// 벡터 저장소 백엔드 에러
    #[error("Vector store error ({backend}): {message}")]
    VectorStore { backend: String, message: String },

    /// 설정값 검증 실패
    #[error("Configuration error: {0}")]
    Config(String),
}

impl RagError {
    pub(crate) fn embedding(provider: &str, message: impl ToString) -> Self {
        Self::EmbeddingFailed {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn store(backend: &str, message: impl ToString) -> Self {
        Self::VectorStore {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn unavailable(source_id: impl ToString, reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            source_id: source_id.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// 크레이트 공용 Result
pub type Result<T> = std::result::Result<T, RagError>;
