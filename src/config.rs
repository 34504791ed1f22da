//! 파이프라인 설정
//!
//! 모델 이름, 온도 등 전역 설정을 불변 구조체 하나로 묶어
//! [`RagPipeline`](crate::pipeline::RagPipeline) 생성 시 전달합니다.
//! API 키만 환경변수에서 읽습니다.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, RetrievalOptions, VectorStoreConfig};

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로 (~/.ragflow/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ragflow")
}

// ============================================================================
// Sections
// ============================================================================

/// 임베딩 모델 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimension: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: crate::embedding::DEFAULT_MODEL.to_string(),
            dimension: crate::embedding::DEFAULT_DIMENSION,
        }
    }
}

/// 언어 모델 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: crate::generation::DEFAULT_MODEL.to_string(),
            temperature: 0.0,
            max_output_tokens: 1024,
        }
    }
}

// ============================================================================
// PipelineConfig
// ============================================================================

/// 파이프라인 전체 설정 (생성 후 변경 불가)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub chunk: ChunkConfig,
    pub retrieval: RetrievalOptions,
    pub vector_store: VectorStoreConfig,
    pub embedding: EmbeddingConfig,
    pub llm: LlmConfig,
}

impl PipelineConfig {
    /// JSON 파일에서 로드 (누락된 필드는 기본값)
    pub fn from_json_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| RagError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| RagError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded pipeline config");
        Ok(config)
    }

    /// 섹션별 값 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;
        self.retrieval.validate()?;
        self.vector_store.validate()?;
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(RagError::Config(format!(
                "llm.temperature must be within [0, 2], got {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
