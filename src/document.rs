//! 문서 / 청크 데이터 모델
//!
//! 로더가 만든 [`Document`]는 생성 이후 변경되지 않습니다.
//! 청킹 시 메타데이터는 그대로 상속되고 순번(`chunk_index`)만 추가됩니다.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 문서 메타데이터 (문자열 키 -> 임의 JSON 값)
pub type Metadata = Map<String, Value>;

/// 출처 메타데이터 키
pub const SOURCE_KEY: &str = "source";
/// 청크 순번 메타데이터 키
pub const CHUNK_INDEX_KEY: &str = "chunk_index";
/// 청크 시작 위치(문자 단위) 메타데이터 키
pub const START_INDEX_KEY: &str = "start_index";

// ============================================================================
// Document
// ============================================================================

/// 원본 문서 (불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    content: String,
    metadata: Metadata,
}

impl Document {
    /// 콘텐츠와 메타데이터로 생성
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// 출처만 지정하여 생성
    pub fn with_source(content: impl Into<String>, source: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_KEY.to_string(), Value::String(source.into()));
        Self::new(content, metadata)
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// 출처 식별자 (`source` 메타데이터)
    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 문서에서 잘라낸 텍스트 조각
///
/// 부모 문서의 메타데이터 + `chunk_index`, `start_index`를 가집니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    content: String,
    metadata: Metadata,
}

impl Chunk {
    /// 부모 문서에서 청크 생성
    pub(crate) fn from_parent(
        parent: &Document,
        content: String,
        chunk_index: usize,
        start_index: usize,
    ) -> Self {
        let mut metadata = parent.metadata.clone();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), Value::from(chunk_index));
        metadata.insert(START_INDEX_KEY.to_string(), Value::from(start_index));
        Self { content, metadata }
    }

    /// 콘텐츠와 메타데이터로 직접 생성 (저장소에서 복원할 때 등)
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            content: content.into(),
            metadata,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get(SOURCE_KEY).and_then(Value::as_str)
    }

    /// 문서 내 청크 순번
    pub fn index(&self) -> Option<usize> {
        self.metadata
            .get(CHUNK_INDEX_KEY)
            .and_then(Value::as_u64)
            .map(|i| i as usize)
    }
}

impl From<Document> for Chunk {
    fn from(doc: Document) -> Self {
        Self {
            content: doc.content,
            metadata: doc.metadata,
        }
    }
}

// ============================================================================
// Indexed Record / Retrieval Result
// ============================================================================

/// 벡터 인덱스에 저장되는 단위
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    /// 레코드 ID (UUID v4)
    pub id: String,
    /// 삽입 순서 (동점 시 먼저 삽입된 레코드 우선)
    pub seq: u64,
    /// 임베딩 벡터
    pub vector: Vec<f32>,
    pub chunk: Chunk,
}

/// 검색 결과 (점수가 높을수록 관련성 높음)
#[derive(Debug, Clone)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    pub score: f32,
}
