//! Vector Index - 임베딩 + 저장 + 최근접 검색
//!
//! 백엔드([`VectorStore`])와 임베딩 프로바이더를 묶어 청크 단위 계약을 제공합니다.
//!
//! - `add`: 청크 전체를 임베딩한 뒤 한 번에 삽입 (임베딩 실패 시 아무것도 저장하지 않음)
//! - `search_*`: 첫 `add` 성공 전에는 `IndexNotReady`
//! - 레코드 수는 백엔드 구조가 아니라 인덱스가 직접 센 값입니다.

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};

use crate::config::get_data_dir;
use crate::document::{Chunk, IndexedRecord, RetrievalResult};
use crate::embedding::{EmbeddingProvider, MAX_BATCH_SIZE};
use crate::error::{RagError, Result};

use super::lance::LanceVectorStore;
use super::memory::MemoryVectorStore;
use super::vector::{ScoredRecord, VectorStore};

// ============================================================================
// Vector Store Configuration
// ============================================================================

fn default_max_concurrency() -> usize {
    5
}

/// 벡터 저장소 백엔드 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum VectorStoreConfig {
    /// 프로세스 내 선형 탐색 인덱스
    #[default]
    Memory,
    /// 외부 인덱스 (LanceDB)
    Remote {
        index_name: String,
        #[serde(default = "default_max_concurrency")]
        max_concurrency: usize,
        /// 로컬 경로 또는 원격 URI (기본: ~/.ragflow/vectors.lance)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },
}

impl VectorStoreConfig {
    pub fn validate(&self) -> Result<()> {
        if let Self::Remote {
            index_name,
            max_concurrency,
            ..
        } = self
        {
            if index_name.trim().is_empty() {
                return Err(RagError::Config("vector_store.index_name must not be empty".to_string()));
            }
            if *max_concurrency == 0 {
                return Err(RagError::Config(
                    "vector_store.max_concurrency must be at least 1".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// 백엔드 이름 (인덱스 생성 전 통계용)
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Remote { .. } => "lancedb",
        }
    }

    /// 설정에 맞는 백엔드 생성
    pub async fn open_store(&self) -> Result<Box<dyn VectorStore>> {
        self.validate()?;
        match self {
            Self::Memory => Ok(Box::new(MemoryVectorStore::new())),
            Self::Remote {
                index_name,
                max_concurrency,
                uri,
            } => {
                let uri = uri.clone().unwrap_or_else(|| {
                    get_data_dir().join("vectors.lance").display().to_string()
                });
                let store = LanceVectorStore::open(&uri, index_name, *max_concurrency).await?;
                Ok(Box::new(store))
            }
        }
    }
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 벡터 인덱스
pub struct VectorIndex {
    store: Box<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    ready: bool,
    next_seq: u64,
    record_count: usize,
    dimension: Option<usize>,
}

impl VectorIndex {
    /// 빈 백엔드로 인덱스 생성
    pub fn new(store: Box<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            ready: false,
            next_seq: 0,
            record_count: 0,
            dimension: None,
        }
    }

    /// 설정으로 백엔드를 열어 새 인덱스 생성
    ///
    /// 외부 인덱스에 남아 있던 같은 이름의 레코드는 삭제하고 빈 상태에서 시작합니다.
    pub async fn create(
        config: &VectorStoreConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let store = config.open_store().await?;
        store.clear().await?;

        tracing::info!(backend = store.name(), "vector index created");
        Ok(Self::new(store, embedder))
    }

    /// 청크 임베딩 후 삽입
    ///
    /// 여러 번 호출해 인덱스를 늘릴 수 있고, 같은 내용도 중복 저장됩니다.
    /// 빈 목록도 성공한 `add`로 취급되어 인덱스가 검색 가능 상태가 됩니다.
    pub async fn add(&mut self, chunks: &[Chunk]) -> Result<usize> {
        let vectors = self.embed_chunks(chunks).await?;

        let records: Vec<IndexedRecord> = chunks
            .iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, vector))| IndexedRecord {
                id: uuid::Uuid::new_v4().to_string(),
                seq: self.next_seq + i as u64,
                vector,
                chunk: chunk.clone(),
            })
            .collect();

        let inserted = if records.is_empty() {
            0
        } else {
            self.store.insert_batch(records).await?
        };

        self.next_seq += inserted as u64;
        self.record_count += inserted;
        self.ready = true;

        tracing::info!(
            backend = self.store.name(),
            inserted,
            total = self.record_count,
            "added chunks to vector index"
        );
        Ok(inserted)
    }

    /// 배치 단위 임베딩 (최대 `max_concurrency`개 동시 진행, 순서 유지)
    async fn embed_chunks(&mut self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content().to_string()).collect();
        let embedder = &self.embedder;
        let provider = embedder.name().to_string();

        let batches: Vec<Vec<Vec<f32>>> = futures::stream::iter(texts.chunks(MAX_BATCH_SIZE))
            .map(|batch| async move {
                let vectors = embedder
                    .embed_batch(batch)
                    .await
                    .map_err(|e| as_embedding_error(embedder.name(), e))?;
                if vectors.len() != batch.len() {
                    return Err(RagError::embedding(
                        embedder.name(),
                        format!("returned {} vectors for {} texts", vectors.len(), batch.len()),
                    ));
                }
                Ok(vectors)
            })
            .buffered(self.store.max_concurrency().max(1))
            .try_collect()
            .await?;

        let vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();

        let expected = match (self.dimension, vectors.first()) {
            (Some(dim), _) => dim,
            (None, Some(first)) => first.len(),
            (None, None) => return Ok(vectors),
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != expected || v.is_empty()) {
            return Err(RagError::embedding(
                &provider,
                format!("dimension mismatch: expected {}, got {}", expected, bad.len()),
            ));
        }
        self.dimension = Some(expected);

        Ok(vectors)
    }

    /// 쿼리 텍스트로 검색
    pub async fn search_by_text(&self, query: &str, k: usize) -> Result<Vec<RetrievalResult>> {
        self.ensure_searchable(k)?;
        let vector = self.embed_query(query).await?;
        self.search_by_vector(&vector, k).await
    }

    /// 벡터로 검색 - 상위 k개 (동점은 삽입 순서)
    pub async fn search_by_vector(&self, vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let results = self.search_records(vector, k).await?;
        Ok(results
            .into_iter()
            .map(|r| RetrievalResult {
                chunk: r.record.chunk,
                score: r.score,
            })
            .collect())
    }

    /// 벡터를 포함한 레코드 단위 검색 (MMR 후보 수집용)
    pub(crate) async fn search_records(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredRecord>> {
        self.ensure_searchable(k)?;
        if let Some(dim) = self.dimension {
            if vector.len() != dim {
                return Err(RagError::Config(format!(
                    "query vector dimension {} does not match index dimension {}",
                    vector.len(),
                    dim
                )));
            }
        }
        if self.record_count == 0 {
            return Ok(vec![]);
        }

        let results = self.store.search(vector, k).await?;
        tracing::debug!(backend = self.store.name(), k, returned = results.len(), "vector search");
        Ok(results)
    }

    /// 쿼리 임베딩
    pub(crate) async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embedder
            .embed_query(query)
            .await
            .map_err(|e| as_embedding_error(self.embedder.name(), e))
    }

    pub(crate) fn ensure_searchable(&self, k: usize) -> Result<()> {
        if !self.ready {
            return Err(RagError::IndexNotReady);
        }
        if k == 0 {
            return Err(RagError::Config("k must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// 저장된 레코드 수
    pub fn len(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// 첫 `add` 성공 여부
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// 인덱스 벡터 차원 (첫 삽입 전에는 None)
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn backend_name(&self) -> &str {
        self.store.name()
    }
}

/// 프로바이더 에러를 `EmbeddingFailed`로 정규화
fn as_embedding_error(provider: &str, error: RagError) -> RagError {
    match error {
        e @ RagError::EmbeddingFailed { .. } => e,
        other => RagError::embedding(provider, other),
    }
}

// ============================================================================
// Tests
// ============================================================================
