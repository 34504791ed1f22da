//! 파이프라인 오케스트레이터
//!
//! 상태 머신: `Uninitialized -> Indexing -> Ready`, 실패 시 `Failed`.
//!
//! - initialize: 소스 로드 -> 청킹 -> 인덱스 추가 (실패 시 새 인덱스 폐기)
//! - add_documents: READY 상태에서 인덱스 확장
//! - query: retrieve 단계 -> generate 단계 (상태 변경 없음)

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::document::Chunk;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::{build_prompt, LanguageModel};
use crate::knowledge::{ChunkConfig, Chunker, RetrievalOptions, Retriever, TextSplitter, VectorIndex};
use crate::loader::{LoaderConfig, LoaderRegistry};

// ============================================================================
// Status & Response Types
// ============================================================================

/// 파이프라인 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    Uninitialized,
    Indexing,
    Ready,
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Indexing => "indexing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// 쿼리 한 건의 중간 상태
#[derive(Debug, Clone, Default)]
pub struct QueryState {
    pub question: String,
    pub context: Vec<String>,
    pub answer: String,
}

/// 쿼리 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryMetadata {
    pub retrieved_docs: usize,
    pub processing_time_ms: u64,
}

/// 쿼리 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    pub context: Vec<String>,
    pub metadata: QueryMetadata,
}

/// 파이프라인 통계
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStats {
    pub status: PipelineStatus,
    pub record_count: usize,
    pub document_count: usize,
    pub chunk_count: usize,
    pub backend: String,
}

// ============================================================================
// RagPipeline
// ============================================================================

/// RAG 파이프라인
pub struct RagPipeline {
    config: PipelineConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    llm: Arc<dyn LanguageModel>,
    loaders: LoaderRegistry,
    status: PipelineStatus,
    index: Option<VectorIndex>,
    splitter: Option<TextSplitter>,
    document_count: usize,
    chunk_count: usize,
}

impl RagPipeline {
    /// 파이프라인 생성 (HTTP 클라이언트 생성 실패 시 `Config` 에러)
    pub fn new(
        config: PipelineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        Ok(Self {
            config,
            embedder,
            llm,
            loaders: LoaderRegistry::new()?,
            status: PipelineStatus::Uninitialized,
            index: None,
            splitter: None,
            document_count: 0,
            chunk_count: 0,
        })
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// 인덱스 구축
    ///
    /// `Uninitialized` 또는 `Failed`에서 호출할 수 있으며 항상 빈 인덱스에서 시작합니다
    /// (외부 인덱스의 같은 이름 테이블도 비웁니다). 어떤 단계든 실패하면
    /// 만들던 인덱스를 버리고 `Failed`가 됩니다.
    pub async fn initialize(&mut self, sources: &[LoaderConfig], chunk_config: &ChunkConfig) -> Result<()> {
        if self.status == PipelineStatus::Ready {
            return Err(RagError::AlreadyInitialized);
        }

        tracing::info!(sources = sources.len(), "initializing pipeline");
        self.status = PipelineStatus::Indexing;
        self.index = None;
        self.splitter = None;
        self.document_count = 0;
        self.chunk_count = 0;

        match self.build_index(sources, chunk_config).await {
            Ok((index, splitter, documents, chunks)) => {
                tracing::info!(
                    backend = index.backend_name(),
                    documents,
                    chunks,
                    records = index.len(),
                    "pipeline ready"
                );
                self.index = Some(index);
                self.splitter = Some(splitter);
                self.document_count = documents;
                self.chunk_count = chunks;
                self.status = PipelineStatus::Ready;
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "pipeline initialization failed");
                self.status = PipelineStatus::Failed;
                Err(e)
            }
        }
    }

    async fn build_index(
        &self,
        sources: &[LoaderConfig],
        chunk_config: &ChunkConfig,
    ) -> Result<(VectorIndex, TextSplitter, usize, usize)> {
        let splitter = TextSplitter::new(*chunk_config)?;
        let mut index = VectorIndex::create(&self.config.vector_store, self.embedder.clone()).await?;

        let mut document_count = 0;
        let mut chunks: Vec<Chunk> = Vec::new();
        for source in sources {
            let documents = self.loaders.load(source).await?;
            document_count += documents.len();
            chunks.extend(splitter.split_documents(&documents));
        }

        index.add(&chunks).await?;
        Ok((index, splitter, document_count, chunks.len()))
    }

    /// READY 상태에서 소스 추가
    ///
    /// 실패해도 상태는 `Ready`로 유지되며 인덱스는 변경되지 않습니다.
    pub async fn add_documents(&mut self, source: LoaderConfig) -> Result<usize> {
        let (index, splitter) = match (self.status, self.index.as_mut(), self.splitter.as_ref()) {
            (PipelineStatus::Ready, Some(index), Some(splitter)) => (index, splitter),
            (status, _, _) => {
                return Err(RagError::PipelineNotReady {
                    status: status.to_string(),
                })
            }
        };

        let documents = self.loaders.load(&source).await?;
        let chunks = splitter.split_documents(&documents);
        let added = index.add(&chunks).await?;

        self.document_count += documents.len();
        self.chunk_count += chunks.len();
        tracing::info!(
            source = %source.describe(),
            documents = documents.len(),
            chunks = added,
            total = index.len(),
            "documents added"
        );
        Ok(added)
    }

    fn ready_index(&self) -> Result<&VectorIndex> {
        match (self.status, self.index.as_ref()) {
            (PipelineStatus::Ready, Some(index)) => Ok(index),
            (status, _) => Err(RagError::PipelineNotReady {
                status: status.to_string(),
            }),
        }
    }

    /// 기본 검색 옵션으로 질의
    pub async fn query(&self, question: &str) -> Result<QueryResponse> {
        self.query_with(question, &self.config.retrieval).await
    }

    /// 검색 옵션을 지정하여 질의
    pub async fn query_with(&self, question: &str, options: &RetrievalOptions) -> Result<QueryResponse> {
        let index = self.ready_index()?;
        let started = Instant::now();

        let state = QueryState {
            question: question.to_string(),
            ..Default::default()
        };
        let state = retrieve_stage(index, state, options).await?;
        let state = generate_stage(self.llm.as_ref(), state).await?;

        let response = QueryResponse {
            metadata: QueryMetadata {
                retrieved_docs: state.context.len(),
                processing_time_ms: started.elapsed().as_millis() as u64,
            },
            answer: state.answer,
            context: state.context,
        };

        tracing::info!(
            retrieved_docs = response.metadata.retrieved_docs,
            elapsed_ms = response.metadata.processing_time_ms,
            "query answered"
        );
        Ok(response)
    }

    /// 검색만 수행 (생성 없음)
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        let index = self.ready_index()?;
        Retriever::new(index).retrieve(question, &self.config.retrieval).await
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            status: self.status,
            record_count: self.index.as_ref().map(VectorIndex::len).unwrap_or(0),
            document_count: self.document_count,
            chunk_count: self.chunk_count,
            backend: self
                .index
                .as_ref()
                .map(|index| index.backend_name().to_string())
                .unwrap_or_else(|| self.config.vector_store.backend_name().to_string()),
        }
    }
}

// ============================================================================
// Query Stages
// ============================================================================

/// 1단계: 관련 청크 검색
async fn retrieve_stage(index: &VectorIndex, mut state: QueryState, options: &RetrievalOptions) -> Result<QueryState> {
    let chunks = Retriever::new(index).retrieve(&state.question, options).await?;
    state.context = chunks.into_iter().map(|c| c.content().to_string()).collect();
    Ok(state)
}

/// 2단계: 프롬프트 구성 후 답변 생성
async fn generate_stage(llm: &dyn LanguageModel, mut state: QueryState) -> Result<QueryState> {
    let prompt = build_prompt(&state.question, &state.context);
    state.answer = llm.generate(&prompt).await.map_err(|e| match e {
        e @ RagError::GenerationFailed { .. } => e,
        other => RagError::GenerationFailed {
            model: llm.name().to_string(),
            message: other.to_string(),
        },
    })?;
    Ok(state)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::{SearchStrategy, VectorStoreConfig};
    use crate::test_support::{FailingEmbedding, KeywordEmbedding, ScriptedLlm};
    use tempfile::TempDir;

    const DOGS: &str = "Dogs are loyal companions.";
    const CATS: &str = "Cats enjoy independence.";

    fn pets() -> Vec<LoaderConfig> {
        vec![LoaderConfig::text(DOGS), LoaderConfig::text(CATS)]
    }

    fn pipeline_with(k: usize, llm: Arc<ScriptedLlm>) -> RagPipeline {
        let mut config = PipelineConfig::default();
        config.retrieval.k = k;
        RagPipeline::new(config, Arc::new(KeywordEmbedding::pets()), llm).unwrap()
    }

    fn remote_config(dir: &TempDir, k: usize) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.retrieval.k = k;
        config.vector_store = VectorStoreConfig::Remote {
            index_name: "pets".to_string(),
            max_concurrency: 1,
            uri: Some(dir.path().join("vectors.lance").display().to_string()),
        };
        config
    }

    #[test]
    fn test_new_pipeline_is_uninitialized() {
        let pipeline = RagPipeline::new(
            PipelineConfig::default(),
            Arc::new(KeywordEmbedding::pets()),
            Arc::new(ScriptedLlm::answering("ok")),
        )
        .unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Uninitialized);
        assert_eq!(pipeline.stats().record_count, 0);
    }

    #[tokio::test]
    async fn test_query_before_initialize() {
        let pipeline = pipeline_with(1, Arc::new(ScriptedLlm::answering("dogs")));
        let err = pipeline.query("loyal pet").await.unwrap_err();
        assert!(matches!(err, RagError::PipelineNotReady { ref status } if status == "uninitialized"));
        assert_eq!(pipeline.status(), PipelineStatus::Uninitialized);
    }

    #[tokio::test]
    async fn test_end_to_end_query() {
        let llm = Arc::new(ScriptedLlm::answering("Dogs."));
        let mut pipeline = pipeline_with(1, llm.clone());
        pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Ready);

        let response = pipeline.query("loyal pet").await.unwrap();
        assert_eq!(response.answer, "Dogs.");
        assert_eq!(response.context, vec![DOGS.to_string()]);
        assert_eq!(response.metadata.retrieved_docs, 1);

        let prompt = llm.last_prompt().unwrap();
        assert!(prompt.contains("Question: loyal pet"));
        assert!(prompt.contains(DOGS));
        assert!(!prompt.contains(CATS));

        let stats = pipeline.stats();
        assert_eq!(stats.record_count, 2);
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.backend, "memory");
    }

    #[tokio::test]
    async fn test_k_larger_than_index() {
        let mut pipeline = pipeline_with(3, Arc::new(ScriptedLlm::answering("ok")));
        pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();

        let response = pipeline.query("loyal pet").await.unwrap();
        assert_eq!(response.metadata.retrieved_docs, 2);
        assert_eq!(response.context[0], DOGS);
    }

    #[tokio::test]
    async fn test_initialize_twice() {
        let mut pipeline = pipeline_with(1, Arc::new(ScriptedLlm::answering("ok")));
        pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();
        assert!(matches!(
            pipeline.initialize(&pets(), &ChunkConfig::default()).await,
            Err(RagError::AlreadyInitialized)
        ));
        assert_eq!(pipeline.stats().record_count, 2);
    }

    #[tokio::test]
    async fn test_loader_failure_marks_failed_then_retry() {
        let mut pipeline = pipeline_with(1, Arc::new(ScriptedLlm::answering("ok")));
        let sources = vec![
            LoaderConfig::text(DOGS),
            LoaderConfig::file("/nonexistent/manual.pdf", "pdf"),
        ];

        let err = pipeline.initialize(&sources, &ChunkConfig::default()).await.unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
        assert_eq!(pipeline.status(), PipelineStatus::Failed);
        assert_eq!(pipeline.stats().record_count, 0);

        let err = pipeline.query("loyal pet").await.unwrap_err();
        assert!(matches!(err, RagError::PipelineNotReady { ref status } if status == "failed"));

        pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();
        assert_eq!(pipeline.status(), PipelineStatus::Ready);
    }

    #[tokio::test]
    async fn test_invalid_chunk_config_fails() {
        let mut pipeline = pipeline_with(1, Arc::new(ScriptedLlm::answering("ok")));
        let err = pipeline
            .initialize(&pets(), &ChunkConfig::new(100, 100))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidChunkConfig { .. }));
        assert_eq!(pipeline.status(), PipelineStatus::Failed);
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_initialize() {
        let mut pipeline = RagPipeline::new(
            PipelineConfig::default(),
            Arc::new(FailingEmbedding),
            Arc::new(ScriptedLlm::answering("ok")),
        )
        .unwrap();
        let err = pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingFailed { .. }));
        assert_eq!(pipeline.status(), PipelineStatus::Failed);
    }

    #[tokio::test]
    async fn test_remote_initialize_starts_fresh_each_run() {
        let dir = TempDir::new().unwrap();

        for _ in 0..2 {
            let mut pipeline = RagPipeline::new(
                remote_config(&dir, 4),
                Arc::new(KeywordEmbedding::pets()),
                Arc::new(ScriptedLlm::answering("ok")),
            )
            .unwrap();
            pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();

            let stats = pipeline.stats();
            assert_eq!(stats.backend, "lancedb");
            assert_eq!(stats.record_count, 2);
            assert_eq!(stats.chunk_count, 2);

            let chunks = pipeline.retrieve("loyal pet").await.unwrap();
            let contents: Vec<&str> = chunks.iter().map(|c| c.content()).collect();
            assert_eq!(contents, vec![DOGS, CATS]);
        }
    }

    #[tokio::test]
    async fn test_remote_retry_after_failure_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let mut pipeline = RagPipeline::new(
            remote_config(&dir, 4),
            Arc::new(KeywordEmbedding::pets()),
            Arc::new(ScriptedLlm::answering("ok")),
        )
        .unwrap();

        let mut sources = pets();
        sources.push(LoaderConfig::file("/nonexistent/notes.txt", "txt"));
        let err = pipeline
            .initialize(&sources, &ChunkConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
        assert_eq!(pipeline.status(), PipelineStatus::Failed);

        pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();
        assert!(matches!(
            pipeline.initialize(&pets(), &ChunkConfig::default()).await,
            Err(RagError::AlreadyInitialized)
        ));
        assert_eq!(pipeline.status(), PipelineStatus::Ready);
        assert_eq!(pipeline.stats().record_count, 2);
        assert_eq!(pipeline.retrieve("loyal pet").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure() {
        let mut pipeline = pipeline_with(1, Arc::new(ScriptedLlm::failing()));
        pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();

        let err = pipeline.query("loyal pet").await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailed { .. }));
        assert_eq!(pipeline.status(), PipelineStatus::Ready);

        // 검색은 계속 가능
        let chunks = pipeline.retrieve("loyal pet").await.unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_add_documents() {
        let mut pipeline = pipeline_with(4, Arc::new(ScriptedLlm::answering("ok")));
        assert!(matches!(
            pipeline.add_documents(LoaderConfig::text(DOGS)).await,
            Err(RagError::PipelineNotReady { .. })
        ));

        pipeline
            .initialize(&[LoaderConfig::text(DOGS)], &ChunkConfig::default())
            .await
            .unwrap();
        let added = pipeline.add_documents(LoaderConfig::text(CATS)).await.unwrap();
        assert_eq!(added, 1);
        assert_eq!(pipeline.stats().record_count, 2);

        let err = pipeline
            .add_documents(LoaderConfig::file("/nonexistent/notes.txt", "txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
        assert_eq!(pipeline.status(), PipelineStatus::Ready);
        assert_eq!(pipeline.stats().record_count, 2);
        assert_eq!(pipeline.stats().document_count, 2);
    }

    #[tokio::test]
    async fn test_empty_sources_ready_with_empty_results() {
        let mut pipeline = pipeline_with(2, Arc::new(ScriptedLlm::answering("I don't know.")));
        pipeline.initialize(&[], &ChunkConfig::default()).await.unwrap();

        let response = pipeline.query("anything").await.unwrap();
        assert!(response.context.is_empty());
        assert_eq!(response.answer, "I don't know.");
    }

    #[tokio::test]
    async fn test_query_with_override_and_concurrency() {
        let mut pipeline = pipeline_with(1, Arc::new(ScriptedLlm::answering("ok")));
        pipeline.initialize(&pets(), &ChunkConfig::default()).await.unwrap();

        let options = RetrievalOptions {
            k: 2,
            strategy: SearchStrategy::Mmr,
            ..Default::default()
        };
        let (first, second) = tokio::join!(
            pipeline.query_with("loyal pet", &options),
            pipeline.query("cats independence"),
        );
        assert_eq!(first.unwrap().metadata.retrieved_docs, 2);
        assert_eq!(second.unwrap().context, vec![CATS.to_string()]);
    }

    #[test]
    fn test_response_serializes() {
        let response = QueryResponse {
            answer: "Dogs.".to_string(),
            context: vec![DOGS.to_string()],
            metadata: QueryMetadata {
                retrieved_docs: 1,
                processing_time_ms: 12,
            },
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["metadata"]["retrieved_docs"], 1);
        assert_eq!(json["context"][0], DOGS);
    }
}
