//! ragflow - 검색 증강 생성(RAG) 파이프라인
//!
//! 문서 로드 -> 청킹 -> 임베딩 -> 벡터 인덱스 -> 검색(similarity / MMR / threshold)
//! -> 언어 모델 답변 생성까지의 흐름을 하나의 상태 머신으로 묶습니다.

pub mod cli;
pub mod config;
pub mod document;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod knowledge;
pub mod loader;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use config::{get_data_dir, EmbeddingConfig, LlmConfig, PipelineConfig};
pub use document::{Chunk, Document, IndexedRecord, Metadata, RetrievalResult};
pub use embedding::{get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use error::{RagError, Result};
pub use generation::{build_prompt, GeminiChat, LanguageModel};
pub use knowledge::{
    default_chunker, mmr_select, text_splitter, ChunkConfig, Chunker, LanceVectorStore,
    MemoryVectorStore, RetrievalOptions, Retriever, SearchStrategy, TextSplitter, VectorIndex,
    VectorStore, VectorStoreConfig,
};
pub use loader::{DocumentLoader, LoaderConfig, LoaderRegistry};
pub use pipeline::{PipelineStats, PipelineStatus, QueryResponse, RagPipeline};
