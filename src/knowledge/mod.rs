//! Knowledge 모듈 - 청킹, 벡터 인덱스, 검색
//!
//! - Chunker: 구분자 우선순위 기반 텍스트 분할 (겹침 유지)
//! - VectorIndex: 임베딩 + 백엔드 저장 + 최근접 검색
//! - Memory / LanceDB: 같은 계약을 구현하는 두 백엔드
//! - Retriever: similarity / MMR / threshold 전략

mod chunker;
mod index;
mod lance;
mod memory;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{default_chunker, text_splitter, ChunkConfig, Chunker, TextSplitter};
pub use index::{VectorIndex, VectorStoreConfig};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use retriever::{mmr_select, RetrievalOptions, Retriever, SearchStrategy};
pub use vector::{cosine_similarity, ScoredRecord, VectorStore};
