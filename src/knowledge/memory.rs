//! In-memory Vector Store - 정확한 선형 탐색
//!
//! 모든 벡터와 코사인 유사도를 계산합니다 (쿼리당 O(n)).
//! 개발/테스트 및 소규모 인덱스용입니다.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::document::IndexedRecord;
use crate::error::Result;

use super::vector::{cosine_similarity, rank_order, ScoredRecord, VectorStore};

const BACKEND_NAME: &str = "memory";

/// 인메모리 벡터 저장소
///
/// 레코드는 삽입 순서대로 `Vec`에 보관됩니다.
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    records: RwLock<Vec<IndexedRecord>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_batch(&self, records: Vec<IndexedRecord>) -> Result<usize> {
        let inserted = records.len();
        self.records.write().await.extend(records);
        Ok(inserted)
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ScoredRecord>> {
        let records = self.records.read().await;

        // 점수만 먼저 계산하고, 상위 `limit`개만 복제
        let mut ranked: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (idx, cosine_similarity(query_embedding, &record.vector)))
            .collect();
        ranked.sort_by(|&(a, a_score), &(b, b_score)| {
            rank_order(a_score, records[a].seq, b_score, records[b].seq)
        });
        ranked.truncate(limit);

        let scored: Vec<ScoredRecord> = ranked
            .into_iter()
            .map(|(idx, score)| ScoredRecord {
                record: records[idx].clone(),
                score,
            })
            .collect();

        tracing::debug!(
            candidates = records.len(),
            returned = scored.len(),
            "memory vector search"
        );
        Ok(scored)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn clear(&self) -> Result<()> {
        self.records.write().await.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        BACKEND_NAME
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn record(seq: u64, vector: Vec<f32>) -> IndexedRecord {
        IndexedRecord {
            id: uuid::Uuid::new_v4().to_string(),
            seq,
            vector,
            chunk: Chunk::new(format!("chunk {}", seq), Default::default()),
        }
    }

    #[tokio::test]
    async fn test_memory_store_basic() {
        let store = MemoryVectorStore::new();
        assert_eq!(store.count().await.unwrap(), 0);

        let inserted = store
            .insert_batch(vec![record(0, vec![1.0, 0.0]), record(1, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_memory_search_order_and_limit() {
        let store = MemoryVectorStore::new();
        store
            .insert_batch(vec![
                record(0, vec![0.0, 1.0]),
                record(1, vec![1.0, 0.0]),
                record(2, vec![1.0, 1.0]),
                record(3, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let results = store.search(&[1.0, 0.0], 3).await.unwrap();
        let order: Vec<u64> = results.iter().map(|r| r.record.seq).collect();
        // 1, 3은 동점 -> 삽입 순서
        assert_eq!(order, vec![1, 3, 2]);
        assert!(results[0].score >= results[2].score);
    }

    #[tokio::test]
    async fn test_memory_ties_at_limit_keep_earliest() {
        let store = MemoryVectorStore::new();
        store
            .insert_batch(vec![
                record(0, vec![1.0, 0.0]),
                record(1, vec![1.0, 0.0]),
                record(2, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let top = store.search(&[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].record.seq, 0);
        assert_eq!(top[0].record.chunk.content(), "chunk 0");
    }

    #[tokio::test]
    async fn test_memory_clear() {
        let store = MemoryVectorStore::new();
        store.insert_batch(vec![record(0, vec![1.0, 0.0])]).await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.search(&[1.0, 0.0], 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_memory_search_empty() {
        let store = MemoryVectorStore::new();
        let results = store.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }
}
