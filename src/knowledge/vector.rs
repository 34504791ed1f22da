//! Vector Store - 벡터 저장소 트레이트 및 유틸리티
//!
//! 인메모리(선형 탐색)와 LanceDB 백엔드가 같은 계약을 구현합니다.
//! 점수는 항상 코사인 유사도(높을수록 좋음)이며, 거리 기반 백엔드는
//! 반환 직전에 유사도로 변환합니다.

use std::cmp::Ordering;

use async_trait::async_trait;

use crate::document::IndexedRecord;
use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 점수가 매겨진 저장 레코드 (벡터 포함 - MMR에서 사용)
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    pub record: IndexedRecord,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub score: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소 백엔드의 공통 인터페이스입니다.
/// 레코드는 삽입 후 변경되지 않으며, 중복 제거를 하지 않습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 레코드 배치 삽입
    async fn insert_batch(&self, records: Vec<IndexedRecord>) -> Result<usize>;

    /// 상위 `limit`개 검색
    ///
    /// 점수 내림차순, 동점이면 `seq` 오름차순(먼저 삽입된 레코드 우선)으로 반환합니다.
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<ScoredRecord>>;

    /// 저장된 레코드 수
    async fn count(&self) -> Result<usize>;

    /// 저장된 레코드 전부 삭제 (새 인덱스로 시작할 때)
    async fn clear(&self) -> Result<()>;

    /// 동시에 진행할 수 있는 임베딩/삽입 배치 수
    fn max_concurrency(&self) -> usize {
        1
    }

    /// 백엔드 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 순위 비교: 점수 내림차순, 동점이면 `seq` 오름차순
pub(crate) fn rank_order(a_score: f32, a_seq: u64, b_score: f32, b_seq: u64) -> Ordering {
    b_score
        .partial_cmp(&a_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_seq.cmp(&b_seq))
}

/// 점수 내림차순 + 삽입 순서 오름차순 정렬
pub(crate) fn rank_records(results: &mut [ScoredRecord]) {
    results.sort_by(|a, b| rank_order(a.score, a.record.seq, b.score, b.record.seq));
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;

    fn scored(seq: u64, score: f32) -> ScoredRecord {
        ScoredRecord {
            record: IndexedRecord {
                id: format!("r{}", seq),
                seq,
                vector: vec![1.0],
                chunk: Chunk::new(format!("chunk {}", seq), Default::default()),
            },
            score,
        }
    }

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - -1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_mismatched_or_empty() {
        let a: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &a), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_rank_records_ties_by_insertion_order() {
        let mut results = vec![scored(3, 0.5), scored(1, 0.9), scored(2, 0.5), scored(0, 0.5)];
        rank_records(&mut results);
        let order: Vec<u64> = results.iter().map(|r| r.record.seq).collect();
        assert_eq!(order, vec![1, 0, 2, 3]);
    }
}
