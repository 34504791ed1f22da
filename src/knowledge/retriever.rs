//! Retriever - 검색 전략 (similarity / MMR / threshold)
//!
//! MMR (Maximal Marginal Relevance):
//! MMR = λ × relevance(candidate, query) - (1-λ) × max(similarity(candidate, selected))
//!
//! λ = 1.0: 순수 유사도 순위와 동일
//! λ = 0.5: 관련성과 다양성 균형
//! λ = 0.0: 순수 다양성

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, RetrievalResult};
use crate::error::{RagError, Result};

use super::index::VectorIndex;
use super::vector::{cosine_similarity, ScoredRecord};

// ============================================================================
// Strategy & Options
// ============================================================================

/// 검색 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SearchStrategy {
    /// 상위 k개 유사도 결과
    #[default]
    Similarity,
    /// 다양성을 고려한 MMR 재선택
    Mmr,
    /// 유사도 컷오프 이상만 반환
    Threshold,
}

impl SearchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Similarity => "similarity",
            Self::Mmr => "mmr",
            Self::Threshold => "threshold",
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "similarity" => Ok(Self::Similarity),
            "mmr" | "maximal-marginal-relevance" => Ok(Self::Mmr),
            "threshold" | "similarity_score_threshold" => Ok(Self::Threshold),
            _ => Err(RagError::UnknownStrategy {
                name: s.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for SearchStrategy {
    type Error = RagError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<SearchStrategy> for String {
    fn from(strategy: SearchStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 검색 옵션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    /// 반환할 청크 수
    pub k: usize,
    pub strategy: SearchStrategy,
    /// MMR 관련성 가중치 (0.0 ~ 1.0)
    pub lambda: f32,
    /// MMR 후보 풀 크기 (k보다 작으면 k로 올림)
    pub fetch_k: usize,
    /// threshold 전략의 최소 점수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score_threshold: Option<f32>,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            k: 4,
            strategy: SearchStrategy::Similarity,
            lambda: 0.5,
            fetch_k: 20,
            score_threshold: None,
        }
    }
}

impl RetrievalOptions {
    /// 유사도 검색 옵션
    pub fn similarity(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    /// MMR 옵션
    pub fn mmr(k: usize, fetch_k: usize, lambda: f32) -> Self {
        Self {
            k,
            strategy: SearchStrategy::Mmr,
            lambda,
            fetch_k,
            ..Default::default()
        }
    }

    /// threshold 옵션
    pub fn threshold(k: usize, score_threshold: f32) -> Self {
        Self {
            k,
            strategy: SearchStrategy::Threshold,
            score_threshold: Some(score_threshold),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(RagError::Config("retrieval.k must be greater than zero".to_string()));
        }
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(RagError::Config(format!(
                "retrieval.lambda must be within [0, 1], got {}",
                self.lambda
            )));
        }
        if self.strategy == SearchStrategy::Threshold && self.score_threshold.is_none() {
            return Err(RagError::Config(
                "retrieval.score_threshold is required for the threshold strategy".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// Retriever
// ============================================================================

/// 벡터 인덱스 + 검색 전략
pub struct Retriever<'a> {
    index: &'a VectorIndex,
}

impl<'a> Retriever<'a> {
    pub fn new(index: &'a VectorIndex) -> Self {
        Self { index }
    }

    /// 관련 청크 검색
    pub async fn retrieve(&self, query: &str, options: &RetrievalOptions) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(query, options)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect())
    }

    /// 점수 포함 검색
    pub async fn retrieve_scored(
        &self,
        query: &str,
        options: &RetrievalOptions,
    ) -> Result<Vec<RetrievalResult>> {
        options.validate()?;

        let results = match options.strategy {
            SearchStrategy::Similarity => self.index.search_by_text(query, options.k).await?,
            SearchStrategy::Threshold => {
                let cutoff = options.score_threshold.unwrap_or(f32::NEG_INFINITY);
                self.index
                    .search_by_text(query, options.k)
                    .await?
                    .into_iter()
                    .filter(|r| r.score >= cutoff)
                    .collect()
            }
            SearchStrategy::Mmr => {
                self.index.ensure_searchable(options.k)?;
                let query_vector = self.index.embed_query(query).await?;
                let fetch_k = options.fetch_k.max(options.k);
                let candidates = self.index.search_records(&query_vector, fetch_k).await?;
                mmr_select(candidates, options.k, options.lambda)
                    .into_iter()
                    .map(|r| RetrievalResult {
                        chunk: r.record.chunk,
                        score: r.score,
                    })
                    .collect()
            }
        };

        tracing::debug!(
            strategy = %options.strategy,
            k = options.k,
            returned = results.len(),
            "retrieval completed"
        );
        Ok(results)
    }

    /// 여러 쿼리 동시 검색
    ///
    /// 결과는 입력 순서대로 반환되며, 한 쿼리의 실패는 다른 쿼리에 영향을 주지 않습니다.
    pub async fn retrieve_batch(
        &self,
        queries: &[String],
        options: &RetrievalOptions,
    ) -> Vec<Result<Vec<Chunk>>> {
        futures::future::join_all(queries.iter().map(|q| self.retrieve(q, options))).await
    }
}

// ============================================================================
// MMR
// ============================================================================

/// MMR 탐욕 선택
///
/// `candidates`는 관련성 내림차순이어야 합니다. 점수가 같으면 앞선 후보를 선택하므로
/// λ = 1.0이면 입력 순서의 상위 k개와 같습니다. 반환 점수는 원래 관련성 점수입니다.
pub fn mmr_select(candidates: Vec<ScoredRecord>, k: usize, lambda: f32) -> Vec<ScoredRecord> {
    if candidates.is_empty() || k == 0 {
        return Vec::new();
    }

    let k = k.min(candidates.len());
    let mut selected: Vec<ScoredRecord> = Vec::with_capacity(k);
    let mut remaining = candidates;

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx = 0;
        let mut best_mmr = f32::NEG_INFINITY;

        for (idx, candidate) in remaining.iter().enumerate() {
            let max_similarity = selected
                .iter()
                .map(|s| cosine_similarity(&candidate.record.vector, &s.record.vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { max_similarity };

            let mmr_score = lambda * candidate.score - (1.0 - lambda) * redundancy;
            if mmr_score > best_mmr {
                best_mmr = mmr_score;
                best_idx = idx;
            }
        }

        selected.push(remaining.remove(best_idx));
    }

    selected
}

// ============================================================================
// Tests
// ============================================================================
