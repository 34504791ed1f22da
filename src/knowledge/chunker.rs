//! Text Chunking Module
//!
//! 문서를 겹치는 고정 크기 윈도우로 분할합니다.
//! 윈도우 끝 근처에 문단/줄/문장 경계가 있으면 그 위치에서 자르고,
//! 없으면 `chunk_size`에서 바로 자릅니다.
//!
//! 크기와 오버랩은 모두 문자(char) 단위입니다. 연속된 청크는 정확히
//! `chunk_overlap` 문자만큼 겹치므로, 두 번째 청크부터 앞의 오버랩을 떼고
//! 이어 붙이면 원문이 그대로 복원됩니다.

use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 연속 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// `0 <= chunk_overlap < chunk_size` 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 || self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidChunkConfig {
                chunk_size: self.chunk_size,
                chunk_overlap: self.chunk_overlap,
            });
        }
        Ok(())
    }

    /// 경계 탐색 허용 범위 (윈도우 끝에서 뒤로 몇 문자까지 볼지)
    fn boundary_tolerance(&self) -> usize {
        (self.chunk_size / 10).max(1)
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크 문자열과 시작 위치(문자 단위)로 분할
    fn split_text(&self, text: &str) -> Vec<(usize, String)>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 문서 목록을 청크로 분할 (메타데이터 상속 + 순번 부여)
    fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents
            .iter()
            .flat_map(|doc| {
                self.split_text(doc.content())
                    .into_iter()
                    .enumerate()
                    .map(move |(i, (start, text))| Chunk::from_parent(doc, text, i, start))
            })
            .collect()
    }
}

// ============================================================================
// TextSplitter
// ============================================================================

/// 구조 경계 우선순위: 문단 > 줄 > 문장
const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", "! ", "? "];

/// 경계 인식 슬라이딩 윈도우 청커
#[derive(Debug, Clone)]
pub struct TextSplitter {
    config: ChunkConfig,
}

impl TextSplitter {
    /// 설정 검증 후 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// `[lo, hi]` 범위에서 구분자 바로 뒤 위치 중 가장 뒤쪽을 찾음
    ///
    /// 우선순위가 높은 구분자가 하나라도 있으면 그것을 사용합니다.
    fn find_boundary(chars: &[char], lo: usize, hi: usize) -> Option<usize> {
        if lo > hi {
            return None;
        }

        for sep in SEPARATORS {
            let sep: Vec<char> = sep.chars().collect();
            let found = (lo..=hi).rev().find(|&cut| {
                cut >= sep.len() && chars[cut - sep.len()..cut] == sep[..]
            });
            if found.is_some() {
                return found;
            }
        }

        None
    }
}

impl Chunker for TextSplitter {
    fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        if text.is_empty() {
            return vec![];
        }

        let chars: Vec<char> = text.chars().collect();
        // 문자 인덱스 -> 바이트 오프셋 (끝 위치 포함)
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        let total = chars.len();
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;
        let tolerance = self.config.boundary_tolerance();

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let target = (start + size).min(total);

            let end = if target < total {
                // 다음 윈도우가 전진하려면 end > start + overlap 이어야 함
                let lo = target.saturating_sub(tolerance).max(start + overlap + 1);
                Self::find_boundary(&chars, lo, target).unwrap_or(target)
            } else {
                target
            };

            chunks.push((start, text[offsets[start]..offsets[end]].to_string()));

            if end >= total {
                break;
            }
            start = end - overlap;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "TextSplitter"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 설정 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(TextSplitter {
        config: ChunkConfig::default(),
    })
}

/// 설정을 지정하여 청커 생성
pub fn text_splitter(config: ChunkConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(TextSplitter::new(config)?))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// 두 번째 청크부터 오버랩 접두사를 제거하고 이어 붙임
    fn reconstruct(chunks: &[(usize, String)], overlap: usize) -> String {
        let mut out = String::new();
        for (i, (_, chunk)) in chunks.iter().enumerate() {
            if i == 0 {
                out.push_str(chunk);
            } else {
                out.extend(chunk.chars().skip(overlap));
            }
        }
        out
    }

    fn sample_text() -> String {
        let mut text = String::new();
        for i in 0..40 {
            text.push_str(&format!("Sentence number {} talks about retrieval. ", i));
            if i % 5 == 4 {
                text.push_str("\n\n");
            }
            if i % 7 == 0 {
                text.push_str("한글 문장도 섞여 있습니다! ");
            }
        }
        text
    }

    #[test]
    fn test_invalid_config() {
        let err = TextSplitter::new(ChunkConfig::new(100, 100)).unwrap_err();
        assert!(matches!(
            err,
            RagError::InvalidChunkConfig {
                chunk_size: 100,
                chunk_overlap: 100
            }
        ));
        assert!(TextSplitter::new(ChunkConfig::new(10, 20)).is_err());
        assert!(TextSplitter::new(ChunkConfig::new(0, 0)).is_err());
        assert!(TextSplitter::new(ChunkConfig::new(10, 9)).is_ok());
    }

    #[test]
    fn test_empty_text() {
        let splitter = TextSplitter::new(ChunkConfig::default()).unwrap();
        assert!(splitter.split_text("").is_empty());
    }

    #[test]
    fn test_small_text_single_chunk() {
        let splitter = TextSplitter::new(ChunkConfig::new(100, 10)).unwrap();
        let chunks = splitter.split_text("short text");
        assert_eq!(chunks, vec![(0, "short text".to_string())]);
    }

    #[test]
    fn test_reconstruction_across_configs() {
        let text = sample_text();
        for (size, overlap) in [(1, 0), (5, 0), (5, 4), (17, 3), (50, 10), (64, 63), (200, 50), (1000, 200)] {
            let splitter = TextSplitter::new(ChunkConfig::new(size, overlap)).unwrap();
            let chunks = splitter.split_text(&text);
            assert_eq!(
                reconstruct(&chunks, overlap),
                text,
                "reconstruction failed for size={size}, overlap={overlap}"
            );
        }
    }

    #[test]
    fn test_chunk_sizes_and_exact_overlap() {
        let text = sample_text();
        let (size, overlap) = (60, 15);
        let splitter = TextSplitter::new(ChunkConfig::new(size, overlap)).unwrap();
        let chunks = splitter.split_text(&text);
        assert!(chunks.len() > 2);

        for pair in chunks.windows(2) {
            let (prev_start, prev) = &pair[0];
            let (next_start, next) = &pair[1];
            let prev_tail: String = prev.chars().skip(prev.chars().count() - overlap).collect();
            let next_head: String = next.chars().take(overlap).collect();
            assert_eq!(prev_tail, next_head);
            assert_eq!(*next_start, prev_start + prev.chars().count() - overlap);
        }
        for (_, chunk) in &chunks {
            assert!(chunk.chars().count() <= size);
        }
    }

    #[test]
    fn test_prefers_sentence_boundary() {
        let text = format!("{}. {}", "a".repeat(17), "b".repeat(20));
        let splitter = TextSplitter::new(ChunkConfig::new(20, 0)).unwrap();
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks[0].1, format!("{}. ", "a".repeat(17)));
        assert_eq!(chunks[1].1, "b".repeat(20));
    }

    #[test]
    fn test_paragraph_preferred_over_sentence() {
        // 경계가 허용 범위(tolerance = 2) 밖이면 하드 컷
        let text = format!("{}\n\n{}", "a".repeat(15), "b".repeat(30));
        let splitter = TextSplitter::new(ChunkConfig::new(22, 0)).unwrap();
        let chunks = splitter.split_text(&text);
        assert_eq!(chunks[0].1.chars().count(), 22);

        // 허용 범위 안에 문장 경계와 문단 경계가 모두 있으면 문단 경계 사용
        let splitter = TextSplitter::new(ChunkConfig::new(40, 0)).unwrap();
        let chunks = splitter.split_text(&format!("{}\n\nxx. yy. {}", "a".repeat(34), "b".repeat(30)));
        // tolerance = 4: 범위 [36, 40]에 "\n\n"(36) 과 ". "(40)이 있음 -> 문단 우선
        assert_eq!(chunks[0].1, format!("{}\n\n", "a".repeat(34)));
    }

    #[test]
    fn test_hard_cut_without_boundary() {
        let text = "x".repeat(25);
        let splitter = TextSplitter::new(ChunkConfig::new(10, 2)).unwrap();
        let chunks = splitter.split_text(&text);
        let lens: Vec<usize> = chunks.iter().map(|(_, c)| c.len()).collect();
        assert_eq!(lens, vec![10, 10, 9]);
        assert_eq!(reconstruct(&chunks, 2), text);
    }

    #[test]
    fn test_split_documents_metadata() {
        let doc_a = Document::with_source("a".repeat(30), "a.txt");
        let doc_b = Document::with_source("b".repeat(5), "b.txt");
        let splitter = TextSplitter::new(ChunkConfig::new(10, 0)).unwrap();

        let chunks = splitter.split_documents(&[doc_a, doc_b]);
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[2].source(), Some("a.txt"));
        assert_eq!(chunks[2].index(), Some(2));
        assert_eq!(chunks[3].source(), Some("b.txt"));
        assert_eq!(chunks[3].index(), Some(0));
    }

    #[test]
    fn test_config_default() {
        let config = ChunkConfig::default();
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 200);
        assert!(config.validate().is_ok());
        assert_eq!(default_chunker().name(), "TextSplitter");
    }
}
