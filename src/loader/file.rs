//! 파일 로더 - txt / pdf
//!
//! PDF는 pdf-extract로 텍스트를 추출한 뒤 페이지별 문서로 나눕니다.
//! 추출은 CPU 바운드이므로 `spawn_blocking`에서 실행합니다.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use serde_json::Value;

use crate::document::Document;
use crate::error::{RagError, Result};

use super::{provenance, DocumentLoader};

// ============================================================================
// File Format
// ============================================================================

/// 지원하는 파일 형식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Txt,
    Pdf,
}

impl FileFormat {
    /// 확장자로 형식 결정 (마크다운은 텍스트로 취급)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "txt" | "md" => Some(Self::Txt),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

impl FromStr for FileFormat {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "txt" => Ok(Self::Txt),
            "pdf" => Ok(Self::Pdf),
            _ => Err(RagError::UnsupportedFormat {
                format: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Txt => f.write_str("txt"),
            Self::Pdf => f.write_str("pdf"),
        }
    }
}

// ============================================================================
// File Loader
// ============================================================================

/// 단일 파일 로더
pub struct FileLoader {
    path: PathBuf,
    format: FileFormat,
}

impl FileLoader {
    pub fn new(path: PathBuf, format: FileFormat) -> Self {
        Self { path, format }
    }

    async fn load_text(&self, source: &str) -> Result<Vec<Document>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RagError::unavailable(source, e))?;

        Ok(vec![Document::new(text, provenance(source))])
    }

    async fn load_pdf(&self, source: &str) -> Result<Vec<Document>> {
        let path = self.path.clone();
        let pages = tokio::task::spawn_blocking(move || extract_text_from_pdf(&path))
            .await
            .map_err(|e| RagError::unavailable(source, format!("PDF extraction task failed: {}", e)))??;

        let total_pages = pages.len();
        Ok(pages
            .into_iter()
            .map(|(page, text)| {
                let mut metadata = provenance(source);
                metadata.insert("page".to_string(), Value::from(page));
                metadata.insert("total_pages".to_string(), Value::from(total_pages));
                Document::new(text, metadata)
            })
            .collect())
    }
}

#[async_trait]
impl DocumentLoader for FileLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        if !self.path.exists() {
            return Err(RagError::NotFound {
                path: self.path.clone(),
            });
        }

        let source = self.path.display().to_string();
        let documents = match self.format {
            FileFormat::Txt => self.load_text(&source).await?,
            FileFormat::Pdf => self.load_pdf(&source).await?,
        };

        tracing::debug!(path = %source, format = %self.format, documents = documents.len(), "loaded file");
        Ok(documents)
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

// ============================================================================
// PDF Extraction
// ============================================================================

/// PDF에서 페이지별 텍스트 추출
///
/// (페이지 번호, 텍스트) 목록을 반환합니다. 페이지 번호는 1부터 시작합니다.
fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let source = path.display().to_string();
    let bytes = std::fs::read(path).map_err(|e| RagError::unavailable(&source, e))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| RagError::unavailable(&source, format!("PDF text extraction failed: {}", e)))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![(1, String::new())]);
    }

    Ok(split_pdf_pages(&text)
        .into_iter()
        .enumerate()
        .map(|(i, text)| (i + 1, text))
        .collect())
}

/// PDF 텍스트를 페이지별로 분리
fn split_pdf_pages(text: &str) -> Vec<String> {
    // 폼피드 문자 (\x0c)
    let pages: Vec<String> = text
        .split('\x0c')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if pages.len() > 1 {
        return pages;
    }

    // 페이지 구분자 줄 (예: "--- Page 1 ---")
    if let Ok(page_pattern) =
        regex::Regex::new(r"(?m)^[\s]*[-=]+[\s]*(?:Page[\s]*)?(\d+)[\s]*[-=]+[\s]*$")
    {
        let pages: Vec<String> = page_pattern
            .split(text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        if pages.len() > 1 {
            return pages;
        }
    }

    vec![text.trim().to_string()]
}

// ============================================================================
// Tests
// ============================================================================
