//! 로더 모듈 - 소스 설정을 Document 생산자로 변환
//!
//! - web: URL 가져와서 CSS 셀렉터로 본문 추출
//! - file: txt / pdf 단일 파일
//! - text: 메모리 내 문자열
//! - directory: 폴더 재귀 수집 (.gitignore 존중)
//!
//! 설정은 [`LoaderRegistry::resolve`]에서 한 번만 해석됩니다.
//! 형식/셀렉터 오류는 이 시점에, 네트워크/파일 오류는 `load` 시점에 드러납니다.

mod directory;
mod file;
mod web;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::document::{Document, Metadata, SOURCE_KEY};
use crate::error::{RagError, Result};

pub use directory::DirectoryLoader;
pub use file::{FileFormat, FileLoader};
pub use web::WebLoader;

/// 로드 시각 메타데이터 키
pub const LOADED_AT_KEY: &str = "loaded_at";

// ============================================================================
// Loader Configuration
// ============================================================================

fn default_selector() -> String {
    "body".to_string()
}

/// 로더 설정 (닫힌 태그 유니온)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LoaderConfig {
    /// 웹 페이지
    Web {
        url: String,
        #[serde(default = "default_selector")]
        selector: String,
    },
    /// 로컬 파일 (format: pdf | txt)
    File { path: PathBuf, format: String },
    /// 원시 텍스트
    Text { content: String },
    /// 폴더 (기본 확장자: txt, md, pdf)
    Directory {
        path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        extensions: Option<Vec<String>>,
    },
}

impl LoaderConfig {
    pub fn web(url: impl Into<String>) -> Self {
        Self::Web {
            url: url.into(),
            selector: default_selector(),
        }
    }

    pub fn file(path: impl Into<PathBuf>, format: impl Into<String>) -> Self {
        Self::File {
            path: path.into(),
            format: format.into(),
        }
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self::Directory {
            path: path.into(),
            extensions: None,
        }
    }

    /// 로그용 짧은 설명
    pub fn describe(&self) -> String {
        match self {
            Self::Web { url, .. } => format!("web:{}", url),
            Self::File { path, format } => format!("file:{} ({})", path.display(), format),
            Self::Text { content } => format!("text ({} chars)", content.chars().count()),
            Self::Directory { path, .. } => format!("directory:{}", path.display()),
        }
    }
}

// ============================================================================
// DocumentLoader Trait
// ============================================================================

/// Document 생산자
#[async_trait]
pub trait DocumentLoader: Send + Sync {
    /// 소스에서 문서 로드
    async fn load(&self) -> Result<Vec<Document>>;

    /// 로더 종류
    fn kind(&self) -> &'static str;
}

/// 출처 + 로드 시각 메타데이터
pub(crate) fn provenance(source: &str) -> Metadata {
    let mut metadata = Metadata::new();
    metadata.insert(SOURCE_KEY.to_string(), Value::from(source));
    metadata.insert(
        LOADED_AT_KEY.to_string(),
        Value::from(chrono::Utc::now().to_rfc3339()),
    );
    metadata
}

// ============================================================================
// Text Loader
// ============================================================================

/// 메모리 내 문자열 로더 (실패하지 않음)
pub struct TextLoader {
    content: String,
}

impl TextLoader {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// 합성 출처: `text:<SHA-256 앞 12자리>`
    pub fn source_id(content: &str) -> String {
        let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
        format!("text:{}", &digest[..12])
    }
}

#[async_trait]
impl DocumentLoader for TextLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let source = Self::source_id(&self.content);
        Ok(vec![Document::new(
            self.content.clone(),
            provenance(&source),
        )])
    }

    fn kind(&self) -> &'static str {
        "text"
    }
}

// ============================================================================
// Loader Registry
// ============================================================================

/// 설정 -> 로더 해석기
///
/// 웹 로더가 공유하는 HTTP 클라이언트를 보관합니다.
pub struct LoaderRegistry {
    client: reqwest::Client,
}

impl LoaderRegistry {
    /// 새 레지스트리 생성
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("ragflow/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(Self { client })
    }

    /// 설정을 로더로 해석
    pub fn resolve(&self, config: &LoaderConfig) -> Result<Box<dyn DocumentLoader>> {
        match config {
            LoaderConfig::Web { url, selector } => Ok(Box::new(WebLoader::new(
                self.client.clone(),
                url,
                selector,
            )?)),
            LoaderConfig::File { path, format } => {
                let format: FileFormat = format.parse()?;
                Ok(Box::new(FileLoader::new(path.clone(), format)))
            }
            LoaderConfig::Text { content } => Ok(Box::new(TextLoader::new(content.clone()))),
            LoaderConfig::Directory { path, extensions } => Ok(Box::new(DirectoryLoader::new(
                path.clone(),
                extensions.clone(),
            )?)),
        }
    }

    /// 해석 + 로드
    pub async fn load(&self, config: &LoaderConfig) -> Result<Vec<Document>> {
        let loader = self.resolve(config)?;
        let documents = loader.load().await?;
        tracing::info!(
            loader = loader.kind(),
            source = %config.describe(),
            documents = documents.len(),
            "loaded documents"
        );
        Ok(documents)
    }
}

// ============================================================================
// Tests
// ============================================================================
