//! 폴더 로더
//!
//! .gitignore 패턴을 존중하고 숨김 파일은 건너뜁니다.
//! 지원 확장자(txt, md, pdf)만 수집하며, 경로 순으로 로드합니다.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use ignore::WalkBuilder;

use crate::document::Document;
use crate::error::{RagError, Result};

use super::file::{FileFormat, FileLoader};
use super::DocumentLoader;

const DEFAULT_EXTENSIONS: [&str; 3] = ["txt", "md", "pdf"];

/// 폴더 재귀 로더
pub struct DirectoryLoader {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryLoader {
    /// 로더 생성
    ///
    /// `extensions`가 없으면 지원 확장자 전체를 수집합니다.
    /// 지원하지 않는 확장자를 지정하면 `UnsupportedFormat`입니다.
    pub fn new(root: PathBuf, extensions: Option<Vec<String>>) -> Result<Self> {
        let extensions = match extensions {
            Some(list) => list
                .into_iter()
                .map(|ext| {
                    let ext = ext.trim_start_matches('.').to_lowercase();
                    if DEFAULT_EXTENSIONS.contains(&ext.as_str()) {
                        Ok(ext)
                    } else {
                        Err(RagError::UnsupportedFormat { format: ext })
                    }
                })
                .collect::<Result<Vec<_>>>()?,
            None => DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        };

        Ok(Self { root, extensions })
    }

    /// 대상 파일 목록 수집
    fn collect_files(root: &Path, extensions: &[String]) -> Vec<(PathBuf, FileFormat)> {
        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            let matches_filter = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false);
            if !matches_filter {
                continue;
            }

            if let Some(format) = FileFormat::from_path(path) {
                files.push((path.to_path_buf(), format));
            }
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        files
    }
}

#[async_trait]
impl DocumentLoader for DirectoryLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        if !self.root.is_dir() {
            return Err(RagError::NotFound {
                path: self.root.clone(),
            });
        }

        let root = self.root.clone();
        let extensions = self.extensions.clone();
        let files = tokio::task::spawn_blocking(move || Self::collect_files(&root, &extensions))
            .await
            .map_err(|e| RagError::unavailable(self.root.display(), e))?;

        tracing::info!("Collected {} files from {:?}", files.len(), self.root);

        let mut documents = Vec::new();
        for (path, format) in files {
            documents.extend(FileLoader::new(path, format).load().await?);
        }
        Ok(documents)
    }

    fn kind(&self) -> &'static str {
        "directory"
    }
}

// ============================================================================
// Tests
// ============================================================================
