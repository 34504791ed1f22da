//! 웹 로더 - URL 콘텐츠 추출
//!
//! 셀렉터와 일치하는 모든 요소의 텍스트를 공백 정리 후 하나의 문서로 합칩니다.

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::document::Document;
use crate::error::{RagError, Result};

use super::{provenance, DocumentLoader};

/// 웹 페이지 로더
pub struct WebLoader {
    client: reqwest::Client,
    url: String,
    selector: String,
}

impl WebLoader {
    /// 로더 생성 (셀렉터는 여기서 검증)
    pub fn new(client: reqwest::Client, url: &str, selector: &str) -> Result<Self> {
        parse_selector(selector)?;
        Ok(Self {
            client,
            url: url.to_string(),
            selector: selector.to_string(),
        })
    }
}

#[async_trait]
impl DocumentLoader for WebLoader {
    async fn load(&self) -> Result<Vec<Document>> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| RagError::unavailable(&self.url, format!("invalid URL: {}", e)))?;

        tracing::info!("Scraping: {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RagError::unavailable(&self.url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RagError::unavailable(&self.url, format!("HTTP {}", status)));
        }

        let html = response
            .text()
            .await
            .map_err(|e| RagError::unavailable(&self.url, e))?;

        let page = extract_page(&html, &self.selector)?;
        if page.content.is_empty() {
            tracing::warn!(url = %self.url, selector = %self.selector, "no text matched selector");
        }

        let mut metadata = provenance(&self.url);
        if let Some(title) = page.title {
            metadata.insert("title".to_string(), Value::from(title));
        }

        Ok(vec![Document::new(page.content, metadata)])
    }

    fn kind(&self) -> &'static str {
        "web"
    }
}

// ============================================================================
// HTML Extraction
// ============================================================================

struct ExtractedPage {
    title: Option<String>,
    content: String,
}

fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| RagError::Config(format!("invalid CSS selector '{}': {:?}", selector, e)))
}

/// HTML에서 제목 + 셀렉터 본문 추출
fn extract_page(html: &str, selector: &str) -> Result<ExtractedPage> {
    let selector = parse_selector(selector)?;
    let document = Html::parse_document(html);

    let content = document
        .select(&selector)
        .map(|element| extract_text_from_element(&element))
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(ExtractedPage {
        title: extract_title(&document),
        content,
    })
}

/// 제목 추출 (<title> -> <h1>)
fn extract_title(document: &Html) -> Option<String> {
    for tag in ["title", "h1"] {
        if let Ok(selector) = Selector::parse(tag) {
            if let Some(element) = document.select(&selector).next() {
                let title = element.text().collect::<String>().trim().to_string();
                if !title.is_empty() {
                    return Some(title);
                }
            }
        }
    }

    None
}

/// 요소에서 텍스트 추출 (스크립트/스타일 제외)
fn extract_text_from_element(element: &ElementRef) -> String {
    let mut text = String::new();

    for node in element.descendants() {
        let Some(fragment) = node.value().as_text() else {
            continue;
        };
        let inside_code = node
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|parent| matches!(parent.value().name(), "script" | "style" | "noscript"));
        if inside_code {
            continue;
        }

        let trimmed = fragment.trim();
        if !trimmed.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(trimmed);
        }
    }

    // 연속 공백 정리
    if let Ok(re) = regex::Regex::new(r"\s+") {
        re.replace_all(&text, " ").trim().to_string()
    } else {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

// ============================================================================
// Tests
// ============================================================================
