//! 생성 모듈 - 언어 모델 호출 및 RAG 프롬프트
//!
//! 파이프라인은 [`LanguageModel`] 트레이트만 사용합니다.
//! 기본 구현은 Gemini `generateContent` API입니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::embedding::get_api_key;
use crate::error::{RagError, Result};

// ============================================================================
// LanguageModel Trait
// ============================================================================

/// 언어 모델 트레이트
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// 프롬프트에 대한 응답 텍스트 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// RAG Prompt
// ============================================================================

const RAG_PROMPT_PREAMBLE: &str = "You are an assistant for question-answering tasks. \
Use the following pieces of retrieved context to answer the question. \
If you don't know the answer, just say that you don't know. \
Use three sentences maximum and keep the answer concise.";

/// 질문 + 검색된 컨텍스트로 프롬프트 구성
///
/// 컨텍스트 조각은 빈 줄(`\n\n`)로 구분됩니다.
pub fn build_prompt(question: &str, context: &[String]) -> String {
    format!(
        "{}\nQuestion: {}\nContext: {}\nAnswer:",
        RAG_PROMPT_PREAMBLE,
        question,
        context.join("\n\n")
    )
}

// ============================================================================
// Gemini
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 기본 생성 모델
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Gemini 생성 모델
pub struct GeminiChat {
    api_key: String,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
    client: reqwest::Client,
}

impl GeminiChat {
    /// 설정으로 생성
    pub fn with_config(api_key: String, config: &LlmConfig) -> Result<Self> {
        if config.model.trim().is_empty() {
            return Err(RagError::Config("llm.model must not be empty".to_string()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
            client,
        })
    }

    /// 환경변수 API 키 + 설정으로 생성
    pub fn from_env_with_config(config: &LlmConfig) -> Result<Self> {
        Self::with_config(get_api_key()?, config)
    }

    fn failed(&self, message: impl ToString) -> RagError {
        RagError::GenerationFailed {
            model: self.model.clone(),
            message: message.to_string(),
        }
    }

    fn request_for(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl LanguageModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model);
        let request = self.request_for(prompt);

        for attempt in 0..=MAX_RETRIES {
            let response = self
                .client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
                .map_err(|e| self.failed(format!("Failed to send request: {}", e)))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| self.failed(format!("Failed to read response body: {}", e)))?;

            if status.as_u16() == 429 && attempt < MAX_RETRIES {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(?backoff, attempt = attempt + 1, "rate limit hit (429), backing off");
                tokio::time::sleep(backoff).await;
                continue;
            }

            if !status.is_success() {
                return Err(self.failed(format!("Gemini API error ({}): {}", status, body)));
            }

            let response: GenerateResponse = serde_json::from_str(&body)
                .map_err(|e| self.failed(format!("Failed to parse response: {}", e)))?;
            let text = response.text().ok_or_else(|| self.failed("response contained no candidates"))?;

            tracing::debug!(model = %self.model, chars = text.len(), "generation completed");
            return Ok(text);
        }

        Err(self.failed(format!("Rate limit exceeded after {} retries", MAX_RETRIES)))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

impl GenerateResponse {
    /// 첫 후보의 텍스트 파트 연결
    fn text(self) -> Option<String> {
        self.candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().map(|p| p.text).collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_prompt() {
        let context = vec!["Dogs are loyal.".to_string(), "Cats are independent.".to_string()];
        let prompt = build_prompt("Which pet is loyal?", &context);

        assert!(prompt.starts_with("You are an assistant for question-answering tasks."));
        assert!(prompt.contains("Question: Which pet is loyal?\n"));
        assert!(prompt.contains("Context: Dogs are loyal.\n\nCats are independent.\n"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_build_prompt_empty_context() {
        let prompt = build_prompt("anything?", &[]);
        assert!(prompt.contains("Context: \nAnswer:"));
    }

    #[test]
    fn test_request_serialization() {
        let chat = GeminiChat::with_config("key".to_string(), &LlmConfig::default()).unwrap();
        let json = serde_json::to_value(chat.request_for("hi")).unwrap();

        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "hi");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(chat.name(), DEFAULT_MODEL);
    }

    #[test]
    fn test_response_text() {
        let body = r#"{
            "candidates": [
                { "content": { "role": "model", "parts": [ { "text": "Dogs " }, { "text": "are loyal." } ] } }
            ]
        }"#;
        let response: GenerateResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.text(), Some("Dogs are loyal.".to_string()));

        let empty: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(empty.text(), None);
    }

    #[test]
    fn test_empty_model_rejected() {
        let config = LlmConfig {
            model: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            GeminiChat::with_config("key".to_string(), &config),
            Err(RagError::Config(_))
        ));
    }
}
