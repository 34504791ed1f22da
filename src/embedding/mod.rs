//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 파이프라인은 [`EmbeddingProvider`] 트레이트만 사용합니다.
//! 재시도/속도 제한은 외부 서비스 경계인 프로바이더 구현 쪽 책임이며,
//! 코어는 실패를 `EmbeddingFailed`로 그대로 전파합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let vectors = embedder.embed_batch(&["Hello".to_string()]).await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 검색 쿼리 임베딩 (기본 구현: `embed`)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 - 입력과 같은 길이/순서로 반환 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// 기본 임베딩 모델
pub const DEFAULT_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// batchEmbedContents 요청당 최대 텍스트 수
pub const MAX_BATCH_SIZE: usize = 100;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이
const MIN_DELAY_MS: u64 = 1000;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Google Gemini 임베딩 구현체
///
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    model: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!(?wait_time, "embedding min delay");
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!(?wait_time, "embedding rate limit reached");
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiEmbedding {
    /// 기본 모델/차원으로 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_config(api_key, &EmbeddingConfig::default())
    }

    /// 설정을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `config` - 모델 이름과 차원 (768, 1536, 3072 중 선택)
    pub fn with_config(api_key: String, config: &EmbeddingConfig) -> Result<Self> {
        if ![768, 1536, 3072].contains(&config.dimension) {
            return Err(RagError::Config(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                config.dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
        )));

        Ok(Self {
            api_key,
            model: config.model.clone(),
            client,
            dimension: config.dimension,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    /// 환경변수 API 키 + 설정으로 생성
    pub fn from_env_with_config(config: &EmbeddingConfig) -> Result<Self> {
        Self::with_config(get_api_key()?, config)
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/{}:{}", GEMINI_API_BASE, self.model, method)
    }

    fn request_for(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type,
            output_dimensionality: Some(self.dimension),
        }
    }

    /// 요청 전송 (429 에러 시 지수 백오프 재시도)
    async fn post_with_retry<B, R>(&self, url: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut last_error: Option<String> = None;

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(format!("Failed to send embedding request: {}", e));
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            ?backoff,
                            attempt = attempt + 1,
                            max_retries = MAX_RETRIES,
                            "embedding request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| RagError::embedding(&self.model, format!("Failed to read response body: {}", e)))?;

            if status.is_success() {
                return serde_json::from_str(&body).map_err(|e| {
                    RagError::embedding(&self.model, format!("Failed to parse embedding response: {}", e))
                });
            }

            if status.as_u16() == 429 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    ?backoff,
                    attempt = attempt + 1,
                    max_retries = MAX_RETRIES,
                    "rate limit hit (429), backing off"
                );
                last_error = Some("Rate limit exceeded (429)".to_string());

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                let message = match serde_json::from_str::<GeminiError>(&body) {
                    Ok(error) => format!("Gemini API error ({}): {}", error.error.status, error.error.message),
                    Err(_) => format!("Gemini API error ({}): {}", status, body),
                };
                return Err(RagError::embedding(&self.model, message));
            }
        }

        Err(RagError::embedding(
            &self.model,
            last_error.unwrap_or_else(|| format!("Embedding failed after {} retries", MAX_RETRIES)),
        ))
    }

    async fn embed_with_task(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = self.request_for(text, task_type);
        let response: EmbedResponse = self
            .post_with_retry(&self.endpoint("embedContent"), &request)
            .await?;
        Ok(response.embedding.values)
    }
}

/// Gemini 임베딩 작업 유형
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum TaskType {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: TaskType,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, TaskType::RetrievalDocument).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, TaskType::RetrievalQuery).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(MAX_BATCH_SIZE).enumerate() {
            tracing::debug!(batch = i + 1, size = batch.len(), "embedding batch");

            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|text| self.request_for(text, TaskType::RetrievalDocument))
                    .collect(),
            };
            let response: BatchEmbedResponse = self
                .post_with_retry(&self.endpoint("batchEmbedContents"), &request)
                .await?;

            if response.embeddings.len() != batch.len() {
                return Err(RagError::embedding(
                    &self.model,
                    format!(
                        "batch returned {} embeddings for {} inputs",
                        response.embeddings.len(),
                        batch.len()
                    ),
                ));
            }
            results.extend(response.embeddings.into_iter().map(|e| e.values));
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(RagError::Config(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
            .to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let config = EmbeddingConfig {
            dimension: 999,
            ..Default::default()
        };
        let result = GeminiEmbedding::with_config("fake_key".to_string(), &config);
        assert!(matches!(result, Err(RagError::Config(msg)) if msg.contains("Invalid dimension")));
    }

    #[test]
    fn test_valid_dimensions() {
        for dimension in [768, 1536, 3072] {
            let config = EmbeddingConfig {
                dimension,
                ..Default::default()
            };
            let embedder = GeminiEmbedding::with_config("fake_key".to_string(), &config).unwrap();
            assert_eq!(embedder.dimension(), dimension);
            assert_eq!(embedder.name(), DEFAULT_MODEL);
        }
    }

    #[test]
    fn test_batch_request_serialization() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let request = BatchEmbedRequest {
            requests: vec![embedder.request_for("hello", TaskType::RetrievalQuery)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["requests"][0]["model"], "models/gemini-embedding-001");
        assert_eq!(json["requests"][0]["outputDimensionality"], 768);
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_empty_text_returns_zero_vector() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let vector = embedder.embed("   ").await.unwrap();
        assert_eq!(vector.len(), DEFAULT_DIMENSION);
        assert!(vector.iter().all(|v| *v == 0.0));
    }
}
