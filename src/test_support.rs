//! 테스트용 결정적 임베딩 / 언어 모델

use std::sync::Mutex;

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::LanguageModel;

/// 어휘 기반 임베딩 - 알려진 단어 위치에 1.0
pub(crate) struct KeywordEmbedding {
    vocab: Vec<String>,
}

impl KeywordEmbedding {
    pub(crate) fn new(vocab: &[&str]) -> Self {
        Self {
            vocab: vocab.iter().map(|w| w.to_string()).collect(),
        }
    }

    pub(crate) fn pets() -> Self {
        Self::new(&[
            "dogs",
            "are",
            "loyal",
            "companions",
            "cats",
            "enjoy",
            "independence",
            "pet",
        ])
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0; self.vocab.len()];
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            if let Some(i) = self.vocab.iter().position(|w| w == token) {
                vector[i] = 1.0;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.vocab.len()
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

/// 항상 실패하는 임베딩
pub(crate) struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::embedding("failing", "provider unavailable"))
    }

    fn dimension(&self) -> usize {
        8
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// 특정 텍스트에서만 실패하는 임베딩 (나머지는 `KeywordEmbedding`)
pub(crate) struct FailingOnEmbedding {
    inner: KeywordEmbedding,
    trigger: String,
}

impl FailingOnEmbedding {
    pub(crate) fn new(inner: KeywordEmbedding, trigger: &str) -> Self {
        Self {
            inner,
            trigger: trigger.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for FailingOnEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text == self.trigger {
            return Err(RagError::embedding("failing-on", "rejected input"));
        }
        self.inner.embed(text).await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        "failing-on"
    }
}

/// 고정 응답 언어 모델 (받은 프롬프트 기록)
pub(crate) struct ScriptedLlm {
    answer: Option<String>,
    pub(crate) prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub(crate) fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            answer: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.answer {
            Some(answer) => Ok(answer.clone()),
            None => Err(RagError::GenerationFailed {
                model: "scripted".to_string(),
                message: "model offline".to_string(),
            }),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
