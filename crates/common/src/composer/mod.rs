//! Answer composer - turns a grounded summary into a conversational answer
//!
//! Provides:
//! - The grounding prompt template
//! - A chat-completion client for OpenAI-compatible endpoints
//! - A deterministic mock for development and tests

use crate::config::ComposerConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Marker the prompt ends with; generated text after it is the answer
pub const ANSWER_MARKER: &str = "Answer:";

/// Opaque text-generation service
#[async_trait]
pub trait AnswerComposer: Send + Sync {
    /// Generate text for a single prompt, no streaming
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> Result<String>;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Fixed grounding prompt template
#[derive(Debug, Clone)]
pub struct GroundingPrompt {
    topic: String,
}

impl GroundingPrompt {
    pub fn new(topic: impl Into<String>) -> Self {
        Self { topic: topic.into() }
    }

    /// Build the prompt for one question and its grounding summary
    pub fn render(&self, summary: &str, question: &str) -> String {
        format!(
            "You are an expert on {topic}. \
             Using the following factual information from Wikipedia, provide a detailed and conversational answer. \
             Structure the response in a ChatGPT/Gemini style with clear sections, bullet points for key features, and a professional tone. \
             Ensure the response is visually appealing and ends with a citation link to the Wikipedia page. \
             Do not make up information or add anything beyond the provided context. \
             If the answer is not in the context, say 'I don't know based on the provided information.'\n\
             Context: {summary}\n\
             Question: {question}\n{marker} ",
            topic = self.topic,
            summary = summary,
            question = question,
            marker = ANSWER_MARKER,
        )
    }
}

impl Default for GroundingPrompt {
    fn default() -> Self {
        Self::new("World War 2 naval history")
    }
}

/// Keep only the text after the last answer marker.
///
/// Some generators echo the prompt before their completion.
pub fn extract_answer(generated: &str) -> String {
    generated
        .rsplit(ANSWER_MARKER)
        .next()
        .unwrap_or(generated)
        .trim()
        .to_string()
}

/// Chat-completion composer for OpenAI-compatible endpoints
pub struct ChatCompletionComposer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

impl ChatCompletionComposer {
    /// Create a new composer
    pub fn new(config: &ComposerConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
        })
    }

    async fn call(&self, prompt: &str, max_output_tokens: usize) -> Result<String> {
        // Greedy decoding keeps answers reproducible for the same context
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            max_tokens: max_output_tokens,
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ComposerError {
                message: format!("Request failed: {}", e),
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ComposerError {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| AppError::ComposerError {
            message: format!("Failed to parse response: {}", e),
        })?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::ComposerError {
                message: "Empty response from model".to_string(),
            })
    }
}

#[async_trait]
impl AnswerComposer for ChatCompletionComposer {
    async fn generate(&self, prompt: &str, max_output_tokens: usize) -> Result<String> {
        let start = Instant::now();
        let result = self.call(prompt, max_output_tokens).await;
        metrics::record_composer(start.elapsed().as_secs_f64(), &self.model, result.is_ok());

        if let Err(e) = &result {
            tracing::warn!(model = %self.model, error = %e, "Answer composition failed");
        }
        result
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Mock composer for development and testing.
///
/// Echoes the prompt, as local text-generation pipelines do, followed by an
/// answer built from the context line.
#[derive(Debug, Default)]
pub struct MockComposer {
    fail: bool,
}

impl MockComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A composer whose every call fails
    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl AnswerComposer for MockComposer {
    async fn generate(&self, prompt: &str, _max_output_tokens: usize) -> Result<String> {
        if self.fail {
            return Err(AppError::ComposerError {
                message: "simulated composer failure".to_string(),
            });
        }

        let context = prompt
            .lines()
            .find_map(|line| line.strip_prefix("Context: "))
            .unwrap_or("")
            .trim();

        Ok(format!(
            "{}Based on the provided information: {}\n\n[Mock response - composer not configured]",
            prompt, context
        ))
    }

    fn model_name(&self) -> &str {
        "mock-composer"
    }
}

/// Create a composer based on configuration
pub fn create_composer(config: &ComposerConfig) -> Result<Arc<dyn AnswerComposer>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config.api_key.clone().ok_or_else(|| AppError::Configuration {
                message: "composer.api_key is required for the openai provider".to_string(),
            })?;
            Ok(Arc::new(ChatCompletionComposer::new(config, key)?))
        }
        "mock" => Ok(Arc::new(MockComposer::new())),
        other => {
            tracing::warn!(provider = other, "Unknown composer provider, using mock");
            Ok(Arc::new(MockComposer::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_grounds_on_summary() {
        let prompt = GroundingPrompt::default().render(
            "Yamato was the lead ship of her class.",
            "Tell me about Yamato",
        );
        assert!(prompt.starts_with("You are an expert on World War 2 naval history."));
        assert!(prompt.contains("Do not make up information"));
        assert!(prompt.contains("ends with a citation link"));
        assert!(prompt.contains("\nContext: Yamato was the lead ship of her class.\n"));
        assert!(prompt.ends_with("Question: Tell me about Yamato\nAnswer: "));
    }

    #[test]
    fn test_extract_answer_after_last_marker() {
        assert_eq!(extract_answer("Question: q\nAnswer:  It sank in 1945. "), "It sank in 1945.");
        assert_eq!(extract_answer("Answer: a\nAnswer: b"), "b");
        assert_eq!(extract_answer("  plain completion "), "plain completion");
    }

    #[tokio::test]
    async fn test_mock_composer_echoes_prompt() {
        let composer = MockComposer::new();
        let prompt = GroundingPrompt::default().render("Nimitz was an admiral.", "Who is Chester Nimitz");
        let generated = composer.generate(&prompt, 768).await.unwrap();
        assert!(generated.starts_with(&prompt));
        let answer = extract_answer(&generated);
        assert!(answer.starts_with("Based on the provided information: Nimitz was an admiral."));
    }

    #[tokio::test]
    async fn test_failing_mock() {
        let composer = MockComposer::failing();
        let err = composer.generate("prompt", 10).await.unwrap_err();
        assert!(matches!(err, AppError::ComposerError { .. }));
    }

    #[test]
    fn test_openai_requires_key() {
        let config = ComposerConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..ComposerConfig::default()
        };
        assert!(create_composer(&config).is_err());

        let config = ComposerConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            ..ComposerConfig::default()
        };
        assert_eq!(create_composer(&config).unwrap().model_name(), "gpt-4o-mini");
    }
}
