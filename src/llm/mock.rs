//! Scriptable mock client for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{GenerationRequest, GenerationResponse, LlmClient, TokenUsage};

enum Scripted {
    Success(String),
    Error(String),
}

/// Mock LLM client with a scripted response sequence.
///
/// Scripted responses are consumed in order; once exhausted, the default
/// behavior repeats indefinitely.
pub struct MockClient {
    script: Mutex<VecDeque<Scripted>>,
    default: Scripted,
    calls: AtomicUsize,
    delay: Option<Duration>,
}

impl MockClient {
    /// Always succeed, returning `code` as generated content.
    pub fn always_success(code: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Scripted::Success(code.to_string()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Always fail with the given error message.
    pub fn always_fail(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: Scripted::Error(message.to_string()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Fail `n` times with `message`, then succeed with `code` forever.
    pub fn fail_times(n: usize, message: &str, code: &str) -> Self {
        let script = (0..n)
            .map(|_| Scripted::Error(message.to_string()))
            .collect();
        Self {
            script: Mutex::new(script),
            default: Scripted::Success(code.to_string()),
            calls: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Add an artificial delay before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `generate` calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().unwrap().pop_front();
        let scripted = next.as_ref().unwrap_or(&self.default);

        match scripted {
            Scripted::Success(code) => Ok(GenerationResponse {
                content: code.clone(),
                success: true,
                usage: TokenUsage {
                    prompt_tokens: request.prompt.len() as u32 / 4,
                    completion_tokens: code.len() as u32 / 4,
                    total_tokens: (request.prompt.len() + code.len()) as u32 / 4,
                },
                model: "mock".to_string(),
            }),
            Scripted::Error(message) => Err(anyhow!("{message}")),
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::SourceLanguage;

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "test".to_string(),
            max_tokens: 100,
            temperature: 0.3,
            language: SourceLanguage::C,
        }
    }

    #[tokio::test]
    async fn test_fail_times_then_succeeds() {
        let client = MockClient::fail_times(2, "timeout", "TEST(X, Y) {}");

        assert!(client.generate(&request()).await.is_err());
        assert!(client.generate(&request()).await.is_err());
        let response = client.generate(&request()).await.unwrap();
        assert_eq!(response.content, "TEST(X, Y) {}");
        assert_eq!(client.calls(), 3);
    }
}
