//! Language-model client abstraction.
//!
//! The pipeline depends only on the [`LlmClient`] trait. The production
//! client speaks the OpenAI-compatible chat completions API; decorators
//! (currently request tracing) are applied as an ordered layer list once at
//! construction time.

pub mod middleware;
pub mod mock;
pub mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::analyzer::SourceLanguage;
use crate::config::LlmConfig;

pub use middleware::TracingClient;
pub use mock::MockClient;
pub use openai::OpenAiClient;

/// A single generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub max_tokens: u16,
    pub temperature: f32,
    pub language: SourceLanguage,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Provider response. A response with `success == false` or empty content
/// is treated the same as a transport error by the retry logic upstream.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub content: String,
    pub success: bool,
    pub usage: TokenUsage,
    pub model: String,
}

/// Core trait for language-model providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Generate text for the given request.
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse>;

    /// Provider name for logging and metrics.
    fn provider_name(&self) -> &'static str;
}

/// A wrapper applied around a client at construction time.
pub type LlmLayer = Box<dyn Fn(Arc<dyn LlmClient>) -> Arc<dyn LlmClient> + Send + Sync>;

/// Build the production client with its middleware stack.
///
/// Layers are applied in order, innermost first. The chain is fixed here
/// rather than discovered at runtime.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    let base: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(config)?);
    Ok(apply_layers(base, default_layers()))
}

fn default_layers() -> Vec<LlmLayer> {
    vec![Box::new(|inner| Arc::new(TracingClient::new(inner)))]
}

fn apply_layers(base: Arc<dyn LlmClient>, layers: Vec<LlmLayer>) -> Arc<dyn LlmClient> {
    layers.into_iter().fold(base, |client, layer| layer(client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_layers_apply_in_order() {
        let base: Arc<dyn LlmClient> = Arc::new(MockClient::always_success("int x;"));
        let wrapped = apply_layers(base, default_layers());
        assert_eq!(wrapped.provider_name(), "tracing");

        let request = GenerationRequest {
            prompt: "p".to_string(),
            max_tokens: 100,
            temperature: 0.3,
            language: SourceLanguage::C,
        };
        let response = wrapped.generate(&request).await.unwrap();
        assert!(response.success);
        assert_eq!(response.content, "int x;");
    }
}
