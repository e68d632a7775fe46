//! OpenAI-compatible chat completions client.

use anyhow::{anyhow, Context, Result};
use async_openai::{
    config::OpenAIConfig as AsyncOpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::info;

use crate::config::LlmConfig;

use super::{GenerationRequest, GenerationResponse, LlmClient, TokenUsage};

const SYSTEM_PROMPT: &str =
    "You are an expert C/C++ test engineer. Respond with compilable GoogleTest code only.";

/// Client for any provider exposing the OpenAI chat completions API.
pub struct OpenAiClient {
    client: Client<AsyncOpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.load_api_key().context("Failed to load API key")?;

        let mut openai_config = AsyncOpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        info!("Initialized LLM client with model: {}", config.model);

        Ok(Self {
            client: Client::with_config(openai_config),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .context("Failed to build system message")?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.clone())
                .build()
                .context("Failed to build user message")?
                .into(),
        ];

        let api_request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .max_tokens(request.max_tokens)
            .temperature(request.temperature)
            .build()
            .context("Failed to build chat completion request")?;

        let response = self
            .client
            .chat()
            .create(api_request)
            .await
            .context("Chat completion request failed")?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("Provider returned no choices"))?;

        let usage = response
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        let success = !content.trim().is_empty();
        let model = response.model;

        Ok(GenerationResponse {
            content,
            success,
            usage,
            model,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
