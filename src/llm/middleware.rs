//! Client middleware layers.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::{GenerationRequest, GenerationResponse, LlmClient};

/// Logs every request with latency and outcome.
pub struct TracingClient {
    inner: Arc<dyn LlmClient>,
}

impl TracingClient {
    pub fn new(inner: Arc<dyn LlmClient>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl LlmClient for TracingClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResponse> {
        let start = Instant::now();
        let result = self.inner.generate(request).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => debug!(
                provider = self.inner.provider_name(),
                model = %response.model,
                success = response.success,
                total_tokens = response.usage.total_tokens,
                elapsed_ms = elapsed.as_millis() as u64,
                "LLM request completed"
            ),
            Err(e) => warn!(
                provider = self.inner.provider_name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "LLM request failed: {e:#}"
            ),
        }

        result
    }

    fn provider_name(&self) -> &'static str {
        "tracing"
    }
}
