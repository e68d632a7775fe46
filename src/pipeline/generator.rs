//! Generation stage: rate-limited, retried LLM calls per function.
//!
//! Failures here are terminal for the function, never for the pipeline: an
//! item whose retries are exhausted is logged, reported to observers, and
//! dropped without forwarding a packet.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, error, info, warn};

use crate::llm::{GenerationRequest, LlmClient};
use crate::metrics;
use crate::prompt::PromptBuilder;

use super::errors::FailureCollector;
use super::observer::{notify_error, notify_packet_processed, PipelineObserver};
use super::packet::{
    FunctionWorkItem, GenerationResult, PacketPayload, StreamPacket, StreamStage,
};
use super::StageProcessor;

const DEFAULT_MAX_TOKENS: u16 = 2000;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const MAX_BACKOFF_SECS: u64 = 30;
const TOKEN_BUDGET_DELAY: Duration = Duration::from_secs(1);

/// Error fragments that make a failure permanent. Matched case-insensitively
/// against the error text; any hit abandons the remaining retries.
const NON_RETRYABLE: [&str; 6] = [
    "authentication",
    "authorization",
    "invalid request",
    "invalid api key",
    "quota exceeded",
    "model not found",
];

pub fn is_non_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    NON_RETRYABLE.iter().any(|needle| lower.contains(needle))
}

/// Exponential backoff capped at [`MAX_BACKOFF_SECS`]. The exponent is
/// clamped first so arbitrarily large attempt counts cannot overflow the
/// doubling.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempt.min(6)).min(MAX_BACKOFF_SECS))
}

struct LimiterWindow {
    request_times: VecDeque<Instant>,
    token_usage: VecDeque<(Instant, u32)>,
}

/// Sliding-window limiter over requests/minute and tokens/minute.
///
/// The whole acquire-and-record sequence, including any sleeping, runs
/// under one async lock: check-then-act must be atomic across the LLM
/// worker pool.
pub struct SlidingWindowLimiter {
    requests_per_minute: usize,
    tokens_per_minute: u32,
    window: Mutex<LimiterWindow>,
}

impl SlidingWindowLimiter {
    pub fn new(requests_per_minute: usize, tokens_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            tokens_per_minute,
            window: Mutex::new(LimiterWindow {
                request_times: VecDeque::new(),
                token_usage: VecDeque::new(),
            }),
        }
    }

    /// Block until the estimated request fits the rolling 60s budget, then
    /// record it.
    pub async fn acquire(&self, estimated_tokens: u32) {
        let mut window = self.window.lock().await;

        let now = Instant::now();
        let horizon = now - Duration::from_secs(60);

        while window
            .request_times
            .front()
            .is_some_and(|t| *t < horizon)
        {
            window.request_times.pop_front();
        }
        while window.token_usage.front().is_some_and(|(t, _)| *t < horizon) {
            window.token_usage.pop_front();
        }

        if window.request_times.len() >= self.requests_per_minute {
            if let Some(oldest) = window.request_times.front().copied() {
                let wait = Duration::from_secs(60).saturating_sub(now - oldest);
                if !wait.is_zero() {
                    debug!("Rate limit reached, sleeping {:.1}s", wait.as_secs_f64());
                    tokio::time::sleep(wait).await;
                }
            }
        }

        let used: u32 = window.token_usage.iter().map(|(_, tokens)| tokens).sum();
        if used.saturating_add(estimated_tokens) > self.tokens_per_minute {
            debug!("Token budget exceeded, applying short delay");
            tokio::time::sleep(TOKEN_BUDGET_DELAY).await;
        }

        let now = Instant::now();
        window.request_times.push_back(now);
        window.token_usage.push_back((now, estimated_tokens));
    }
}

/// Stage processor calling the LLM client for each function work item.
pub struct GenerationProcessor {
    client: Arc<dyn LlmClient>,
    prompt_builder: PromptBuilder,
    limiter: Arc<SlidingWindowLimiter>,
    // Caps simultaneous provider calls independently of worker count.
    llm_permits: Semaphore,
    retry_attempts: u32,
    observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
    failures: FailureCollector,
    generated: AtomicU64,
    failed: AtomicU64,
    started: Instant,
}

impl GenerationProcessor {
    pub fn new(
        client: Arc<dyn LlmClient>,
        limiter: Arc<SlidingWindowLimiter>,
        max_concurrent_calls: usize,
        retry_attempts: u32,
        observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
        failures: FailureCollector,
    ) -> Self {
        Self {
            client,
            prompt_builder: PromptBuilder::new(),
            limiter,
            llm_permits: Semaphore::new(max_concurrent_calls),
            retry_attempts,
            observers,
            failures,
            generated: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn generated_count(&self) -> u64 {
        self.generated.load(Ordering::Relaxed)
    }

    /// One attempt chain for a function: limiter, call, exponential backoff.
    /// Returns the result on success, or the last error text.
    async fn generate_with_retry(&self, item: &FunctionWorkItem) -> Result<GenerationResult, String> {
        let prompt = self.prompt_builder.build(item);
        let request = GenerationRequest {
            prompt: prompt.clone(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            language: item.function.language,
        };
        // Rough prompt-size estimate; the limiter only needs an order of
        // magnitude.
        let estimated_tokens = (prompt.len() / 4) as u32 + DEFAULT_MAX_TOKENS as u32;

        let mut last_error = String::from("no attempts made");

        for attempt in 0..=self.retry_attempts {
            self.limiter.acquire(estimated_tokens).await;

            metrics::LLM_REQUESTS.inc();
            let call_start = Instant::now();
            let outcome = {
                // Semaphore is never closed, acquire cannot fail.
                let _permit = self.llm_permits.acquire().await.ok();
                self.client.generate(&request).await
            };
            metrics::LLM_LATENCY.observe(call_start.elapsed().as_secs_f64());

            match outcome {
                Ok(response) if response.success && !response.content.trim().is_empty() => {
                    let name = &item.function.name;
                    return Ok(GenerationResult {
                        function_name: name.clone(),
                        suite_name: format!("{name}TestSuite"),
                        target_path: format!(
                            "test_{name}.{}",
                            item.function.language.test_extension()
                        ),
                        success: true,
                        test_code: response.content,
                        prompt,
                        model: response.model,
                        error: None,
                    });
                }
                Ok(_) => {
                    last_error = "empty result from provider".to_string();
                    metrics::LLM_FAILURES.inc();
                }
                Err(e) => {
                    last_error = format!("{e:#}");
                    metrics::LLM_FAILURES.inc();
                }
            }

            warn!(
                "Generation attempt {} failed for {}: {last_error}",
                attempt + 1,
                item.function.name
            );

            if is_non_retryable(&last_error) {
                debug!("Non-retryable error, abandoning retries");
                break;
            }

            if attempt < self.retry_attempts {
                tokio::time::sleep(backoff_delay(attempt)).await;
            }
        }

        Err(last_error)
    }
}

#[async_trait]
impl StageProcessor for GenerationProcessor {
    fn stage(&self) -> StreamStage {
        StreamStage::LlmProcessing
    }

    async fn process(&self, packet: StreamPacket) -> Vec<StreamPacket> {
        let item = match &packet.payload {
            PacketPayload::Function(item) => item.clone(),
            _ => {
                debug!("Unexpected payload at generation stage for {}", packet.id);
                return Vec::new();
            }
        };

        let start = Instant::now();
        match self.generate_with_retry(&item).await {
            Ok(result) => {
                let count = self.generated.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(
                    "Generated test for {} (#{count}, {} chars)",
                    result.function_name,
                    result.test_code.len()
                );
                let output = StreamPacket::generation(&packet, result);
                notify_packet_processed(&self.observers, &output, start.elapsed()).await;
                vec![output]
            }
            Err(message) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(
                    "All attempts failed for function {}: {message}",
                    item.function.name
                );
                self.failures.record(
                    item.function.name.clone(),
                    StreamStage::LlmProcessing,
                    &message,
                );
                notify_error(&self.observers, &packet, &message).await;
                Vec::new()
            }
        }
    }

    async fn finalize(&self) {
        let generated = self.generated.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            "Generation completed: {generated} tests generated, {failed} failed in {elapsed:.2}s"
        );
    }
}
