//! Prometheus metrics for the test generation pipeline
//!
//! This module provides observability through Prometheus-compatible metrics
//! for packet flow, LLM calls, and persisted test files.

use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

use crate::pipeline::StreamStage;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Packet flow metrics
    // ============================================================================

    /// Total packets processed across all stages
    pub static ref PACKETS_PROCESSED: Counter = Counter::with_opts(
        Opts::new(
            "testgen_packets_processed_total",
            "Total packets processed across all stages"
        )
    ).expect("Failed to create PACKETS_PROCESSED counter");

    /// Packets processed by the file discovery stage
    pub static ref DISCOVERY_PACKETS: Counter = Counter::with_opts(
        Opts::new(
            "testgen_discovery_packets_total",
            "Packets processed by the file discovery stage"
        )
    ).expect("Failed to create DISCOVERY_PACKETS counter");

    /// Packets processed by the function extraction stage
    pub static ref FUNCTION_PACKETS: Counter = Counter::with_opts(
        Opts::new(
            "testgen_function_packets_total",
            "Packets processed by the function extraction stage"
        )
    ).expect("Failed to create FUNCTION_PACKETS counter");

    /// Packets processed by the LLM generation stage
    pub static ref GENERATION_PACKETS: Counter = Counter::with_opts(
        Opts::new(
            "testgen_generation_packets_total",
            "Packets processed by the LLM generation stage"
        )
    ).expect("Failed to create GENERATION_PACKETS counter");

    /// Packets processed by the result collection stage
    pub static ref COLLECTION_PACKETS: Counter = Counter::with_opts(
        Opts::new(
            "testgen_collection_packets_total",
            "Packets processed by the result collection stage"
        )
    ).expect("Failed to create COLLECTION_PACKETS counter");

    /// Terminal packets handed back to the caller
    pub static ref COMPLETED_PACKETS: Counter = Counter::with_opts(
        Opts::new(
            "testgen_completed_packets_total",
            "Terminal packets handed back to the caller"
        )
    ).expect("Failed to create COMPLETED_PACKETS counter");

    /// Per-packet processing latency in seconds
    pub static ref PACKET_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "testgen_packet_latency_seconds",
            "Per-packet processing latency in seconds"
        ).buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0])
    ).expect("Failed to create PACKET_LATENCY histogram");

    /// Per-item failures recorded by any stage
    pub static ref PIPELINE_ERRORS: Counter = Counter::with_opts(
        Opts::new(
            "testgen_pipeline_errors_total",
            "Per-item failures recorded by any stage"
        )
    ).expect("Failed to create PIPELINE_ERRORS counter");

    // ============================================================================
    // LLM metrics
    // ============================================================================

    /// Total LLM generation attempts, including retries
    pub static ref LLM_REQUESTS: Counter = Counter::with_opts(
        Opts::new(
            "testgen_llm_requests_total",
            "Total LLM generation attempts, including retries"
        )
    ).expect("Failed to create LLM_REQUESTS counter");

    /// Failed LLM generation attempts
    pub static ref LLM_FAILURES: Counter = Counter::with_opts(
        Opts::new(
            "testgen_llm_failures_total",
            "Failed LLM generation attempts"
        )
    ).expect("Failed to create LLM_FAILURES counter");

    /// LLM call latency in seconds
    pub static ref LLM_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "testgen_llm_latency_seconds",
            "LLM call latency in seconds"
        ).buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0])
    ).expect("Failed to create LLM_LATENCY histogram");

    // ============================================================================
    // Output metrics
    // ============================================================================

    /// Test files written to the output directory
    pub static ref FILES_WRITTEN: Counter = Counter::with_opts(
        Opts::new(
            "testgen_files_written_total",
            "Test files written to the output directory"
        )
    ).expect("Failed to create FILES_WRITTEN counter");
}

/// The per-stage packet counter for a stage.
pub fn packet_counter(stage: StreamStage) -> &'static Counter {
    match stage {
        StreamStage::FileDiscovery => &DISCOVERY_PACKETS,
        StreamStage::FunctionProcessing => &FUNCTION_PACKETS,
        StreamStage::LlmProcessing => &GENERATION_PACKETS,
        StreamStage::ResultCollection => &COLLECTION_PACKETS,
        StreamStage::Completed => &COMPLETED_PACKETS,
    }
}

/// Register all metrics with the global registry
///
/// This function should be called once at application startup.
/// Panics if metrics registration fails.
pub fn register_metrics() {
    REGISTRY
        .register(Box::new(PACKETS_PROCESSED.clone()))
        .expect("Failed to register PACKETS_PROCESSED");
    REGISTRY
        .register(Box::new(DISCOVERY_PACKETS.clone()))
        .expect("Failed to register DISCOVERY_PACKETS");
    REGISTRY
        .register(Box::new(FUNCTION_PACKETS.clone()))
        .expect("Failed to register FUNCTION_PACKETS");
    REGISTRY
        .register(Box::new(GENERATION_PACKETS.clone()))
        .expect("Failed to register GENERATION_PACKETS");
    REGISTRY
        .register(Box::new(COLLECTION_PACKETS.clone()))
        .expect("Failed to register COLLECTION_PACKETS");
    REGISTRY
        .register(Box::new(COMPLETED_PACKETS.clone()))
        .expect("Failed to register COMPLETED_PACKETS");
    REGISTRY
        .register(Box::new(PACKET_LATENCY.clone()))
        .expect("Failed to register PACKET_LATENCY");
    REGISTRY
        .register(Box::new(PIPELINE_ERRORS.clone()))
        .expect("Failed to register PIPELINE_ERRORS");
    REGISTRY
        .register(Box::new(LLM_REQUESTS.clone()))
        .expect("Failed to register LLM_REQUESTS");
    REGISTRY
        .register(Box::new(LLM_FAILURES.clone()))
        .expect("Failed to register LLM_FAILURES");
    REGISTRY
        .register(Box::new(LLM_LATENCY.clone()))
        .expect("Failed to register LLM_LATENCY");
    REGISTRY
        .register(Box::new(FILES_WRITTEN.clone()))
        .expect("Failed to register FILES_WRITTEN");
}

/// Gather all metrics and encode them in Prometheus text format
///
/// Returns a string containing all registered metrics in the Prometheus
/// exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics contained invalid UTF-8: {}", e);
        String::new()
    })
}
