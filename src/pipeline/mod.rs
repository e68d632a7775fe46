//! Streaming test-generation pipeline.
//!
//! Compilation units flow through four stages, each a [`StageProcessor`]
//! behind a bounded queue: file discovery, function extraction, LLM
//! generation, and result collection. The orchestrator owns the queues and
//! worker pools; processors only transform packets.

pub mod collector;
pub mod discoverer;
pub mod errors;
pub mod functions;
pub mod generator;
pub mod observer;
pub mod orchestrator;
pub mod packet;

use async_trait::async_trait;

pub use collector::{ResultCollector, SuiteStats};
pub use discoverer::{DiscoveryFilter, FileDiscoverer};
pub use errors::{ConfigError, FailureCollector, FailureRecord, PipelineError};
pub use functions::{FunctionFilter, FunctionProcessor};
pub use generator::{GenerationProcessor, SlidingWindowLimiter};
pub use observer::{MetricsObserver, PipelineObserver, ProgressObserver, StageMetrics};
pub use orchestrator::{
    PipelineDependencies, PipelineHandle, PipelineOrchestrator, PipelineReport,
};
pub use packet::{
    CollectionStatus, FunctionWorkItem, GenerationResult, PacketPayload, StreamPacket,
    StreamStage,
};

/// One stage of the pipeline.
///
/// `process` owns its failure handling: a processor that cannot handle a
/// packet records the failure and returns an empty vector, so one bad item
/// never takes the run down with it.
#[async_trait]
pub trait StageProcessor: Send + Sync {
    /// The stage this processor serves.
    fn stage(&self) -> StreamStage;

    /// Transform one packet into zero or more packets for the next stage.
    async fn process(&self, packet: StreamPacket) -> Vec<StreamPacket>;

    /// Called once at shutdown, after the last `process` call returns.
    async fn finalize(&self);
}
