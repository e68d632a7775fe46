//! Pipeline orchestration: bounded queues, per-stage worker pools,
//! statistics, cancellation, and deterministic completion.
//!
//! Each stage owns one bounded input queue; a full queue blocks the
//! upstream sender, which is the backpressure mechanism. Completion is
//! detected with an explicit in-flight packet counter rather than an idle
//! heuristic: the counter rises on every enqueue and falls when a packet's
//! processing finishes, so it returns to zero exactly when no packet
//! remains anywhere in the pipeline.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::sync::mpsc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analyzer::SourceAnalyzer;
use crate::compile_db::CompilationUnit;
use crate::config::StreamingConfig;
use crate::llm::LlmClient;

use super::collector::{ResultCollector, SuiteStats};
use super::discoverer::{DiscoveryFilter, FileDiscoverer};
use super::errors::{FailureCollector, FailureRecord, PipelineError};
use super::functions::{FunctionFilter, FunctionProcessor};
use super::generator::{GenerationProcessor, SlidingWindowLimiter};
use super::observer::{notify_stage_changed, MetricsObserver, PipelineObserver, StageMetrics};
use super::packet::{StreamPacket, StreamStage};
use super::StageProcessor;

/// How often idle workers re-check the cancellation token. Stop latency is
/// bounded by this interval.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Default rate limiter budgets shared by all generation workers.
const REQUESTS_PER_MINUTE: usize = 60;
const TOKENS_PER_MINUTE: u32 = 100_000;

/// Lifecycle of one orchestrator instance. `execute` is single-shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    NotStarted,
    Running,
    Completed,
    Cancelled,
}

/// Shared counters mutated by all workers.
#[derive(Default)]
pub struct PipelineStats {
    packets_processed: AtomicU64,
    by_stage: [AtomicU64; StreamStage::ALL.len()],
}

impl PipelineStats {
    fn record(&self, stage: StreamStage) {
        self.packets_processed.fetch_add(1, Ordering::Relaxed);
        let index = StreamStage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
        self.by_stage[index].fetch_add(1, Ordering::Relaxed);
    }

    pub fn packets_processed(&self) -> u64 {
        self.packets_processed.load(Ordering::Relaxed)
    }

    pub fn stage_count(&self, stage: StreamStage) -> u64 {
        let index = StreamStage::ALL.iter().position(|s| *s == stage).unwrap_or(0);
        self.by_stage[index].load(Ordering::Relaxed)
    }

    fn metrics(&self, started: Instant, errors: u64) -> StageMetrics {
        let elapsed = started.elapsed();
        let packets = self.packets_processed();
        StageMetrics {
            packets_processed: packets,
            errors,
            elapsed,
            throughput: packets as f64 / elapsed.as_secs_f64().max(0.001),
        }
    }
}

/// In-flight packet counter with completion notification.
struct InFlight {
    count: AtomicUsize,
    notify: Notify,
}

impl InFlight {
    fn new() -> Self {
        Self {
            count: AtomicUsize::new(0),
            notify: Notify::new(),
        }
    }

    fn add(&self, n: usize) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }

    fn finish_one(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.notify.notify_waiters();
        }
    }

    async fn idle(&self) {
        loop {
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            let notified = self.notify.notified();
            if self.count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Final run summary handed back by [`PipelineHandle::wait`].
#[derive(Debug)]
pub struct PipelineReport {
    pub packets_processed: u64,
    pub files_discovered: u64,
    pub functions_queued: u64,
    pub results_collected: u64,
    pub files_saved: u64,
    pub failures: Vec<FailureRecord>,
    pub suite_summary: std::collections::BTreeMap<String, SuiteStats>,
    pub elapsed: Duration,
    pub cancelled: bool,
}

/// Handle to a running pipeline: a stream of terminal packets plus a
/// blocking wait for the final report.
pub struct PipelineHandle {
    results: mpsc::Receiver<StreamPacket>,
    orchestrator: Arc<PipelineOrchestrator>,
}

impl PipelineHandle {
    /// Next terminal packet, `None` once the pipeline has drained.
    pub async fn next_result(&mut self) -> Option<StreamPacket> {
        self.results.recv().await
    }

    /// Drain remaining results, wait for completion, and shut down.
    pub async fn wait(mut self) -> Result<PipelineReport> {
        while self.results.recv().await.is_some() {}
        self.orchestrator.shutdown().await;
        Ok(self.orchestrator.report())
    }

    /// The terminal packets as a stream, for callers composing with
    /// stream combinators. Shutdown and reporting are up to the caller
    /// once the handle is consumed this way.
    pub fn into_stream(self) -> tokio_stream::wrappers::ReceiverStream<StreamPacket> {
        tokio_stream::wrappers::ReceiverStream::new(self.results)
    }
}

/// Owns the stage components, queues, and worker pools for one run.
pub struct PipelineOrchestrator {
    config: StreamingConfig,
    discoverer: Arc<FileDiscoverer>,
    functions: Arc<FunctionProcessor>,
    generator: Arc<GenerationProcessor>,
    collector: Arc<ResultCollector>,
    stats: Arc<PipelineStats>,
    failures: FailureCollector,
    observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
    cancel: CancellationToken,
    in_flight: Arc<InFlight>,
    run_state: StdMutex<RunState>,
    shutdown_done: AtomicBool,
    workers: StdMutex<Vec<JoinHandle<()>>>,
    started: Instant,
}

/// Everything the orchestrator needs besides the numeric configuration.
pub struct PipelineDependencies {
    pub analyzer: Arc<dyn SourceAnalyzer>,
    pub llm_client: Arc<dyn LlmClient>,
    pub discovery_filter: DiscoveryFilter,
    pub function_filter: FunctionFilter,
    pub project_root: std::path::PathBuf,
    pub output_dir: std::path::PathBuf,
    pub observers: Vec<Arc<dyn PipelineObserver>>,
}

impl PipelineOrchestrator {
    /// Validates the configuration and wires the stage components.
    /// Validation happens here, once; call sites never re-check.
    pub fn new(config: StreamingConfig, deps: PipelineDependencies) -> Result<Self> {
        config.validate()?;

        let mut observers = deps.observers;
        if config.enable_metrics {
            observers.push(Arc::new(MetricsObserver));
        }
        let observers = Arc::new(observers);
        let failures = FailureCollector::new();

        let discoverer = Arc::new(FileDiscoverer::new(
            deps.discovery_filter,
            observers.clone(),
        ));
        let functions = Arc::new(FunctionProcessor::new(
            deps.analyzer,
            deps.function_filter,
            deps.project_root,
            observers.clone(),
            failures.clone(),
        ));
        let limiter = Arc::new(SlidingWindowLimiter::new(
            REQUESTS_PER_MINUTE,
            TOKENS_PER_MINUTE,
        ));
        let generator = Arc::new(GenerationProcessor::new(
            deps.llm_client,
            limiter,
            config.max_concurrent_llm_calls,
            config.retry_attempts,
            observers.clone(),
            failures.clone(),
        ));
        let collector = Arc::new(ResultCollector::new(
            deps.output_dir,
            observers.clone(),
            failures.clone(),
        )?);

        Ok(Self {
            config,
            discoverer,
            functions,
            generator,
            collector,
            stats: Arc::new(PipelineStats::default()),
            failures,
            observers,
            cancel: CancellationToken::new(),
            in_flight: Arc::new(InFlight::new()),
            run_state: StdMutex::new(RunState::NotStarted),
            shutdown_done: AtomicBool::new(false),
            workers: StdMutex::new(Vec::new()),
            started: Instant::now(),
        })
    }

    /// Start the pipeline over the given compilation units.
    ///
    /// Single-shot: a second call on the same instance is a usage error.
    /// Terminal packets stream through the returned handle as they are
    /// collected.
    pub async fn execute(
        self: &Arc<Self>,
        units: Vec<CompilationUnit>,
    ) -> Result<PipelineHandle> {
        {
            let mut state = self.run_state.lock().unwrap();
            match *state {
                RunState::NotStarted => *state = RunState::Running,
                RunState::Running => bail!(PipelineError::AlreadyRunning),
                RunState::Completed | RunState::Cancelled => bail!(PipelineError::ShutDown),
            }
        }

        info!(
            "Starting streaming pipeline for {} compilation units",
            units.len()
        );

        let queue_size = self.config.max_queue_size;
        let (discovery_tx, discovery_rx) = mpsc::channel::<StreamPacket>(queue_size);
        let (function_tx, function_rx) = mpsc::channel::<StreamPacket>(queue_size);
        let (generation_tx, generation_rx) = mpsc::channel::<StreamPacket>(queue_size);
        let (collection_tx, collection_rx) = mpsc::channel::<StreamPacket>(queue_size);
        let (results_tx, results_rx) = mpsc::channel::<StreamPacket>(queue_size);

        let mut workers = Vec::new();
        workers.extend(self.spawn_stage(
            "discovery",
            1,
            discovery_rx,
            function_tx,
            self.discoverer.clone() as Arc<dyn StageProcessor>,
        ));
        workers.extend(self.spawn_stage(
            "functions",
            self.config.max_concurrent_files,
            function_rx,
            generation_tx,
            self.functions.clone() as Arc<dyn StageProcessor>,
        ));
        workers.extend(self.spawn_stage(
            "generation",
            self.config.max_concurrent_functions,
            generation_rx,
            collection_tx,
            self.generator.clone() as Arc<dyn StageProcessor>,
        ));
        workers.extend(self.spawn_stage(
            "collection",
            1,
            collection_rx,
            results_tx,
            self.collector.clone() as Arc<dyn StageProcessor>,
        ));
        self.workers.lock().unwrap().extend(workers);

        // Seed the pipeline. The seed packet is the first in-flight item.
        let run_id = format!("run-{}", uuid::Uuid::new_v4());
        let seed = StreamPacket::seed(&run_id, units);
        self.in_flight.add(1);
        discovery_tx
            .send(seed)
            .await
            .context("Failed to seed discovery queue")?;
        drop(discovery_tx);

        // Monitor: the timeout branch cancels the token so stalled workers
        // stop; the drain branch needs no action because closing channels
        // already cascade the workers to exit. Full shutdown (join plus
        // finalize) runs from `shutdown`, never from inside a worker task.
        let monitor = {
            let orchestrator = self.clone();
            let timeout = Duration::from_secs(self.config.timeout_seconds);
            tokio::spawn(async move {
                tokio::select! {
                    _ = orchestrator.in_flight.idle() => {
                        info!("Pipeline completed: all packets processed");
                    }
                    _ = tokio::time::sleep(timeout) => {
                        warn!("Pipeline timeout after {}s, cancelling", timeout.as_secs());
                        // Goes through cancel() so the final report records
                        // the run as aborted, not completed.
                        orchestrator.cancel();
                    }
                    _ = orchestrator.cancel.cancelled() => {
                        info!("Pipeline cancellation requested");
                    }
                }
            })
        };
        self.workers.lock().unwrap().push(monitor);

        Ok(PipelineHandle {
            results: results_rx,
            orchestrator: self.clone(),
        })
    }

    /// Spawn `count` workers sharing one input queue, forwarding outputs
    /// to `next`. Workers poll with a short timeout so they observe
    /// cancellation within one interval, and in-flight processing is raced
    /// against the token as well.
    fn spawn_stage(
        &self,
        name: &'static str,
        count: usize,
        rx: mpsc::Receiver<StreamPacket>,
        next: mpsc::Sender<StreamPacket>,
        processor: Arc<dyn StageProcessor>,
    ) -> Vec<JoinHandle<()>> {
        let rx = Arc::new(Mutex::new(rx));

        (0..count)
            .map(|index| {
                let rx = rx.clone();
                let next = next.clone();
                let processor = processor.clone();
                let cancel = self.cancel.clone();
                let in_flight = self.in_flight.clone();
                let stats = self.stats.clone();
                let failures = self.failures.clone();
                let observers = self.observers.clone();
                let started = self.started;

                tokio::spawn(async move {
                    debug!("{name} worker {index} started");
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }

                        let received = {
                            let mut guard = rx.lock().await;
                            tokio::time::timeout(POLL_INTERVAL, guard.recv()).await
                        };

                        let packet = match received {
                            Err(_) => continue, // poll timeout, re-check cancellation
                            Ok(None) => break,  // queue closed upstream
                            Ok(Some(packet)) => packet,
                        };

                        let stage = packet.stage;
                        let outputs = tokio::select! {
                            outputs = processor.process(packet) => outputs,
                            _ = cancel.cancelled() => {
                                in_flight.finish_one();
                                break;
                            }
                        };

                        for output in outputs {
                            in_flight.add(1);
                            if next.send(output).await.is_err() {
                                // Downstream gone (shutdown in progress).
                                in_flight.finish_one();
                            }
                        }

                        stats.record(stage);
                        let metrics = stats.metrics(started, failures.count() as u64);
                        notify_stage_changed(&observers, stage, metrics).await;
                        in_flight.finish_one();
                    }
                    debug!("{name} worker {index} stopped");
                })
            })
            .collect()
    }

    /// Request cancellation. Workers stop at their next poll boundary.
    pub fn cancel(&self) {
        let mut state = self.run_state.lock().unwrap();
        if *state == RunState::Running {
            *state = RunState::Cancelled;
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Graceful, idempotent shutdown: stop workers, finalize every stage
    /// (which flushes the aggregate report), and log final statistics.
    pub async fn shutdown(&self) {
        if self.shutdown_done.swap(true, Ordering::SeqCst) {
            return;
        }

        info!("Shutting down pipeline orchestrator");
        self.cancel.cancel();

        let workers = std::mem::take(&mut *self.workers.lock().unwrap());
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                if !e.is_cancelled() {
                    warn!("Worker task failed during shutdown: {e}");
                }
            }
        }

        self.discoverer.finalize().await;
        self.functions.finalize().await;
        self.generator.finalize().await;
        self.collector.finalize().await;

        {
            let mut state = self.run_state.lock().unwrap();
            if *state != RunState::Cancelled {
                *state = RunState::Completed;
            }
        }

        info!(
            "Pipeline shutdown complete: {} packets in {:.2}s",
            self.stats.packets_processed(),
            self.started.elapsed().as_secs_f64()
        );
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_done.load(Ordering::SeqCst)
    }

    /// Snapshot of the run outcome. Meaningful after `shutdown`.
    pub fn report(&self) -> PipelineReport {
        let cancelled = *self.run_state.lock().unwrap() == RunState::Cancelled;
        PipelineReport {
            packets_processed: self.stats.packets_processed(),
            files_discovered: self.discoverer.discovered_count(),
            functions_queued: self.functions.processed_count(),
            results_collected: self.collector.collected_count(),
            files_saved: self.collector.saved_count(),
            failures: self.failures.snapshot(),
            suite_summary: self.collector.suite_summary(),
            elapsed: self.started.elapsed(),
            cancelled,
        }
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }
}
