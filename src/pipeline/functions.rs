//! Function processing stage: file packets in, prioritized function
//! packets out. Parsing happens off the async dispatch path.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::analyzer::{FunctionInfo, SourceAnalyzer};

use super::errors::FailureCollector;
use super::observer::{notify_error, notify_packet_processed, PipelineObserver};
use super::packet::{
    FunctionWorkItem, PacketPayload, StreamPacket, StreamStage, MAX_PRIORITY,
};
use super::StageProcessor;

const TEST_NAME_PATTERNS: [&str; 6] = ["test_", "_test", "Test", "TEST", "spec", "Spec"];

/// Decides which extracted functions are worth generating tests for.
#[derive(Debug, Clone)]
pub struct FunctionFilter {
    pub skip_static: bool,
    pub skip_test_functions: bool,
    pub min_parameters: usize,
    pub max_parameters: Option<usize>,
}

impl FunctionFilter {
    pub fn should_process(&self, function: &FunctionInfo) -> bool {
        if self.skip_static && function.is_static {
            return false;
        }

        if self.skip_test_functions && is_test_like(&function.name) {
            return false;
        }

        let param_count = function.parameters.len();
        if param_count < self.min_parameters {
            return false;
        }
        if let Some(max) = self.max_parameters {
            if param_count > max {
                return false;
            }
        }

        true
    }
}

impl Default for FunctionFilter {
    fn default() -> Self {
        Self {
            skip_static: true,
            skip_test_functions: true,
            min_parameters: 0,
            max_parameters: None,
        }
    }
}

fn is_test_like(name: &str) -> bool {
    TEST_NAME_PATTERNS
        .iter()
        .any(|pattern| name.contains(pattern))
}

/// Processing priority for a function: parameter count plus a bonus for
/// pointer-returning functions, capped at [`MAX_PRIORITY`].
pub fn function_priority(function: &FunctionInfo) -> u8 {
    let mut score = function.parameters.len();
    if function.return_type.contains('*') {
        score += 1;
    }
    if function.return_type.to_lowercase().contains("pointer") {
        score += 1;
    }
    score.min(MAX_PRIORITY as usize) as u8
}

/// Stage processor extracting functions via a [`SourceAnalyzer`].
pub struct FunctionProcessor {
    analyzer: Arc<dyn SourceAnalyzer>,
    filter: FunctionFilter,
    project_root: PathBuf,
    observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
    failures: FailureCollector,
    processed: AtomicU64,
    started: Instant,
}

impl FunctionProcessor {
    pub fn new(
        analyzer: Arc<dyn SourceAnalyzer>,
        filter: FunctionFilter,
        project_root: PathBuf,
        observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
        failures: FailureCollector,
    ) -> Self {
        Self {
            analyzer,
            filter,
            project_root,
            observers,
            failures,
            processed: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    fn resolve_path(&self, file_path: &Path) -> PathBuf {
        if file_path.is_absolute() {
            file_path.to_path_buf()
        } else {
            self.project_root.join(file_path)
        }
    }

    /// Analyzer runs on the blocking pool; a failure is per-file and must
    /// never abort sibling files.
    async fn extract_functions(
        &self,
        full_path: PathBuf,
        compile_args: Vec<String>,
    ) -> anyhow::Result<Vec<FunctionInfo>> {
        let analyzer = self.analyzer.clone();
        tokio::task::spawn_blocking(move || analyzer.analyze(&full_path, &compile_args)).await?
    }
}

#[async_trait]
impl StageProcessor for FunctionProcessor {
    fn stage(&self) -> StreamStage {
        StreamStage::FunctionProcessing
    }

    async fn process(&self, packet: StreamPacket) -> Vec<StreamPacket> {
        let (file_path, compile_args) = match &packet.payload {
            PacketPayload::SourceFile {
                file_path,
                compile_args,
                ..
            } => (file_path.clone(), compile_args.clone()),
            _ => {
                debug!("Unexpected payload at function stage for {}", packet.id);
                return Vec::new();
            }
        };

        let full_path = self.resolve_path(&file_path);
        if !full_path.exists() {
            warn!("File not found: {}", full_path.display());
            return Vec::new();
        }

        let start = Instant::now();
        let functions = match self.extract_functions(full_path.clone(), compile_args.clone()).await
        {
            Ok(functions) => functions,
            Err(e) => {
                let message = format!("{e:#}");
                warn!("Failed to analyze {}: {message}", full_path.display());
                self.failures.record(
                    full_path.display().to_string(),
                    StreamStage::FunctionProcessing,
                    &message,
                );
                notify_error(&self.observers, &packet, &message).await;
                return Vec::new();
            }
        };

        let total = functions.len();
        let mut outputs = Vec::new();
        for function in functions {
            if !self.filter.should_process(&function) {
                continue;
            }

            let sequence = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
            let priority = function_priority(&function);
            debug!(
                "Queued function {} (priority {priority}, #{sequence})",
                function.name
            );

            let item = FunctionWorkItem::new(
                full_path.clone(),
                function,
                compile_args.clone(),
                priority,
            );
            outputs.push(StreamPacket::function(&packet, sequence, item));
        }

        info!(
            "Found {total} functions in {}, {} after filtering",
            file_path.display(),
            outputs.len()
        );

        for output in &outputs {
            notify_packet_processed(&self.observers, output, start.elapsed()).await;
        }

        outputs
    }

    async fn finalize(&self) {
        let processed = self.processed.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            "Function processing completed: {processed} functions in {elapsed:.2}s ({:.2} functions/sec)",
            processed as f64 / elapsed.max(0.001)
        );
    }
}
