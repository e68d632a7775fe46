//! Result collection stage: persistence, suite aggregation, final report.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::analyzer::SourceLanguage;
use crate::metrics;

use super::errors::{FailureCollector, FailureRecord};
use super::observer::{notify_error, notify_packet_processed, PipelineObserver};
use super::packet::{
    CollectionStatus, GenerationResult, PacketPayload, StreamPacket, StreamStage,
};
use super::StageProcessor;

/// Running per-suite counters; only ever incremented.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SuiteStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    pub total_code_length: u64,
}

/// Aggregates results by suite name across concurrent workers.
#[derive(Default)]
pub struct SuiteAggregator {
    suites: Mutex<BTreeMap<String, SuiteStats>>,
}

impl SuiteAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: &GenerationResult) {
        let mut suites = self.suites.lock().unwrap();
        let stats = suites.entry(result.suite_name.clone()).or_default();
        stats.total += 1;
        if result.success {
            stats.successful += 1;
            stats.total_code_length += result.test_code.len() as u64;
        } else {
            stats.failed += 1;
        }
    }

    /// Mark a previously recorded success as failed at the persistence step.
    fn record_persist_failure(&self, suite_name: &str) {
        let mut suites = self.suites.lock().unwrap();
        if let Some(stats) = suites.get_mut(suite_name) {
            stats.failed += 1;
        }
    }

    pub fn summary(&self) -> BTreeMap<String, SuiteStats> {
        self.suites.lock().unwrap().clone()
    }
}

#[derive(Debug, Serialize)]
struct GenerationSummary {
    total_functions: u64,
    successful_generations: u64,
    failed_generations: u64,
    success_rate: f64,
    processing_time_seconds: f64,
}

#[derive(Debug, Clone, Serialize)]
struct GeneratedFileEntry {
    function_name: String,
    suite_name: String,
    output_path: String,
    test_length: usize,
    model: String,
}

#[derive(Debug, Serialize)]
struct AggregateReport {
    generation_summary: GenerationSummary,
    suite_summary: BTreeMap<String, SuiteStats>,
    generated_files: Vec<GeneratedFileEntry>,
    failures: Vec<FailureRecord>,
}

/// Stage processor persisting generation results and producing the final
/// aggregate report.
pub struct ResultCollector {
    output_dir: PathBuf,
    aggregator: SuiteAggregator,
    generated_files: Mutex<Vec<GeneratedFileEntry>>,
    observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
    failures: FailureCollector,
    collected: AtomicU64,
    saved: AtomicU64,
    failed: AtomicU64,
    started: Instant,
}

impl ResultCollector {
    pub fn new(
        output_dir: PathBuf,
        observers: Arc<Vec<Arc<dyn PipelineObserver>>>,
        failures: FailureCollector,
    ) -> Result<Self> {
        std::fs::create_dir_all(&output_dir).with_context(|| {
            format!("Failed to create output directory {}", output_dir.display())
        })?;

        Ok(Self {
            output_dir,
            aggregator: SuiteAggregator::new(),
            generated_files: Mutex::new(Vec::new()),
            observers,
            failures,
            collected: AtomicU64::new(0),
            saved: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            started: Instant::now(),
        })
    }

    pub fn collected_count(&self) -> u64 {
        self.collected.load(Ordering::Relaxed)
    }

    pub fn saved_count(&self) -> u64 {
        self.saved.load(Ordering::Relaxed)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn suite_summary(&self) -> BTreeMap<String, SuiteStats> {
        self.aggregator.summary()
    }

    async fn save_test_file(&self, result: &GenerationResult) -> Result<PathBuf> {
        let language = if result.target_path.ends_with(".cpp") {
            SourceLanguage::Cpp
        } else {
            SourceLanguage::C
        };
        let filename = format!(
            "test_{}.{}",
            result.function_name,
            language.test_extension()
        );
        let path = resolve_collision(&self.output_dir.join(filename));

        let content = format_test_file(result);
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;

        debug!("Saved test file: {}", path.display());
        Ok(path)
    }

    /// Write the aggregate JSON report. Called from `finalize`, also usable
    /// directly by callers that want the report before shutdown.
    pub async fn write_report(&self) -> Result<PathBuf> {
        let collected = self.collected.load(Ordering::Relaxed);
        let saved = self.saved.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);

        let report = AggregateReport {
            generation_summary: GenerationSummary {
                total_functions: collected,
                successful_generations: saved,
                failed_generations: failed,
                success_rate: saved as f64 / collected.max(1) as f64,
                processing_time_seconds: self.started.elapsed().as_secs_f64(),
            },
            suite_summary: self.aggregator.summary(),
            generated_files: self.generated_files.lock().unwrap().clone(),
            failures: self.failures.snapshot(),
        };

        let path = self.output_dir.join("generation_report.json");
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;

        info!("Generated aggregate report: {}", path.display());
        Ok(path)
    }
}

#[async_trait]
impl StageProcessor for ResultCollector {
    fn stage(&self) -> StreamStage {
        StreamStage::ResultCollection
    }

    async fn process(&self, packet: StreamPacket) -> Vec<StreamPacket> {
        let result = match &packet.payload {
            PacketPayload::Generation(result) => result.clone(),
            _ => {
                debug!("Unexpected payload at collection stage for {}", packet.id);
                return Vec::new();
            }
        };

        let sequence = self.collected.fetch_add(1, Ordering::Relaxed) + 1;
        self.aggregator.record(&result);

        let start = Instant::now();
        let output_path = if result.success && !result.test_code.trim().is_empty() {
            match self.save_test_file(&result).await {
                Ok(path) => {
                    self.saved.fetch_add(1, Ordering::Relaxed);
                    metrics::FILES_WRITTEN.inc();
                    self.generated_files.lock().unwrap().push(GeneratedFileEntry {
                        function_name: result.function_name.clone(),
                        suite_name: result.suite_name.clone(),
                        output_path: path.display().to_string(),
                        test_length: result.test_code.len(),
                        model: result.model.clone(),
                    });
                    Some(path)
                }
                Err(e) => {
                    // Persist failures count against the item, never the run.
                    let message = format!("{e:#}");
                    error!(
                        "Failed to save test for {}: {message}",
                        result.function_name
                    );
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    self.aggregator.record_persist_failure(&result.suite_name);
                    self.failures.record(
                        result.function_name.clone(),
                        StreamStage::ResultCollection,
                        &message,
                    );
                    notify_error(&self.observers, &packet, &message).await;
                    None
                }
            }
        } else {
            self.failed.fetch_add(1, Ordering::Relaxed);
            warn!(
                "Skipping save for failed generation: {}",
                result.function_name
            );
            None
        };

        let status = if output_path.is_some() {
            CollectionStatus::Saved
        } else {
            CollectionStatus::Failed
        };
        let output = StreamPacket::completed(&packet, sequence, result, output_path, status);
        notify_packet_processed(&self.observers, &output, start.elapsed()).await;

        vec![output]
    }

    async fn finalize(&self) {
        if let Err(e) = self.write_report().await {
            error!("Failed to write aggregate report: {e:#}");
        }

        let collected = self.collected.load(Ordering::Relaxed);
        let saved = self.saved.load(Ordering::Relaxed);
        let elapsed = self.started.elapsed().as_secs_f64();
        info!(
            "Result collection completed: {saved}/{collected} files saved in {elapsed:.2}s"
        );

        for (suite, stats) in self.aggregator.summary() {
            info!(
                "  {suite}: {}/{} successful",
                stats.successful, stats.total
            );
        }
    }
}

/// Append `_1`, `_2`, ... until the path is free. Never overwrites.
fn resolve_collision(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("test")
        .to_string();
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    let parent = path.parent().unwrap_or_else(|| Path::new("."));

    let mut counter = 1;
    loop {
        let candidate = parent.join(format!("{stem}_{counter}.{extension}"));
        if !candidate.exists() {
            return candidate;
        }
        counter += 1;
    }
}

/// Header comment, framework includes, then the generated code.
fn format_test_file(result: &GenerationResult) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

    let mut content = String::new();
    content.push_str(&format!("// Generated test for {}\n", result.function_name));
    content.push_str(&format!("// Suite: {}\n", result.suite_name));
    content.push_str("// Generated by: testgen\n");
    content.push_str(&format!("// Generation time: {timestamp}\n"));
    content.push_str(&format!("// Model: {}\n\n", result.model));
    content.push_str("#include <gtest/gtest.h>\n");
    content.push_str("#include <mockcpp/mockcpp.hpp>\n\n");
    content.push_str(&result.test_code);
    if !content.ends_with('\n') {
        content.push('\n');
    }
    content
}
